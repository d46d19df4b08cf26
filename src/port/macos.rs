// TODO: scan open descriptors via libproc like the Linux /proc check
pub fn is_port_open(_port_name: &str) -> bool {
    false
}
