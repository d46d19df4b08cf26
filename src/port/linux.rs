use glob::glob;
use std::fs;
use std::path::Path;

/// True if any process holds `port_name` open, following symlinks such
/// as the `/dev/serial/by-id` entries.
pub fn is_port_open(port_name: &str) -> bool {
    let target = fs::canonicalize(port_name).unwrap_or_else(|_| Path::new(port_name).into());

    let entries = match glob("/proc/[0-9]*/fd/*") {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    entries
        .filter_map(|p| p.ok())
        .filter_map(|path| fs::read_link(path).ok())
        .any(|link| link == target)
}
