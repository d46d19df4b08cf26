//! Conversion between millimeters and controller encoder counts.

use crate::protocol::{ProtocolError, Result};

/// Encoder counts per millimeter of actuator travel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale(f64);

impl Scale {
    /// ZFS actuator on the stretching jig, from the datasheet.
    pub const ZFS: Scale = Scale(2184533.33);

    pub fn new(counts_per_mm: f64) -> Result<Self> {
        if !counts_per_mm.is_finite() || counts_per_mm <= 0.0 {
            return Err(ProtocolError::InvalidScale(counts_per_mm));
        }
        Ok(Scale(counts_per_mm))
    }

    pub fn counts_per_mm(&self) -> f64 {
        self.0
    }

    /// Converts `mm` to encoder counts, truncating toward zero.
    ///
    /// Anything below one count is dropped, so 0.9 counts becomes 0 and
    /// -0.9 counts becomes 0 as well. Values that do not fit in an `i32`
    /// are rejected instead of wrapping.
    pub fn to_counts(&self, mm: f64) -> Result<i32> {
        let scaled = (self.0 * mm).trunc();

        if !scaled.is_finite() || scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
            return Err(ProtocolError::Encoding { value: mm, scaled });
        }

        Ok(scaled as i32)
    }

    pub fn to_mm(&self, counts: i32) -> f64 {
        counts as f64 / self.0
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::ZFS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    #[test]
    fn one_millimeter() {
        assert_eq!(Scale::ZFS.to_counts(1.0).unwrap(), 2184533);
        assert_eq!(
            Scale::ZFS.to_counts(1.0).unwrap().to_le_bytes(),
            [0x55, 0x55, 0x21, 0x00]
        );
    }

    #[test]
    fn zero_is_zero() {
        assert_eq!(Scale::ZFS.to_counts(0.0).unwrap(), 0);
        assert_eq!(Scale::ZFS.to_counts(-0.0).unwrap(), 0);
    }

    #[test]
    fn truncates_toward_zero() {
        let scale = Scale::new(10.0).unwrap();
        assert_eq!(scale.to_counts(0.19).unwrap(), 1);
        assert_eq!(scale.to_counts(-0.19).unwrap(), -1);
        assert_eq!(scale.to_counts(0.05).unwrap(), 0);
        assert_eq!(scale.to_counts(-0.05).unwrap(), 0);
    }

    #[test]
    fn roughly_linear() {
        for &mm in &[0.001, 0.25, 1.0, 3.7, -2.5, 12.0] {
            let single = Scale::ZFS.to_counts(mm).unwrap() as i64;
            let double = Scale::ZFS.to_counts(2.0 * mm).unwrap() as i64;
            assert!((double - 2 * single).abs() <= 1, "{} mm", mm);
        }
    }

    #[test]
    fn round_trip_within_one_count() {
        let resolution = 1.0 / Scale::ZFS.counts_per_mm();
        for &mm in &[0.0, 0.0005, 0.5, 1.0, -1.0, 7.25, -9.99, 25.0] {
            let counts = Scale::ZFS.to_counts(mm).unwrap();
            let back = Scale::ZFS.to_mm(counts);
            assert!((back - mm).abs() <= resolution, "{} mm -> {}", mm, back);
        }
    }

    #[test]
    fn limits_of_i32() {
        let scale = Scale::new(1.0).unwrap();
        assert_eq!(scale.to_counts(i32::MAX as f64).unwrap(), i32::MAX);
        assert_eq!(scale.to_counts(i32::MIN as f64).unwrap(), i32::MIN);
        assert!(scale.to_counts(i32::MAX as f64 + 1.0).is_err());
        assert!(scale.to_counts(i32::MIN as f64 - 1.0).is_err());
    }

    #[test]
    fn overflow_is_an_encoding_error() {
        // 983 mm is just past the i32 range for the ZFS actuator
        let err = Scale::ZFS.to_counts(983.1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);

        let err = Scale::ZFS.to_counts(-983.1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);

        assert!(Scale::ZFS.to_counts(f64::NAN).is_err());
        assert!(Scale::ZFS.to_counts(f64::INFINITY).is_err());
    }

    #[test]
    fn bad_scale() {
        assert!(Scale::new(0.0).is_err());
        assert!(Scale::new(-1.0).is_err());
        assert!(Scale::new(f64::NAN).is_err());
    }
}
