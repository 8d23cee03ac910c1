//! Human-readable file sizes for HTML rows.

const UNITS: &[u8] = b"KMGTPE";

/// Formats a size in base 1024 with one decimal digit, always at least in `K`.
///
/// Sizes from 1 to 99 bytes are biased by 99 so they show as `0.1K` rather than
/// `0.0K`. The decimal digit is the remainder of the last division in hundreds,
/// capped at 9. A result above 999 rolls over to `0.9` of the next unit.
pub fn format_size(size: i64) -> String {
    let mut size = size.max(0);
    if size > 0 && size < 100 {
        size += 99;
    }

    let mut unit = 0usize;
    let mut remain = size & 1023;
    size >>= 10;
    while size & !1023 != 0 {
        remain = size & 1023;
        size >>= 10;
        unit += 1;
    }

    let mut digit = (remain / 100).min(9);
    if size > 999 {
        size = 0;
        digit = 9;
        unit += 1;
    }

    let unit = UNITS.get(unit).copied().unwrap_or(b'E') as char;
    format!("{}.{}{}", size, digit, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_small_sizes() {
        assert_eq!(format_size(0), "0.0K");
        assert_eq!(format_size(1), "0.1K");
        assert_eq!(format_size(50), "0.1K");
        assert_eq!(format_size(99), "0.1K");
        assert_eq!(format_size(100), "0.1K");
        assert_eq!(format_size(999), "0.9K");
    }

    #[test]
    fn test_unit_boundaries() {
        assert_eq!(format_size(1024), "1.0K");
        assert_eq!(format_size(1536), "1.5K");
        assert_eq!(format_size(1024 * 1024), "1.0M");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.0G");
    }

    #[test]
    fn test_rollover_to_next_unit() {
        // 1000K does not fit in three digits
        assert_eq!(format_size(1000 * 1024), "0.9M");
        assert_eq!(format_size(1023 * 1024 + 1023), "0.9M");
    }

    #[test]
    fn test_huge_sizes_clamp_to_last_unit() {
        assert_eq!(format_size(i64::MAX), "7.9E");
    }

    #[test]
    fn test_negative_size_treated_as_zero() {
        assert_eq!(format_size(-5), "0.0K");
    }
}
