// ─── Byte humanizer ─────────────────────────────────────────────────────────

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with base-1024 logarithmic scaling, rounded to two
/// decimals (`1536` → `"1.5 KB"`, `1024` → `"1 KB"`). Values beyond the
/// terabyte range stay in TB.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    // floor(log1024(bytes)), computed by division to stay exact on powers of 1024
    let mut scaled = bytes as f64;
    let mut exponent = 0;
    while scaled >= 1024.0 && exponent < UNITS.len() - 1 {
        scaled /= 1024.0;
        exponent += 1;
    }
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1 MB");
        assert_eq!(format_bytes(1_073_741_824), "1 GB");
        assert_eq!(format_bytes(1_099_511_627_776), "1 TB");
    }

    #[test]
    fn format_bytes_rounds_to_two_decimals() {
        // 1234 / 1024 = 1.205078…
        assert_eq!(format_bytes(1234), "1.21 KB");
    }

    #[test]
    fn format_bytes_caps_at_terabytes() {
        let two_pb = 2 * 1024u64.pow(5);
        assert_eq!(format_bytes(two_pb), "2048 TB");
    }
}
