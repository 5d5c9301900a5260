//! Formatting helpers for log and report output.

/// Format a count with K/M suffix for compact display.
///
/// # Examples
/// ```
/// use geonft::utils::format_count;
/// assert_eq!(format_count(500), "500");
/// assert_eq!(format_count(1500), "1.5K");
/// assert_eq!(format_count(1_500_000), "1.5M");
/// ```
pub fn format_count(count: usize) -> String {
    match count {
        n if n >= 1_000_000 => format!("{:.1}M", n as f64 / 1_000_000.0),
        n if n >= 1_000 => format!("{:.1}K", n as f64 / 1_000.0),
        n => n.to_string(),
    }
}

/// Format a download size (B, KB, MB, GB).
///
/// # Examples
/// ```
/// use geonft::utils::format_bytes;
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(1_500_000), "1.4 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u64); 3] = [("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];

    UNITS
        .iter()
        .find(|(_, size)| bytes >= *size)
        .map(|(unit, size)| format!("{:.1} {}", bytes as f64 / *size as f64, unit))
        .unwrap_or_else(|| format!("{} B", bytes))
}

/// Comma-separated list of requested values, `-` when there are none.
///
/// # Examples
/// ```
/// use geonft::utils::join_values;
/// assert_eq!(join_values(&["be", "nl"]), "be, nl");
/// assert_eq!(join_values::<&str>(&[]), "-");
/// ```
pub fn join_values<S: AsRef<str>>(values: &[S]) -> String {
    if values.is_empty() {
        return "-".to_string();
    }
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}
