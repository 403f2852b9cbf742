//! Display timestamps for analysis segments.

/// Format seconds as a compact display timestamp.
///
/// Produces `M:SS` below one hour and `H:MM:SS` above, matching what the
/// results view shows next to each segment. Fractions are truncated and
/// negative input is clamped to zero.
///
/// # Examples
/// ```
/// use vsent_models::timestamp::format_timestamp;
/// assert_eq!(format_timestamp(0.0), "0:00");
/// assert_eq!(format_timestamp(62.0), "1:02");
/// assert_eq!(format_timestamp(3725.0), "1:02:05");
/// ```
pub fn format_timestamp(total_secs: f64) -> String {
    let total = if total_secs.is_finite() && total_secs > 0.0 {
        total_secs.floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp_minutes() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(12.0), "0:12");
        assert_eq!(format_timestamp(70.0), "1:10");
        assert_eq!(format_timestamp(599.9), "9:59");
    }

    #[test]
    fn test_format_timestamp_hours() {
        assert_eq!(format_timestamp(3600.0), "1:00:00");
        assert_eq!(format_timestamp(3661.0), "1:01:01");
    }

    #[test]
    fn test_format_timestamp_invalid_input() {
        assert_eq!(format_timestamp(-5.0), "0:00");
        assert_eq!(format_timestamp(f64::NAN), "0:00");
    }
}
