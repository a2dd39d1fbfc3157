//! Table formatting utilities for CLI output.

use chrono::{DateTime, Local, Utc};

/// Truncates a string to at most `max_len` characters, adding "..." if needed.
///
/// # Examples
///
/// ```rust
/// use anywhere_cli::presentation::truncate_string;
///
/// assert_eq!(truncate_string("github", 10), "github");
/// assert_eq!(truncate_string("filesystem-server", 8), "files...");
/// ```
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Print a horizontal separator line.
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Format an optional value for table display, returning a default if None.
pub fn format_optional<T: std::fmt::Display>(value: Option<&T>, default: &str) -> String {
    value.map_or_else(|| default.to_string(), ToString::to_string)
}

/// Local time, second precision.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_string("ünïcödé-tool", 8), "ünïcö...");
    }

    #[test]
    fn optional_uses_default() {
        assert_eq!(format_optional::<String>(None, "--"), "--");
        assert_eq!(format_optional(Some(&42), "--"), "42");
    }
}
