//! Table formatting utilities for CLI output.

/// Truncates a string to at most `max_len` characters, adding "..." if needed.
///
/// # Examples
///
/// ```rust
/// use hcacheck_cli::presentation::truncate_string;
///
/// assert_eq!(truncate_string("mlx5_0", 10), "mlx5_0");
/// assert_eq!(truncate_string("mlx5_0,mlx5_1,mlx5_2", 10), "mlx5_0,...");
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
pub fn format_optional<T: std::fmt::Display>(value: &Option<T>, default: &str) -> String {
    value
        .as_ref()
        .map_or_else(|| default.to_string(), ToString::to_string)
}
