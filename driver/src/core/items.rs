//! Item-list parsing.

/// Split an item list into items, preserving file order.
///
/// Trailing whitespace (including `\r`) is stripped from every line. Lines that
/// are empty afterwards are skipped so they never consume a counter value.
pub fn parse_items(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
