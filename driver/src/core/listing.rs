//! Archive listing contract.
//!
//! The extractor prints one member path per line. The extracted root directory
//! is the first `/`-separated segment of a fixed listing line (the second line
//! by default, since the first is usually the bare directory entry).

use std::fmt;

/// Reasons a listing does not satisfy the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// The listing has fewer lines than the contract requires.
    TooShort { lines: usize, required: usize },
    /// The selected line has no leading path segment.
    EmptyRoot { line: usize },
    /// The leading segment is not a usable directory name.
    InvalidRoot { line: usize, root: String },
}

impl fmt::Display for ListingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingError::TooShort { lines, required } => write!(
                f,
                "archive listing has {lines} line(s), expected at least {required}"
            ),
            ListingError::EmptyRoot { line } => {
                write!(f, "archive listing line {} has an empty root segment", line + 1)
            }
            ListingError::InvalidRoot { line, root } => write!(
                f,
                "archive listing line {} has invalid root segment `{root}`",
                line + 1
            ),
        }
    }
}

impl std::error::Error for ListingError {}

/// Return the top-level directory named on listing line `line` (0-based).
pub fn extracted_root(listing: &str, line: usize) -> Result<String, ListingError> {
    let lines: Vec<&str> = listing.lines().collect();
    let selected = lines.get(line).ok_or(ListingError::TooShort {
        lines: lines.len(),
        required: line + 1,
    })?;
    let root = selected.split('/').next().unwrap_or_default().trim();
    if root.is_empty() {
        return Err(ListingError::EmptyRoot { line });
    }
    if root == "." || root == ".." {
        return Err(ListingError::InvalidRoot {
            line,
            root: root.to_string(),
        });
    }
    Ok(root.to_string())
}

/// Join the extracted root with the member file the batch works on.
pub fn derived_path(root: &str, member: &str) -> String {
    format!("{}/{}", root, member.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_root_from_second_line() {
        let listing = "run_0042/\nrun_0042/log.RAWtoALL\nrun_0042/other\n";
        assert_eq!(extracted_root(listing, 1).expect("root"), "run_0042");
    }

    #[test]
    fn trims_whitespace_around_segment() {
        let listing = "x/\n  run_7 /log\n";
        assert_eq!(extracted_root(listing, 1).expect("root"), "run_7");
    }

    #[test]
    fn single_line_listing_is_too_short() {
        let err = extracted_root("only/\n", 1).expect_err("too short");
        assert_eq!(
            err,
            ListingError::TooShort {
                lines: 1,
                required: 2
            }
        );
        assert!(err.to_string().contains("expected at least 2"));
    }

    #[test]
    fn empty_listing_is_too_short() {
        assert!(matches!(
            extracted_root("", 1),
            Err(ListingError::TooShort { lines: 0, .. })
        ));
    }

    #[test]
    fn absolute_member_has_empty_root() {
        assert_eq!(
            extracted_root("a\n/abs/path\n", 1),
            Err(ListingError::EmptyRoot { line: 1 })
        );
    }

    #[test]
    fn dot_segments_are_rejected() {
        assert!(matches!(
            extracted_root("./\n./log\n", 1),
            Err(ListingError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn derived_path_joins_member() {
        assert_eq!(derived_path("run_1", "log.RAWtoALL"), "run_1/log.RAWtoALL");
        assert_eq!(derived_path("run_1", "/log"), "run_1/log");
    }
}
