//! Output file naming derived from the output base name and item counter.

use anyhow::{Result, anyhow};

const AGGREGATE_SUFFIX: &str = "All";

/// Naming scheme for every file a batch produces.
///
/// - filter output: `<base><counter>.txt`
/// - result file: `<base>_<counter>.<ext>`
/// - aggregate: `<base>_All.<ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    base: String,
    extension: String,
}

impl OutputNames {
    pub fn new(base: &str, extension: &str) -> Result<Self> {
        validate_base(base)?;
        validate_extension(extension)?;
        Ok(Self {
            base: base.to_string(),
            extension: extension.to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn filter_output(&self, counter: u32) -> String {
        format!("{}{}.txt", self.base, counter)
    }

    pub fn result_file(&self, counter: u32) -> String {
        format!("{}_{}.{}", self.base, counter, self.extension)
    }

    pub fn aggregate(&self) -> String {
        format!("{}_{}.{}", self.base, AGGREGATE_SUFFIX, self.extension)
    }

    /// Shell-style pattern covering the per-item results, for reporting.
    pub fn merge_pattern(&self) -> String {
        format!("{}_*.{}", self.base, self.extension)
    }

    /// Counter encoded in a result file name, or `None` if `file_name` is not
    /// a per-item result of this batch (the aggregate included).
    pub fn result_counter(&self, file_name: &str) -> Option<u32> {
        let digits = file_name
            .strip_prefix(self.base.as_str())?
            .strip_prefix('_')?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

fn validate_base(base: &str) -> Result<()> {
    if base.trim().is_empty() {
        return Err(anyhow!("output base name must be non-empty"));
    }
    if base.contains(['/', '\\']) {
        return Err(anyhow!(
            "output base name must not contain path separators: {base}"
        ));
    }
    if base == "." || base == ".." {
        return Err(anyhow!("output base name must not be {base}"));
    }
    Ok(())
}

fn validate_extension(extension: &str) -> Result<()> {
    if extension.is_empty() {
        return Err(anyhow!("result extension must be non-empty"));
    }
    if extension.starts_with('.') || extension.contains(['/', '\\']) {
        return Err(anyhow!(
            "result extension must be a bare extension like `root`: {extension}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn names() -> OutputNames {
        OutputNames::new("out", "root").expect("names")
    }

    #[test]
    fn formats_per_item_and_aggregate_names() {
        let names = names();
        assert_eq!(names.filter_output(1), "out1.txt");
        assert_eq!(names.result_file(2), "out_2.root");
        assert_eq!(names.aggregate(), "out_All.root");
        assert_eq!(names.merge_pattern(), "out_*.root");
    }

    #[test]
    fn names_are_pairwise_distinct_across_a_run() {
        let names = names();
        let mut seen = HashSet::new();
        for counter in 1..=500 {
            assert!(seen.insert(names.filter_output(counter)));
            assert!(seen.insert(names.result_file(counter)));
        }
        assert!(seen.insert(names.aggregate()));
    }

    #[test]
    fn result_counter_recognises_only_numbered_results() {
        let names = names();
        assert_eq!(names.result_counter("out_12.root"), Some(12));
        assert_eq!(names.result_counter("out_All.root"), None);
        assert_eq!(names.result_counter("out_.root"), None);
        assert_eq!(names.result_counter("out_3.txt"), None);
        assert_eq!(names.result_counter("out3.txt"), None);
        assert_eq!(names.result_counter("other_3.root"), None);
        assert_eq!(names.result_counter("out_x3.root"), None);
    }

    #[test]
    fn rejects_bad_base_names() {
        assert!(OutputNames::new("", "root").is_err());
        assert!(OutputNames::new("a/b", "root").is_err());
        assert!(OutputNames::new("..", "root").is_err());
    }

    #[test]
    fn rejects_bad_extensions() {
        assert!(OutputNames::new("out", "").is_err());
        assert!(OutputNames::new("out", ".root").is_err());
    }
}
