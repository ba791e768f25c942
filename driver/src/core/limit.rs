//! Processing limit policy.

/// Upper bound on processed items.
///
/// The check runs after an item completes and trips once the counter is
/// strictly greater than the limit, so a limit of `n` processes `n + 1` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLimit(Option<u32>);

impl ItemLimit {
    pub fn at(limit: u32) -> Self {
        Self(Some(limit))
    }

    pub fn unlimited() -> Self {
        Self(None)
    }

    pub fn value(&self) -> Option<u32> {
        self.0
    }

    /// Whether processing must stop after the item numbered `counter`.
    pub fn exceeded_by(&self, counter: u32) -> bool {
        matches!(self.0, Some(limit) if counter > limit)
    }

    /// Most items a run can process under this limit.
    pub fn max_processed(&self) -> Option<u32> {
        self.0.map(|limit| limit.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_only_past_the_limit() {
        let limit = ItemLimit::at(120);
        assert!(!limit.exceeded_by(1));
        assert!(!limit.exceeded_by(120));
        assert!(limit.exceeded_by(121));
        assert_eq!(limit.max_processed(), Some(121));
    }

    #[test]
    fn zero_limit_still_processes_one_item() {
        let limit = ItemLimit::at(0);
        assert!(limit.exceeded_by(1));
        assert_eq!(limit.max_processed(), Some(1));
    }

    #[test]
    fn unlimited_never_trips() {
        let limit = ItemLimit::unlimited();
        assert!(!limit.exceeded_by(u32::MAX));
        assert_eq!(limit.max_processed(), None);
    }
}
