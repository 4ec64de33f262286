//! Run-scoped high-water mark for incremental extraction.

use tursotap_types::cursor::ReplicationValue;

/// Tracks the highest replication key value seen during one run.
///
/// Seeded from the restored bookmark; it never moves backwards, so a batch
/// that returns stale values cannot regress it.
#[derive(Debug, Clone)]
pub struct ExtractionCursor {
    replication_key: String,
    start: Option<ReplicationValue>,
    current: Option<ReplicationValue>,
}

impl ExtractionCursor {
    pub fn new(replication_key: impl Into<String>, start: Option<ReplicationValue>) -> Self {
        Self {
            replication_key: replication_key.into(),
            current: start.clone(),
            start,
        }
    }

    pub fn replication_key(&self) -> &str {
        &self.replication_key
    }

    /// Value the run started from.
    pub fn start(&self) -> Option<&ReplicationValue> {
        self.start.as_ref()
    }

    pub fn current(&self) -> Option<&ReplicationValue> {
        self.current.as_ref()
    }

    /// Fold one observed value in. Returns true when the maximum moved.
    pub fn observe(&mut self, value: &ReplicationValue) -> bool {
        let advances = self.current.as_ref().map_or(true, |cur| value > cur);
        if advances {
            self.current = Some(value.clone());
        }
        advances
    }

    /// The value to commit at finalize, if strictly beyond the start value.
    pub fn committable(&self) -> Option<&ReplicationValue> {
        match (&self.current, &self.start) {
            (Some(cur), Some(start)) if cur > start => Some(cur),
            (Some(cur), None) => Some(cur),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn int(v: i64) -> ReplicationValue {
        ReplicationValue::Integer(v)
    }

    #[test]
    fn empty_start_commits_first_observed_maximum() {
        let mut cursor = ExtractionCursor::new("created_at", None);
        assert!(cursor.committable().is_none());
        assert!(cursor.observe(&int(10)));
        assert!(cursor.observe(&int(20)));
        assert!(!cursor.observe(&int(20)));
        assert_eq!(cursor.committable(), Some(&int(20)));
    }

    #[test]
    fn lower_values_do_not_regress() {
        let mut cursor = ExtractionCursor::new("k", Some(int(20)));
        assert!(!cursor.observe(&int(5)));
        assert_eq!(cursor.current(), Some(&int(20)));
        assert!(cursor.committable().is_none());
    }

    #[test]
    fn equal_to_start_is_not_committable() {
        let mut cursor = ExtractionCursor::new("k", Some(int(20)));
        cursor.observe(&int(20));
        assert!(cursor.committable().is_none());
        cursor.observe(&int(30));
        assert_eq!(cursor.committable(), Some(&int(30)));
        assert_eq!(cursor.start(), Some(&int(20)));
    }

    proptest! {
        #[test]
        fn current_is_running_maximum(start in proptest::option::of(any::<i64>()),
                                      values in proptest::collection::vec(any::<i64>(), 0..50)) {
            let mut cursor = ExtractionCursor::new("k", start.map(int));
            for v in &values {
                cursor.observe(&int(*v));
            }
            let expected = start.into_iter().chain(values.iter().copied()).max();
            prop_assert_eq!(cursor.current().cloned(), expected.map(int));
            if let (Some(committed), Some(s)) = (cursor.committable(), start) {
                prop_assert!(*committed > int(s));
            }
        }
    }
}
