//! Record source seam
//!
//! The engine pulls records one at a time and never mutates the source.

use crate::errors::EngineError;
use crate::types::Record;
use std::collections::VecDeque;

/// Supplies records in input order
///
/// Ordinals set by a source are advisory. The scheduler numbers records
/// 1, 2, 3, ... in the order this trait yields them and keys sessions on
/// that number, so a source may leave `ordinal` at zero.
pub trait RecordSource: Send {
    /// Next record, or `None` at end of input
    fn next_record(&mut self) -> Result<Option<Record>, EngineError>;
}

/// In-memory record source
///
/// Assigns 1-based ordinals in insertion order and fills in missing ids.
#[derive(Debug, Default)]
pub struct VecSource {
    records: VecDeque<Record>,
}

impl VecSource {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(i, mut record)| {
                record.ordinal = i + 1;
                if record.id.is_empty() {
                    record.id = record.ordinal.to_string();
                }
                record
            })
            .collect();
        Self { records }
    }

    /// Remaining records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Result<Option<Record>, EngineError> {
        Ok(self.records.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_assigns_ordinals() {
        let mut source = VecSource::new(vec![
            Record::new("", 0, "first", "a"),
            Record::new("custom", 0, "second", "b"),
        ]);
        assert_eq!(source.len(), 2);

        let first = source.next_record().unwrap().unwrap();
        assert_eq!(first.ordinal, 1);
        assert_eq!(first.id, "1");

        let second = source.next_record().unwrap().unwrap();
        assert_eq!(second.ordinal, 2);
        assert_eq!(second.id, "custom");

        assert!(source.next_record().unwrap().is_none());
    }
}
