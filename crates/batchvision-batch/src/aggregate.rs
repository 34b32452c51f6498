use std::sync::RwLock;

use batchvision_core::result::ResultRecord;

use crate::lock;

/// Successful extractions in completion order.
///
/// Records can only be appended or dropped all at once; nothing edits a
/// record after it lands here.
#[derive(Debug, Default)]
pub struct ResultAggregate {
    records: RwLock<Vec<ResultRecord>>,
}

impl ResultAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: ResultRecord) {
        lock::write(&self.records, "results").push(record);
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        lock::read(&self.records, "results").clone()
    }

    pub fn clear(&self) {
        lock::write(&self.records, "results").clear();
    }

    pub fn len(&self) -> usize {
        lock::read(&self.records, "results").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchvision_core::job::{FieldMap, FieldValue};

    fn record(filename: &str, amount: f64) -> ResultRecord {
        let mut fields = FieldMap::new();
        fields.insert("amount".into(), FieldValue::Number(amount));
        ResultRecord::new(filename, fields)
    }

    #[test]
    fn test_append_keeps_order_and_duplicates() {
        let aggregate = ResultAggregate::new();
        aggregate.append(record("b.png", 2.0));
        aggregate.append(record("a.png", 1.0));
        aggregate.append(record("b.png", 3.0));

        let records = aggregate.records();
        let names: Vec<_> = records.iter().map(|r| r.filename()).collect();
        assert_eq!(names, vec!["b.png", "a.png", "b.png"]);
        assert_eq!(aggregate.len(), 3);
    }

    #[test]
    fn test_records_are_copies() {
        let aggregate = ResultAggregate::new();
        aggregate.append(record("a.png", 1.0));
        let before = aggregate.records();

        aggregate.append(record("b.png", 2.0));
        assert_eq!(before.len(), 1);

        aggregate.clear();
        assert!(aggregate.is_empty());
        assert_eq!(before.len(), 1);
    }
}
