use serde::{Deserialize, Serialize};

use crate::job::{FieldMap, FieldValue, JobItem, JobState};

/// Column name reserved for the source file in serialized rows and CSV.
pub const FILENAME_KEY: &str = "filename";

/// One exportable row: a filename and the fields of a finished item.
///
/// Built once when an item reaches `Done` and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    filename: String,
    #[serde(flatten)]
    fields: FieldMap,
}

impl ResultRecord {
    /// A field named `filename` would collide with the row's own filename
    /// column, so it is dropped.
    pub fn new(filename: impl Into<String>, mut fields: FieldMap) -> Self {
        fields.remove(FILENAME_KEY);
        Self {
            filename: filename.into(),
            fields,
        }
    }

    /// Returns `None` unless the item is `Done`.
    pub fn from_item(item: &JobItem) -> Option<Self> {
        if item.state() != JobState::Done {
            return None;
        }
        item.fields()
            .map(|fields| Self::new(item.filename(), fields.clone()))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Extraction, FileBlob, Transition};

    #[test]
    fn test_record_only_from_done_items() {
        let mut item = JobItem::new(FileBlob::new("a.png", Vec::<u8>::new()));
        assert!(ResultRecord::from_item(&item).is_none());

        item.apply(Transition::Start).unwrap();
        let mut extraction = Extraction::new();
        extraction.insert_field("date", FieldValue::Text("03/01/2024".into()));
        item.apply(Transition::Complete(extraction)).unwrap();

        let record = ResultRecord::from_item(&item).unwrap();
        assert_eq!(record.filename(), "a.png");
        assert_eq!(record.get("date").and_then(|v| v.as_str()), Some("03/01/2024"));
    }

    #[test]
    fn test_record_serializes_flat() {
        let mut fields = FieldMap::new();
        fields.insert("amount".into(), FieldValue::Number(5.0));
        let record = ResultRecord::new("b.jpg", fields);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"filename": "b.jpg", "amount": 5.0}));

        let back: ResultRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_extracted_filename_field_is_dropped() {
        let mut fields = FieldMap::new();
        fields.insert("filename".into(), FieldValue::Text("from-model".into()));
        fields.insert("amount".into(), FieldValue::Number(5.0));
        let record = ResultRecord::new("a.png", fields);

        assert_eq!(record.filename(), "a.png");
        assert!(record.get("filename").is_none());

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text.matches("\"filename\"").count(), 1);
        let back: ResultRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.filename(), "a.png");
        assert_eq!(back, record);
    }
}
