use batchvision_core::job::FieldValue;
use batchvision_core::result::ResultRecord;
use batchvision_core::schema::Schema;

pub const EXPORT_FILENAME: &str = "extracted-data.csv";

/// Renders result records as CSV.
///
/// The header is `Filename` followed by each schema property, capitalized,
/// in declaration order. Numbers are written plainly, booleans as `Yes`/`No`,
/// and missing values as empty cells. Text has its quotes doubled and is
/// wrapped in quotes only when it contains a comma. Rows are joined by `\n`
/// with no trailing newline.
pub fn to_csv(records: &[ResultRecord], schema: &Schema) -> String {
    let names: Vec<&str> = schema.properties.names().collect();

    let header = std::iter::once("Filename".to_string())
        .chain(names.iter().map(|name| capitalize(name)))
        .collect::<Vec<_>>()
        .join(",");

    let rows = records.iter().map(|record| {
        std::iter::once(escape_text(record.filename()))
            .chain(names.iter().map(|name| format_value(record.get(name))))
            .collect::<Vec<_>>()
            .join(",")
    });

    std::iter::once(header)
        .chain(rows)
        .collect::<Vec<_>>()
        .join("\n")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_value(value: Option<&FieldValue>) -> String {
    match value {
        None => String::new(),
        Some(FieldValue::Number(n)) => n.to_string(),
        Some(FieldValue::Boolean(b)) => yes_no(*b),
        Some(FieldValue::Text(s)) => escape_text(s),
        Some(FieldValue::Other(other)) => match other {
            serde_json::Value::Null => String::new(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => yes_no(*b),
            serde_json::Value::String(s) => escape_text(s),
            nested => escape_text(&nested.to_string()),
        },
    }
}

fn yes_no(b: bool) -> String {
    let label = if b { "Yes" } else { "No" };
    label.to_string()
}

fn escape_text(text: &str) -> String {
    let escaped = text.replace('"', "\"\"");
    if escaped.contains(',') {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}
