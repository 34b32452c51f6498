use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BatchVisionError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::String => write!(f, "string"),
            PropertyType::Number => write!(f, "number"),
            PropertyType::Boolean => write!(f, "boolean"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default)]
    pub description: String,
}

/// Property declarations in the order they were written.
///
/// Export column order follows declaration order, so this cannot be a
/// sorted map. A repeated name keeps its first position and the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, PropertySchema)>);

impl Properties {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, property: PropertySchema) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = property,
            None => self.0.push((name, property)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertySchema)> {
        self.0.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, property) in &self.0 {
            map.serialize_entry(name, property)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Properties;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of property name to property schema")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut properties = Properties::new();
                while let Some((name, property)) =
                    access.next_entry::<String, PropertySchema>()?
                {
                    properties.insert(name, property);
                }
                Ok(properties)
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}

fn object_type() -> String {
    "object".to_string()
}

/// The contract handed to the extraction service: which fields to extract,
/// their types, and which of them must be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    pub properties: Properties,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub additional_properties: bool,
}

/// One row of the schema editor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self {
            schema_type: object_type(),
            properties: Properties::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }

    /// Builder-style helper used by defaults and tests.
    pub fn with_property(
        mut self,
        name: &str,
        kind: PropertyType,
        description: &str,
        required: bool,
    ) -> Self {
        self.properties.insert(
            name,
            PropertySchema {
                kind,
                description: description.to_string(),
            },
        );
        if required && !self.is_required(name) {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// True when every declared property is also required.
    pub fn all_required(&self) -> bool {
        self.properties.names().all(|name| self.is_required(name))
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_type != "object" {
            return Err(BatchVisionError::InvalidSchema(format!(
                "schema type must be \"object\", got \"{}\"",
                self.schema_type
            )));
        }
        if self.properties.is_empty() {
            return Err(BatchVisionError::InvalidSchema(
                "schema declares no properties".to_string(),
            ));
        }
        if let Some(blank) = self.properties.names().find(|n| n.trim().is_empty()) {
            return Err(BatchVisionError::InvalidSchema(format!(
                "property name {blank:?} is blank"
            )));
        }
        if let Some(unknown) = self
            .required
            .iter()
            .find(|r| !self.properties.contains(r))
        {
            return Err(BatchVisionError::InvalidSchema(format!(
                "required field \"{unknown}\" is not a declared property"
            )));
        }
        Ok(())
    }

    /// Builds a schema from editor rows. Rows with a blank name are skipped.
    pub fn from_properties(rows: &[SchemaProperty]) -> Self {
        rows.iter()
            .filter(|row| !row.name.trim().is_empty())
            .fold(Schema::new(), |schema, row| {
                schema.with_property(row.name.trim(), row.kind, &row.description, row.required)
            })
    }

    pub fn to_properties(&self) -> Vec<SchemaProperty> {
        self.properties
            .iter()
            .map(|(name, property)| SchemaProperty {
                name: name.to_string(),
                kind: property.kind,
                description: property.description.clone(),
                required: self.is_required(name),
            })
            .collect()
    }

    /// Renders an extraction prompt that lists every declared property.
    pub fn prompt_for(&self, images_of: &str) -> String {
        let lines: Vec<String> = self
            .properties
            .iter()
            .map(|(name, property)| {
                let required = if self.is_required(name) {
                    " (required)"
                } else {
                    ""
                };
                format!("- {name}{required}: {}", property.description)
            })
            .collect();

        format!(
            "Analyze this image of {images_of} and extract the following information:\n\n{}\n\nRespond with valid JSON.",
            lines.join("\n")
        )
    }
}

impl Default for Schema {
    /// The receipt schema: a date and a total amount, both required.
    fn default() -> Self {
        Schema::new()
            .with_property(
                "date",
                PropertyType::String,
                "The date of the receipt in mm/dd/yyyy format.",
                true,
            )
            .with_property(
                "amount",
                PropertyType::Number,
                "The amount, including tips, in monetary format.",
                true,
            )
    }
}
