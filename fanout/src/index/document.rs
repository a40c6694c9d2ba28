use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stored field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Long(i64),
    Keyword(String),
    Keywords(Vec<String>),
}

impl FieldValue {
    pub fn as_long(&self) -> Option<i64> {
        match self {
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Keyword values of this field; a long contributes its decimal form
    pub fn keywords(&self) -> Vec<String> {
        match self {
            FieldValue::Long(v) => vec![v.to_string()],
            FieldValue::Keyword(s) => vec![s.clone()],
            FieldValue::Keywords(values) => values.clone(),
        }
    }

    pub fn matches_term(&self, term: &str) -> bool {
        match self {
            FieldValue::Long(v) => term.parse::<i64>().map(|t| t == *v).unwrap_or(false),
            FieldValue::Keyword(s) => s == term,
            FieldValue::Keywords(values) => values.iter().any(|v| v == term),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Long(_) => "long",
            FieldValue::Keyword(_) | FieldValue::Keywords(_) => "keyword",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_long(mut self, field: impl Into<String>, value: i64) -> Self {
        self.fields.insert(field.into(), FieldValue::Long(value));
        self
    }

    pub fn with_keyword(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(field.into(), FieldValue::Keyword(value.into()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn long(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(FieldValue::as_long)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Long,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Indexed fields carry term and point statistics; others are doc-values only
    #[serde(default = "default_indexed")]
    pub indexed: bool,
}

fn default_indexed() -> bool {
    true
}

/// Field mappings of an index. Unmapped fields are stored but never indexed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub fields: HashMap<String, FieldMapping>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        indexed: bool,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldMapping {
                field_type,
                indexed,
            },
        );
        self
    }

    pub fn with_long(self, name: impl Into<String>) -> Self {
        self.with_field(name, FieldType::Long, true)
    }

    pub fn with_keyword(self, name: impl Into<String>) -> Self {
        self.with_field(name, FieldType::Keyword, true)
    }

    pub fn get(&self, field: &str) -> Option<&FieldMapping> {
        self.fields.get(field)
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.fields.get(field).map(|m| m.indexed).unwrap_or(false)
    }

    pub fn is_indexed_long(&self, field: &str) -> bool {
        matches!(
            self.fields.get(field),
            Some(FieldMapping {
                field_type: FieldType::Long,
                indexed: true
            })
        )
    }

    /// Reject documents whose values conflict with a mapped type
    pub fn validate(&self, doc: &Document) -> Result<()> {
        if doc.id.is_empty() {
            return Err(Error::Mapping("document id must not be empty".to_string()));
        }
        for (name, value) in &doc.fields {
            if let Some(mapping) = self.fields.get(name) {
                let ok = matches!(
                    (mapping.field_type, value),
                    (FieldType::Long, FieldValue::Long(_))
                        | (FieldType::Keyword, FieldValue::Keyword(_))
                        | (FieldType::Keyword, FieldValue::Keywords(_))
                );
                if !ok {
                    return Err(Error::Mapping(format!(
                        "field [{}] of document [{}] is mapped as {:?} but got a {} value",
                        name,
                        doc.id,
                        mapping.field_type,
                        value.type_name()
                    )));
                }
            }
        }
        Ok(())
    }
}
