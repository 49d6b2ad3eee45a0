// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Warehouse column type.
///
/// Types this job never writes (`TIMESTAMP`, `RECORD`, ...) land in `Other`
/// so an existing table can still be read and compared.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    #[serde(alias = "INT64")]
    Integer,
    #[serde(alias = "FLOAT64")]
    Float,
    String,
    #[serde(untagged)]
    Other(std::string::String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::String => "STRING",
            FieldType::Other(s) => s,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Column mode. Every column of the winners table is `NULLABLE`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    #[serde(untagged)]
    Other(String),
}

/// A single column definition.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct TableField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub mode: FieldMode,
}

impl TableField {
    pub fn nullable(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode: FieldMode::Nullable,
        }
    }
}

/// Ordered column list; serializes as `{"fields": [...]}`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Default)]
pub struct TableSchema {
    pub fields: Vec<TableField>,
}

impl TableSchema {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn types(&self) -> impl Iterator<Item = &FieldType> {
        self.fields.iter().map(|f| &f.field_type)
    }

    /// Same column names and types, in the same order. Modes are not compared.
    pub fn same_columns(&self, other: &TableSchema) -> bool {
        self.names().eq(other.names()) && self.types().eq(other.types())
    }

    /// `name:TYPE` pairs, for error messages.
    pub fn describe(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| format!("{}:{}", f.name, f.field_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_and_mode_deserialize() {
        let field: TableField =
            serde_json::from_str(r#"{"name":"stage_date","type":"TIMESTAMP","mode":"REPEATED"}"#)
                .unwrap();
        assert_eq!(field.field_type, FieldType::Other("TIMESTAMP".into()));
        assert_eq!(field.mode, FieldMode::Other("REPEATED".into()));
        assert_eq!(field.field_type.to_string(), "TIMESTAMP");

        // known names and aliases still map onto their variants
        let field: TableField =
            serde_json::from_str(r#"{"name":"age","type":"INT64","mode":"REQUIRED"}"#).unwrap();
        assert_eq!(field.field_type, FieldType::Integer);
        assert_eq!(field.mode, FieldMode::Required);

        let json = serde_json::to_value(FieldType::Other("GEOGRAPHY".into())).unwrap();
        assert_eq!(json, "GEOGRAPHY");
    }

    #[test]
    fn test_same_columns_ignores_mode() {
        let a = TableSchema {
            fields: vec![
                TableField::nullable("year", FieldType::Integer),
                TableField::nullable("winner", FieldType::String),
            ],
        };
        let mut b = a.clone();
        b.fields[0].mode = FieldMode::Required;
        assert!(a.same_columns(&b));

        b.fields[1].field_type = FieldType::Other("BYTES".into());
        assert!(!a.same_columns(&b));

        let short = TableSchema {
            fields: vec![TableField::nullable("year", FieldType::Integer)],
        };
        assert!(!a.same_columns(&short));
        assert!(!short.same_columns(&a));
    }
}
