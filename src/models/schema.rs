//! Schema-related data models.
//!
//! Tables live in attached SQLite databases, so every table is addressed as
//! `schema.table` with `main` as the implicit schema.

use super::query::QueryResult;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEMA: &str = "main";

/// A validated, schema-qualified table name.
///
/// Both parts consist only of ASCII letters, digits and underscores, so they
/// can be quoted into introspection SQL without escaping concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    /// Parse `table` or `schema.table`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        let parts: Vec<&str> = trimmed.split('.').collect();
        let (schema, name) = match parts.as_slice() {
            [name] => (DEFAULT_SCHEMA, *name),
            [schema, name] => (*schema, *name),
            _ => {
                return Err(format!(
                    "Invalid table name '{trimmed}': use 'table' or 'schema.table'"
                ));
            }
        };

        for part in [schema, name] {
            if !is_identifier(part) {
                return Err(format!(
                    "Invalid table name '{trimmed}': names may only contain letters, digits and underscores"
                ));
            }
        }

        Ok(Self {
            schema: schema.to_string(),
            name: name.to_string(),
        })
    }

    /// `"schema"."table"` for use in SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

pub fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    Table,
    View,
}

impl TableType {
    pub fn from_sqlite(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("view") {
            Self::View
        } else {
            Self::Table
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub table_type: TableType,
}

impl TableInfo {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Column metadata plus optional sample rows for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub table: TableRef,
    pub columns: Vec<ColumnDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<QueryResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_table_uses_main() {
        let table = TableRef::parse("patient").unwrap();
        assert_eq!(table.schema, "main");
        assert_eq!(table.name, "patient");
        assert_eq!(table.quoted(), "\"main\".\"patient\"");
    }

    #[test]
    fn test_parse_qualified_table() {
        let table = TableRef::parse(" readmissions.readmission_summary ").unwrap();
        assert_eq!(table.schema, "readmissions");
        assert_eq!(table.to_string(), "readmissions.readmission_summary");
    }

    #[test]
    fn test_parse_rejects_injection_attempts() {
        assert!(TableRef::parse("patient; DROP TABLE x").is_err());
        assert!(TableRef::parse("a.b.c").is_err());
        assert!(TableRef::parse("").is_err());
        assert!(TableRef::parse("core.").is_err());
        assert!(TableRef::parse("core.\"patient\"").is_err());
    }

    #[test]
    fn test_table_type_from_sqlite() {
        assert_eq!(TableType::from_sqlite("view"), TableType::View);
        assert_eq!(TableType::from_sqlite("table"), TableType::Table);
    }
}
