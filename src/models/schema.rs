//! Schema descriptors produced by introspection.
//!
//! Field names serialize in camelCase to match what the downstream chat layer
//! already consumes. Descriptors are built fresh on every call and never cached.

use serde::{Deserialize, Serialize};

/// Direction of a foreign-key edge. Only the referencing side is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Many rows of the owning column reference one row of the target.
    #[serde(rename = "OTM")]
    ManyToOne,
}

/// A foreign-key edge recorded on the referencing column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRelation {
    #[serde(rename = "tableIdentifier")]
    pub target_table: String,
    #[serde(rename = "toColumn")]
    pub target_column: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
}

impl OutgoingRelation {
    pub fn new(target_table: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            target_column: target_column.into(),
            kind: RelationKind::ManyToOne,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    #[serde(rename = "columnIdentifier")]
    pub identifier: String,
    /// `TYPE(SIZE)` for server dialects, the declared type for SQLite.
    #[serde(rename = "columnType")]
    pub column_type: String,
    pub is_primary_key: bool,
    /// Column comment, or the default value for SQLite. Empty when absent.
    #[serde(rename = "columnDescription")]
    pub description: String,
    pub nullable: bool,
    /// Always present, possibly empty.
    pub relations: Vec<OutgoingRelation>,
}

impl ColumnDescriptor {
    pub fn new(identifier: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            column_type: column_type.into(),
            is_primary_key: false,
            description: String::new(),
            nullable: true,
            relations: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the description. `None` becomes the empty string.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.unwrap_or_default();
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_relations(mut self, relations: Vec<OutgoingRelation>) -> Self {
        self.relations = relations;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(rename = "tableIdentifier")]
    pub identifier: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(identifier: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            identifier: identifier.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.identifier == name)
    }

    /// Total number of outgoing relations across all columns.
    pub fn relation_count(&self) -> usize {
        self.columns.iter().map(|c| c.relations.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    #[serde(rename = "database")]
    pub database_identifier: String,
    pub tables: Vec<TableDescriptor>,
}

impl SchemaDescriptor {
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.identifier == name)
    }
}
