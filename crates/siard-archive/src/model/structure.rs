//! Database structure tree.
//!
//! Built once per export/import run by the structure-handling step and
//! treated as immutable afterward. The tree mirrors the archive's metadata
//! document: database, schemas, tables with columns/keys/constraints, plus
//! views and routines which travel through metadata only.

use crate::error::{ArchiveError, Result};
use crate::model::types::{NormalizedType, TypeDescriptor};

/// Root of the structure tree for one database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseStructure {
    pub name: String,
    pub description: Option<String>,
    /// Person or organization performing the archiving.
    pub archiver: Option<String>,
    /// ISO-8601 date string supplied by the caller.
    pub archival_date: Option<String>,
    pub producer_application: Option<String>,
    pub schemas: Vec<SchemaStructure>,
}

impl DatabaseStructure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Look up a schema by name.
    pub fn schema(&self, name: &str) -> Option<&SchemaStructure> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// Total number of tables across all schemas.
    pub fn table_count(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }

    /// Validate structural invariants before any bytes are written.
    ///
    /// Recursive composed types and tables without columns are fatal.
    /// When `require_primary_keys` is set (the DK variant), a table without
    /// a primary key is fatal too. Suspicious trigger definitions are only
    /// warned about; they do not affect row data.
    pub fn validate(&self, require_primary_keys: bool) -> Result<()> {
        if self.schemas.is_empty() {
            return Err(ArchiveError::Structure(
                "database has no schemas".to_string(),
            ));
        }
        for schema in &self.schemas {
            for table in &schema.tables {
                if table.columns.is_empty() {
                    return Err(ArchiveError::Structure(format!(
                        "table {}.{} has no columns",
                        schema.name, table.name
                    )));
                }
                if require_primary_keys && table.primary_key.is_none() {
                    return Err(ArchiveError::Structure(format!(
                        "table {}.{} has no primary key, required by the archive variant",
                        schema.name, table.name
                    )));
                }
                for column in &table.columns {
                    if let NormalizedType::Composed(composed) = &column.type_descriptor.kind {
                        let own_name =
                            column.type_descriptor.original_type_name.as_deref();
                        if composed.is_recursive(own_name) {
                            return Err(ArchiveError::Structure(format!(
                                "column {}.{}.{} has a self-referential composed type",
                                schema.name, table.name, column.name
                            )));
                        }
                    }
                }
                for trigger in &table.triggers {
                    if !trigger.is_well_formed() {
                        tracing::warn!(
                            table = %table.name,
                            trigger = %trigger.name,
                            "trigger has unrecognized action time or event, kept as-is"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// One schema: a named group of tables, views and routines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaStructure {
    pub name: String,
    /// Archive folder name, `schema<index>`.
    pub folder: String,
    pub description: Option<String>,
    /// 1-based position inside the database.
    pub index: usize,
    pub tables: Vec<TableStructure>,
    pub views: Vec<ViewStructure>,
    pub routines: Vec<RoutineStructure>,
}

impl SchemaStructure {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            folder: format!("schema{}", index),
            index,
            ..Default::default()
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableStructure> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// One table definition plus its declared row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStructure {
    /// Stable identifier, `<schema>.<table>`.
    pub id: String,
    pub name: String,
    /// Archive folder name, `table<index>`.
    pub folder: String,
    pub description: Option<String>,
    /// 1-based position inside the schema.
    pub index: usize,
    pub columns: Vec<ColumnStructure>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: Vec<ForeignKey>,
    pub candidate_keys: Vec<CandidateKey>,
    pub check_constraints: Vec<CheckConstraint>,
    pub triggers: Vec<Trigger>,
    /// Row count declared by the producer, echoed into metadata.
    pub rows: u64,
}

impl TableStructure {
    pub fn new(schema: &str, name: impl Into<String>, index: usize) -> Self {
        let name = name.into();
        Self {
            id: format!("{}.{}", schema, name),
            folder: format!("table{}", index),
            name,
            index,
            ..Default::default()
        }
    }

    /// Column lookup by 1-based ordinal.
    pub fn column(&self, ordinal: usize) -> Option<&ColumnStructure> {
        ordinal.checked_sub(1).and_then(|i| self.columns.get(i))
    }
}

/// One column. The 1-based ordinal is implied by position in
/// [`TableStructure::columns`] and derives the wire field name (`c1`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStructure {
    /// Stable identifier, `<schema>.<table>.<column>`.
    pub id: String,
    pub name: String,
    pub type_descriptor: TypeDescriptor,
    pub nillable: bool,
    pub default_value: Option<String>,
    pub description: Option<String>,
}

impl ColumnStructure {
    pub fn new(
        table_id: &str,
        name: impl Into<String>,
        type_descriptor: TypeDescriptor,
    ) -> Self {
        let name = name.into();
        Self {
            id: format!("{}.{}", table_id, name),
            name,
            type_descriptor,
            nillable: true,
            default_value: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeignKey {
    pub name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    /// Pairs of (local column, referenced column).
    pub column_refs: Vec<(String, String)>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateKey {
    pub name: String,
    pub columns: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckConstraint {
    pub name: String,
    pub condition: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trigger {
    pub name: String,
    /// BEFORE, AFTER or INSTEAD OF.
    pub action_time: String,
    /// INSERT, UPDATE or DELETE.
    pub trigger_event: String,
    pub triggered_action: String,
    pub description: Option<String>,
}

impl Trigger {
    /// Whether action time and event use the standard vocabulary.
    pub fn is_well_formed(&self) -> bool {
        let time_ok = matches!(
            self.action_time.to_ascii_uppercase().as_str(),
            "BEFORE" | "AFTER" | "INSTEAD OF"
        );
        let event_ok = matches!(
            self.trigger_event.to_ascii_uppercase().as_str(),
            "INSERT" | "UPDATE" | "DELETE"
        );
        time_ok && event_ok
    }
}

/// View definition, carried through metadata only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewStructure {
    pub name: String,
    pub query: Option<String>,
    pub description: Option<String>,
}

/// Stored routine, carried through metadata only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutineStructure {
    pub name: String,
    pub body: Option<String>,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{ComposedType, NormalizedType, TypeDescriptor};

    fn small_db(with_pk: bool) -> DatabaseStructure {
        let mut table = TableStructure::new("public", "people", 1);
        table.columns.push(ColumnStructure::new(
            &table.id,
            "id",
            TypeDescriptor::new(NormalizedType::NumericExact {
                precision: 10,
                scale: 0,
            }),
        ));
        if with_pk {
            table.primary_key = Some(PrimaryKey {
                name: "pk_people".to_string(),
                columns: vec!["id".to_string()],
                description: None,
            });
        }
        let mut schema = SchemaStructure::new("public", 1);
        schema.tables.push(table);
        let mut db = DatabaseStructure::new("testdb");
        db.schemas.push(schema);
        db
    }

    #[test]
    fn test_validate_ok() {
        assert!(small_db(true).validate(false).is_ok());
        assert!(small_db(true).validate(true).is_ok());
    }

    #[test]
    fn test_validate_requires_primary_key_only_when_asked() {
        let db = small_db(false);
        assert!(db.validate(false).is_ok());
        assert!(db.validate(true).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_table() {
        let mut db = small_db(true);
        db.schemas[0].tables[0].columns.clear();
        assert!(db.validate(false).is_err());
    }

    #[test]
    fn test_validate_rejects_recursive_composed_column() {
        let mut db = small_db(true);
        let mut inner = ComposedType::new();
        inner.add_child(
            "self",
            TypeDescriptor::new(NormalizedType::Composed(ComposedType::new()))
                .with_original("addr_t"),
        );
        let table_id = db.schemas[0].tables[0].id.clone();
        db.schemas[0].tables[0].columns.push(ColumnStructure::new(
            &table_id,
            "addr",
            TypeDescriptor::new(NormalizedType::Composed(inner)).with_original("addr_t"),
        ));
        assert!(db.validate(false).is_err());
    }

    #[test]
    fn test_folder_names() {
        let db = small_db(true);
        assert_eq!(db.schemas[0].folder, "schema1");
        assert_eq!(db.schemas[0].tables[0].folder, "table1");
        assert_eq!(db.schemas[0].tables[0].id, "public.people");
    }
}
