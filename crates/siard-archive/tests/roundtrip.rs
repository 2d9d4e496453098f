//! End-to-end export/import round trips over real containers.

use std::io::Read;

use siard_archive::{
    Cell, ColumnStructure, DatabaseSink, DatabaseSource, DatabaseStructure,
    ExportOptions, ExportOrchestrator, ImportOptions, ImportOrchestrator,
    NormalizedType, Row, SchemaStructure, TableStructure, TypeDescriptor,
};

/// Cell payload in a form that is cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Null,
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    fn to_cell(&self) -> Cell {
        match self {
            Value::Null => Cell::null(),
            Value::Text(t) => Cell::text(t.clone()),
            Value::Bytes(b) => Cell::bytes(b.clone()),
        }
    }

    fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Simple(None) => Value::Null,
            Cell::Simple(Some(t)) => Value::Text(t.clone()),
            Cell::Binary(p) => {
                let mut bytes = Vec::new();
                p.open().unwrap().read_to_end(&mut bytes).unwrap();
                Value::Bytes(bytes)
            }
            Cell::Composed(children) => {
                // not used by these fixtures
                panic!("unexpected composed cell: {:?}", children)
            }
        }
    }
}

struct MemorySource {
    db: DatabaseStructure,
    rows: Vec<(String, Vec<Vec<Value>>)>,
}

impl DatabaseSource for MemorySource {
    fn structure(&mut self) -> siard_archive::Result<DatabaseStructure> {
        Ok(self.db.clone())
    }

    fn read_rows(
        &mut self,
        _schema: &str,
        table: &str,
        on_row: &mut dyn FnMut(Row) -> siard_archive::Result<()>,
    ) -> siard_archive::Result<()> {
        let rows = self
            .rows
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        for (i, row) in rows.iter().enumerate() {
            on_row(Row::new(
                i as u64 + 1,
                row.iter().map(Value::to_cell).collect(),
            ))?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemorySink {
    db: Option<DatabaseStructure>,
    rows: Vec<(String, Vec<Vec<Value>>)>,
}

impl DatabaseSink for MemorySink {
    fn handle_structure(&mut self, db: &DatabaseStructure) -> siard_archive::Result<()> {
        self.db = Some(db.clone());
        Ok(())
    }

    fn open_table(&mut self, _schema: &str, table: &str) -> siard_archive::Result<()> {
        self.rows.push((table.to_string(), Vec::new()));
        Ok(())
    }

    fn handle_row(&mut self, row: Row) -> siard_archive::Result<()> {
        let current = self.rows.last_mut().expect("row before open_table");
        current
            .1
            .push(row.cells.iter().map(Value::from_cell).collect());
        Ok(())
    }

    fn close_table(&mut self, _schema: &str, _table: &str) -> siard_archive::Result<()> {
        Ok(())
    }
}

fn fixture_db() -> DatabaseStructure {
    let mut people = TableStructure::new("public", "people", 1);
    people.columns.push(ColumnStructure::new(
        &people.id,
        "id",
        TypeDescriptor::new(NormalizedType::NumericExact {
            precision: 10,
            scale: 0,
        }),
    ));
    people.columns.push(ColumnStructure::new(
        &people.id,
        "name",
        TypeDescriptor::new(NormalizedType::String {
            length: 80,
            variable: true,
            charset: None,
        }),
    ));
    people.columns.push(ColumnStructure::new(
        &people.id,
        "photo",
        TypeDescriptor::new(NormalizedType::Binary {
            length: None,
            format_registry: None,
        }),
    ));
    people.primary_key = Some(siard_archive::model::structure::PrimaryKey {
        name: "pk_people".to_string(),
        columns: vec!["id".to_string()],
        description: None,
    });
    people.rows = 3;

    let mut empty = TableStructure::new("public", "audit_log", 2);
    empty.columns.push(ColumnStructure::new(
        &empty.id,
        "entry",
        TypeDescriptor::new(NormalizedType::String {
            length: 200,
            variable: true,
            charset: None,
        }),
    ));
    empty.primary_key = Some(siard_archive::model::structure::PrimaryKey {
        name: "pk_audit".to_string(),
        columns: vec!["entry".to_string()],
        description: None,
    });

    let mut schema = SchemaStructure::new("public", 1);
    schema.tables.push(people);
    schema.tables.push(empty);

    let mut db = DatabaseStructure::new("fixture");
    db.archival_date = Some("2024-05-01".to_string());
    db.schemas.push(schema);
    db
}

fn fixture_rows() -> Vec<(String, Vec<Vec<Value>>)> {
    // photo payloads above the 16-byte threshold externalize
    vec![
        (
            "people".to_string(),
            vec![
                vec![
                    Value::Text("1".to_string()),
                    Value::Text("Ada  Lovelace".to_string()),
                    Value::Bytes(vec![0xAB; 64]),
                ],
                vec![
                    Value::Text("2".to_string()),
                    Value::Null,
                    Value::Bytes(vec![0x01, 0x02]),
                ],
                vec![
                    Value::Text("3".to_string()),
                    Value::Text("with \\ and <tags>".to_string()),
                    Value::Null,
                ],
            ],
        ),
        ("audit_log".to_string(), vec![]),
    ]
}

fn export_options(yaml: &str) -> ExportOptions {
    ExportOptions::from_yaml(yaml).unwrap()
}

fn run_round_trip(options: ExportOptions, import: ImportOptions) -> MemorySink {
    let mut source = MemorySource {
        db: fixture_db(),
        rows: fixture_rows(),
    };
    let result = ExportOrchestrator::new(options)
        .unwrap()
        .run(&mut source)
        .unwrap();
    assert_eq!(result.tables_exported, 2);
    assert_eq!(result.rows_exported, 3);
    assert_eq!(result.lobs_externalized, 1);

    let mut sink = MemorySink::default();
    let imported = ImportOrchestrator::new(import)
        .unwrap()
        .run(&mut sink)
        .unwrap();
    assert_eq!(imported.tables_imported, 2);
    assert_eq!(imported.rows_imported, 3);
    sink
}

fn assert_fixture_restored(sink: &MemorySink) {
    let db = sink.db.as_ref().unwrap();
    assert_eq!(db.name, "fixture");
    let schema = db.schema("public").expect("schema restored by name");
    let tables: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, vec!["people", "audit_log"]);

    let people = schema.table("people").expect("table restored by name");
    assert_eq!(people.columns[0].type_descriptor.sql2008(), "NUMERIC(10)");
    assert_eq!(
        people.columns[1].type_descriptor.sql2008(),
        "CHARACTER VARYING(80)"
    );
    assert_eq!(
        people.columns[2].type_descriptor.sql2008(),
        "BINARY LARGE OBJECT"
    );
    assert_eq!(
        people.primary_key.as_ref().unwrap().columns,
        vec!["id".to_string()]
    );

    assert_eq!(sink.rows, fixture_rows());
}

#[test]
fn test_zip_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fixture.zip");
    let options = export_options(&format!(
        "output: {}\nblob_inline_threshold: 16\n",
        output.display()
    ));
    let import = ImportOptions {
        input: output,
        lob_root: None,
        verify_checksums: true,
    };
    let sink = run_round_trip(options, import);
    assert_fixture_restored(&sink);
}

#[test]
fn test_folder_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fixture");
    let options = export_options(&format!(
        "output: {}\ncompression: none\nblob_inline_threshold: 16\n",
        output.display()
    ));
    let import = ImportOptions {
        input: output,
        lob_root: None,
        verify_checksums: true,
    };
    let sink = run_round_trip(options, import);
    assert_fixture_restored(&sink);
}

#[test]
fn test_external_lob_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fixture.zip");
    let lob_root = dir.path().join("lobs");
    let options = export_options(&format!(
        "output: {}\nlob_root: {}\nblob_inline_threshold: 16\n",
        output.display(),
        lob_root.display()
    ));
    let import = ImportOptions {
        input: output,
        lob_root: Some(lob_root.clone()),
        verify_checksums: true,
    };
    let sink = run_round_trip(options, import);
    assert_fixture_restored(&sink);

    // the payload really lives outside the zip
    assert!(lob_root.join("Documents/docCollection1/1/1.bin").is_file());
}

#[test]
fn test_tampered_archive_fails_checksum_verification() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fixture");
    let options = export_options(&format!(
        "output: {}\ncompression: none\nblob_inline_threshold: 16\n",
        output.display()
    ));
    let mut source = MemorySource {
        db: fixture_db(),
        rows: fixture_rows(),
    };
    ExportOrchestrator::new(options)
        .unwrap()
        .run(&mut source)
        .unwrap();

    // the generated schema is indexed but never parsed on import, so the
    // corruption only trips the digest check
    let target = output.join("content/schema1/table1/table1.xsd");
    let mut bytes = std::fs::read(&target).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&target, bytes).unwrap();

    let mut sink = MemorySink::default();
    let err = ImportOrchestrator::new(ImportOptions {
        input: output,
        lob_root: None,
        verify_checksums: true,
    })
    .unwrap()
    .run(&mut sink);
    assert!(matches!(
        err,
        Err(siard_archive::ArchiveError::Checksum(_))
    ));
}
