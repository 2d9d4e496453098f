//! Streaming table content reader.
//!
//! Consumes a table's row document through the pull tokenizer and an
//! explicit state machine, reconstructing one [`Row`] per record and
//! handing it to a callback immediately, so memory stays proportional to
//! one row rather than the table. A record whose field count disagrees
//! with the schema is recovered per row: a warning plus an all-null
//! substitute, never an aborted table.

use std::io::Read;

use tracing::warn;

use crate::content::escape::unescape;
use crate::content::events::{XmlEvent, XmlTokenizer};
use crate::error::{ArchiveError, Result};
use crate::model::cell::{Cell, LobProvider, Row};
use crate::model::structure::TableStructure;
use crate::model::types::{NormalizedType, TypeDescriptor};
use crate::path;
use crate::read::ReadStrategy;
use crate::typemap::{self, XsdType};

/// Externalized payload spilled to a private temp file so it can be
/// reopened like any other LOB source.
struct TempLob {
    file: tempfile::NamedTempFile,
    size: u64,
}

impl LobProvider for TempLob {
    fn size(&self) -> u64 {
        self.size
    }

    fn open(&self) -> Result<Box<dyn Read>> {
        Ok(Box::new(self.file.reopen()?))
    }
}

/// Streaming decoder from archive bytes to rows.
pub struct ContentReader;

impl ContentReader {
    /// Read one table, invoking `on_row` per reconstructed row. Returns
    /// the number of rows delivered.
    ///
    /// `lob` is the external LOB tree, when the archive has one; paths
    /// under the LOB root resolve there, everything else against `main`.
    /// The option is taken by mutable reference so one external tree can
    /// serve every table of an import run.
    pub fn read_table(
        main: &mut dyn ReadStrategy,
        lob: &mut Option<&mut (dyn ReadStrategy + '_)>,
        schema_index: usize,
        table: &TableStructure,
        on_row: &mut dyn FnMut(Row) -> Result<()>,
    ) -> Result<u64> {
        let logical = path::table_xml(schema_index, table.index);
        let input = main.create_input(&logical)?;
        let mut tokens = XmlTokenizer::new(input);
        tokens.expect_start("table")?;

        let mut rows = 0u64;
        loop {
            match tokens.next_event()? {
                XmlEvent::StartElement { name, .. } if name == "row" => {
                    rows += 1;
                    let row = parse_row(&mut tokens, main, lob, table, rows)?;
                    on_row(row)?;
                }
                XmlEvent::EndElement { name } if name == "table" => break,
                XmlEvent::Eof => break,
                XmlEvent::Text(_) => {}
                XmlEvent::StartElement { name, .. } => {
                    return Err(ArchiveError::malformed(
                        &table.id,
                        format!("unexpected element <{}> between rows", name),
                    ))
                }
                XmlEvent::EndElement { .. } => {}
            }
        }
        Ok(rows)
    }
}

fn parse_row(
    tokens: &mut XmlTokenizer<Box<dyn Read>>,
    main: &mut dyn ReadStrategy,
    lob: &mut Option<&mut (dyn ReadStrategy + '_)>,
    table: &TableStructure,
    row_index: u64,
) -> Result<Row> {
    let column_count = table.columns.len();
    let mut cells: Vec<Option<Cell>> = std::iter::repeat_with(|| None)
        .take(column_count)
        .collect();
    let mut fields_seen = 0usize;
    let mut out_of_range = false;

    loop {
        match tokens.next_event()? {
            XmlEvent::StartElement {
                name,
                attrs,
                self_closing,
            } => {
                fields_seen += 1;
                let ordinal = name
                    .strip_prefix('c')
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|&n| n >= 1 && n <= column_count);
                let descriptor = ordinal
                    .and_then(|n| table.column(n))
                    .map(|c| &c.type_descriptor);
                let cell = parse_cell(
                    tokens,
                    main,
                    lob,
                    &table.id,
                    &name,
                    &attrs,
                    self_closing,
                    descriptor,
                )?;
                match ordinal {
                    Some(n) => cells[n - 1] = Some(cell),
                    None => out_of_range = true,
                }
            }
            XmlEvent::EndElement { name } if name == "row" => break,
            XmlEvent::Text(_) => {}
            XmlEvent::EndElement { .. } => {}
            XmlEvent::Eof => {
                return Err(ArchiveError::malformed(
                    &table.id,
                    "document ended inside a row".to_string(),
                ))
            }
        }
    }

    let complete = !out_of_range
        && fields_seen == column_count
        && cells.iter().all(Option::is_some);
    if !complete {
        warn!(
            table = %table.id,
            row = row_index,
            fields = fields_seen,
            columns = column_count,
            "malformed record, substituting an all-null row"
        );
        return Ok(Row::new(
            row_index,
            (0..column_count).map(|_| Cell::null()).collect(),
        ));
    }
    Ok(Row::new(
        row_index,
        cells
            .into_iter()
            .map(|c| c.unwrap_or_else(Cell::null))
            .collect(),
    ))
}

#[allow(clippy::too_many_arguments)]
fn parse_cell(
    tokens: &mut XmlTokenizer<Box<dyn Read>>,
    main: &mut dyn ReadStrategy,
    lob: &mut Option<&mut (dyn ReadStrategy + '_)>,
    table_id: &str,
    name: &str,
    attrs: &[(String, String)],
    self_closing: bool,
    descriptor: Option<&TypeDescriptor>,
) -> Result<Cell> {
    // externalized payload reference
    if let Some((_, file)) = attrs.iter().find(|(k, _)| k == "file") {
        let cell = resolve_lob(main, lob, table_id, file, descriptor)?;
        consume_until_end(tokens, name)?;
        return Ok(cell);
    }

    if self_closing {
        consume_until_end(tokens, name)?;
        return Ok(Cell::null());
    }

    let mut text = String::new();
    let mut children: Vec<Cell> = Vec::new();
    loop {
        match tokens.next_event()? {
            XmlEvent::Text(t) => text.push_str(&t),
            XmlEvent::StartElement {
                name: child,
                attrs: child_attrs,
                self_closing: child_closed,
            } => {
                let leaf = child
                    .strip_prefix('u')
                    .and_then(|n| n.parse::<usize>().ok());
                let leaf_descriptor = match (leaf, descriptor) {
                    (Some(k), Some(d)) => leaf_field(d, k),
                    _ => None,
                };
                let cell = parse_cell(
                    tokens,
                    main,
                    lob,
                    table_id,
                    &child,
                    &child_attrs,
                    child_closed,
                    leaf_descriptor.as_ref(),
                )?;
                children.push(cell);
            }
            XmlEvent::EndElement { name: n } if n == name => break,
            XmlEvent::EndElement { .. } => {}
            XmlEvent::Eof => {
                return Err(ArchiveError::malformed(
                    table_id,
                    format!("document ended inside <{}>", name),
                ))
            }
        }
    }

    if !children.is_empty() {
        return Ok(Cell::Composed(children));
    }

    let binary = matches!(
        descriptor.map(|d| &d.kind),
        Some(NormalizedType::Binary { .. })
    );
    if binary {
        let bytes = hex::decode(text.trim()).map_err(|e| {
            ArchiveError::malformed(table_id, format!("bad inline hex in <{}>: {}", name, e))
        })?;
        return Ok(Cell::bytes(bytes));
    }
    Ok(Cell::Simple(Some(unescape(&text))))
}

/// Look up the k-th flattened leaf of a composed column, 1-based.
fn leaf_field(descriptor: &TypeDescriptor, k: usize) -> Option<TypeDescriptor> {
    match &descriptor.kind {
        NormalizedType::Composed(composed) => composed
            .flatten(descriptor.original_type_name.as_deref())
            .ok()?
            .into_iter()
            .nth(k.checked_sub(1)?)
            .map(|leaf| leaf.descriptor),
        _ => None,
    }
}

/// Resolve a `file=` reference against the right container.
fn resolve_lob(
    main: &mut dyn ReadStrategy,
    lob: &mut Option<&mut (dyn ReadStrategy + '_)>,
    table_id: &str,
    logical_path: &str,
    descriptor: Option<&TypeDescriptor>,
) -> Result<Cell> {
    let source: &mut dyn ReadStrategy = match lob {
        Some(strategy) if logical_path.starts_with(path::LOB_ROOT) => &mut **strategy,
        _ => main,
    };
    let mut input = source.create_input(logical_path)?;

    let textual = descriptor
        .map(|d| typemap::xsd_type(d) == XsdType::Clob)
        .unwrap_or(false);
    if textual {
        let mut text = String::new();
        input.read_to_string(&mut text).map_err(|e| {
            ArchiveError::malformed(
                table_id,
                format!("character LOB {} is not valid UTF-8: {}", logical_path, e),
            )
        })?;
        return Ok(Cell::Simple(Some(text)));
    }

    let mut spill = tempfile::NamedTempFile::new()?;
    let size = std::io::copy(&mut input, &mut spill)
        .map_err(|e| ArchiveError::file(logical_path.to_string(), e))?;
    Ok(Cell::Binary(Box::new(TempLob { file: spill, size })))
}

fn consume_until_end(tokens: &mut XmlTokenizer<Box<dyn Read>>, name: &str) -> Result<()> {
    loop {
        match tokens.next_event()? {
            XmlEvent::EndElement { name: n } if n == name => return Ok(()),
            XmlEvent::Eof => {
                return Err(ArchiveError::malformed(
                    "<stream>",
                    format!("document ended inside <{}>", name),
                ))
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::structure::ColumnStructure;
    use crate::read::FolderReadStrategy;

    fn two_column_table() -> TableStructure {
        let mut table = TableStructure::new("public", "t", 1);
        table.columns.push(ColumnStructure::new(
            &table.id,
            "name",
            TypeDescriptor::new(NormalizedType::String {
                length: 80,
                variable: true,
                charset: None,
            }),
        ));
        table.columns.push(ColumnStructure::new(
            &table.id,
            "payload",
            TypeDescriptor::new(NormalizedType::Binary {
                length: None,
                format_registry: None,
            }),
        ));
        table
    }

    fn write_table_doc(dir: &std::path::Path, body: &str) {
        let folder = dir.join("content/schema1/table1");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(
            folder.join("table1.xml"),
            format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<table>{}</table>", body),
        )
        .unwrap();
    }

    fn read_all(dir: &std::path::Path, table: &TableStructure) -> Vec<Row> {
        let mut strategy = FolderReadStrategy::new(dir);
        let mut rows = Vec::new();
        ContentReader::read_table(&mut strategy, &mut None, 1, table, &mut |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        rows
    }

    #[test]
    fn test_reads_text_null_and_inline_hex() {
        let dir = tempfile::tempdir().unwrap();
        write_table_doc(
            dir.path(),
            "<row><c1>a&lt;b</c1><c2>dead</c2></row>\
             <row><c1/><c2/></row>",
        );
        let rows = read_all(dir.path(), &two_column_table());
        assert_eq!(rows.len(), 2);

        match &rows[0].cells[0] {
            Cell::Simple(Some(t)) => assert_eq!(t, "a<b"),
            other => panic!("unexpected cell {:?}", other),
        }
        match &rows[0].cells[1] {
            Cell::Binary(p) => {
                let mut bytes = Vec::new();
                p.open().unwrap().read_to_end(&mut bytes).unwrap();
                assert_eq!(bytes, vec![0xDE, 0xAD]);
            }
            other => panic!("unexpected cell {:?}", other),
        }
        assert!(rows[1].cells[0].is_null());
        assert!(rows[1].cells[1].is_null());
    }

    #[test]
    fn test_empty_element_is_empty_string_not_null() {
        let dir = tempfile::tempdir().unwrap();
        write_table_doc(dir.path(), "<row><c1></c1><c2/></row>");
        let rows = read_all(dir.path(), &two_column_table());
        match &rows[0].cells[0] {
            Cell::Simple(Some(t)) => assert_eq!(t, ""),
            other => panic!("unexpected cell {:?}", other),
        }
    }

    #[test]
    fn test_short_row_substituted_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        write_table_doc(
            dir.path(),
            "<row><c1>ok</c1><c2>beef</c2></row>\
             <row><c1>short</c1></row>\
             <row><c1>fine</c1><c2/></row>",
        );
        let rows = read_all(dir.path(), &two_column_table());
        assert_eq!(rows.len(), 3);
        assert!(rows[1].cells.iter().all(Cell::is_null));
        match &rows[2].cells[0] {
            Cell::Simple(Some(t)) => assert_eq!(t, "fine"),
            other => panic!("unexpected cell {:?}", other),
        }
    }

    #[test]
    fn test_external_lob_resolved_from_container() {
        let dir = tempfile::tempdir().unwrap();
        write_table_doc(
            dir.path(),
            "<row><c1/><c2 file=\"Documents/docCollection1/1/1.bin\" \
             length=\"3\" digest=\"AA\" digestType=\"MD5\"/></row>",
        );
        let lob_dir = dir.path().join("Documents/docCollection1/1");
        std::fs::create_dir_all(&lob_dir).unwrap();
        std::fs::write(lob_dir.join("1.bin"), [9u8, 8, 7]).unwrap();

        let rows = read_all(dir.path(), &two_column_table());
        match &rows[0].cells[1] {
            Cell::Binary(p) => {
                assert_eq!(p.size(), 3);
                let mut bytes = Vec::new();
                p.open().unwrap().read_to_end(&mut bytes).unwrap();
                assert_eq!(bytes, vec![9, 8, 7]);
            }
            other => panic!("unexpected cell {:?}", other),
        }
    }

    #[test]
    fn test_lob_strategy_serves_repeated_table_reads() {
        let dir = tempfile::tempdir().unwrap();
        write_table_doc(
            dir.path(),
            "<row><c1/><c2 file=\"Documents/docCollection1/1/1.bin\" \
             length=\"2\" digest=\"AA\" digestType=\"MD5\"/></row>",
        );
        let lob_dir = tempfile::tempdir().unwrap();
        let payload_dir = lob_dir.path().join("Documents/docCollection1/1");
        std::fs::create_dir_all(&payload_dir).unwrap();
        std::fs::write(payload_dir.join("1.bin"), [4u8, 2]).unwrap();

        let table = two_column_table();
        let mut main = FolderReadStrategy::new(dir.path());
        let mut lob_tree = FolderReadStrategy::new(lob_dir.path());
        let mut lob: Option<&mut dyn ReadStrategy> = Some(&mut lob_tree);

        // one external tree resolves payloads across consecutive tables
        for _ in 0..2 {
            let mut payloads = Vec::new();
            ContentReader::read_table(&mut main, &mut lob, 1, &table, &mut |row| {
                match &row.cells[1] {
                    Cell::Binary(p) => {
                        let mut bytes = Vec::new();
                        p.open()?.read_to_end(&mut bytes)?;
                        payloads.push(bytes);
                    }
                    other => panic!("unexpected cell {:?}", other),
                }
                Ok(())
            })
            .unwrap();
            assert_eq!(payloads, vec![vec![4u8, 2]]);
        }
    }

    #[test]
    fn test_composed_cell_reconstructed() {
        let mut composed = crate::model::types::ComposedType::new();
        composed.add_child(
            "street",
            TypeDescriptor::new(NormalizedType::String {
                length: 40,
                variable: true,
                charset: None,
            }),
        );
        composed.add_child(
            "zip",
            TypeDescriptor::new(NormalizedType::String {
                length: 8,
                variable: true,
                charset: None,
            }),
        );
        let mut table = TableStructure::new("public", "addr", 1);
        table.columns.push(ColumnStructure::new(
            &table.id,
            "address",
            TypeDescriptor::new(NormalizedType::Composed(composed)).with_original("addr_t"),
        ));

        let dir = tempfile::tempdir().unwrap();
        write_table_doc(dir.path(), "<row><c1><u1>Main St</u1><u2/></c1></row>");
        let rows = read_all(dir.path(), &table);
        match &rows[0].cells[0] {
            Cell::Composed(children) => {
                assert_eq!(children.len(), 2);
                match &children[0] {
                    Cell::Simple(Some(t)) => assert_eq!(t, "Main St"),
                    other => panic!("unexpected child {:?}", other),
                }
                assert!(children[1].is_null());
            }
            other => panic!("unexpected cell {:?}", other),
        }
    }
}
