//! Streaming table content writer.
//!
//! Drives the `open_table -> write_row* -> close_table` protocol. Each
//! table produces one row document plus one generated schema document,
//! both digest-tracked. Binary payloads are inlined as hex under the
//! configured threshold and externalized through the LOB tracker above
//! it; oversized character objects externalize the same way.
//!
//! When the large-object target is the main container and the strategy
//! cannot keep two entries open, externalized payloads are spilled to
//! unnamed temporary files and copied into the container after the
//! table's row document is closed.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, info};

use crate::checksum::{copy_with_md5, FileIndex, TrackedWriter};
use crate::config::ExportOptions;
use crate::content::escape::escape;
use crate::content::xml::XmlWriter;
use crate::error::{ArchiveError, Result};
use crate::lob::LobTracker;
use crate::model::cell::{Cell, LobProvider, Row};
use crate::model::structure::TableStructure;
use crate::model::types::{LeafField, NormalizedType, TypeDescriptor};
use crate::path;
use crate::typemap::{self, XsdType};
use crate::write::{ArchiveContainer, ContainerRole, WriteStrategy};

/// Writer-side table state. The two-state machine keeps the protocol
/// honest: rows can only be written between `open_table` and
/// `close_table`, and only one table is open at a time.
enum WriterState {
    Idle,
    TableOpen(Box<OpenTable>),
}

struct OpenTable {
    xml: XmlWriter<TrackedWriter>,
    table: TableStructure,
    schema_index: usize,
    rows: u64,
    lobs: u64,
    deferred: Vec<DeferredLob>,
}

/// A LOB payload spilled to a temp file, waiting for the row document's
/// container entry to close.
struct DeferredLob {
    logical_path: String,
    spill: File,
    digest_hex: String,
}

/// Streaming encoder from rows to archive bytes.
pub struct ContentWriter<'a> {
    strategy: &'a mut dyn WriteStrategy,
    main: &'a ArchiveContainer,
    lob_container: &'a ArchiveContainer,
    tracker: &'a mut LobTracker,
    index: FileIndex,
    blob_inline_threshold: u64,
    clob_inline_threshold: u64,
    pretty: bool,
    defer_lobs: bool,
    state: WriterState,
}

impl<'a> ContentWriter<'a> {
    pub fn new(
        strategy: &'a mut dyn WriteStrategy,
        main: &'a ArchiveContainer,
        lob_container: &'a ArchiveContainer,
        tracker: &'a mut LobTracker,
        index: FileIndex,
        options: &ExportOptions,
    ) -> Self {
        let defer_lobs = lob_container.role == ContainerRole::Main
            && !strategy.is_simultaneous_writing_supported();
        Self {
            strategy,
            main,
            lob_container,
            tracker,
            index,
            blob_inline_threshold: options.blob_inline_threshold,
            clob_inline_threshold: options.clob_inline_threshold,
            pretty: options.pretty_xml,
            defer_lobs,
            state: WriterState::Idle,
        }
    }

    /// Start one table's row document.
    pub fn open_table(&mut self, schema_index: usize, table: &TableStructure) -> Result<()> {
        if matches!(self.state, WriterState::TableOpen(_)) {
            return Err(ArchiveError::Structure(format!(
                "open_table({}) while another table is open",
                table.id
            )));
        }
        let logical = path::table_xml(schema_index, table.index);
        let out = self.strategy.create_output(self.main, &logical)?;
        let mut xml = XmlWriter::new(self.index.wrap(logical, out), self.pretty);
        xml.declaration()?;
        xml.open_tag("table")?;

        info!(table = %table.id, "exporting table content");
        self.state = WriterState::TableOpen(Box::new(OpenTable {
            xml,
            table: table.clone(),
            schema_index,
            rows: 0,
            lobs: 0,
            deferred: Vec::new(),
        }));
        Ok(())
    }

    /// Encode one row. The cell count must match the table's columns;
    /// export-side shape mismatches are producer bugs and fatal.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        let Self {
            strategy,
            lob_container,
            tracker,
            index,
            blob_inline_threshold,
            clob_inline_threshold,
            defer_lobs,
            state,
            ..
        } = self;
        let open = match state {
            WriterState::TableOpen(open) => open,
            WriterState::Idle => {
                return Err(ArchiveError::Structure(
                    "write_row outside an open table".to_string(),
                ))
            }
        };
        if row.cells.len() != open.table.columns.len() {
            return Err(ArchiveError::Structure(format!(
                "row {} of table {} has {} cells for {} columns",
                row.index,
                open.table.id,
                row.cells.len(),
                open.table.columns.len()
            )));
        }

        let mut sink = CellSink {
            strategy: &mut **strategy,
            lob_container: *lob_container,
            tracker: &mut **tracker,
            index: &*index,
            deferred: &mut open.deferred,
            defer_lobs: *defer_lobs,
            blob_inline_threshold: *blob_inline_threshold,
            clob_inline_threshold: *clob_inline_threshold,
            lobs: &mut open.lobs,
            table_id: &open.table.id,
        };

        open.xml.open_tag("row")?;
        for (i, cell) in row.cells.iter().enumerate() {
            let column = &open.table.columns[i];
            let name = format!("c{}", i + 1);
            sink.encode(&mut open.xml, &name, cell, &column.type_descriptor)?;
        }
        open.xml.close_tag("row")?;
        open.rows += 1;
        Ok(())
    }

    /// Close the row document, flush deferred LOB payloads, and emit the
    /// table's generated schema document. Returns (rows, externalized
    /// LOBs) for the table.
    pub fn close_table(&mut self) -> Result<(u64, u64)> {
        let open = match std::mem::replace(&mut self.state, WriterState::Idle) {
            WriterState::TableOpen(open) => open,
            WriterState::Idle => {
                return Err(ArchiveError::Structure(
                    "close_table without an open table".to_string(),
                ))
            }
        };
        let OpenTable {
            mut xml,
            table,
            schema_index,
            rows,
            lobs,
            deferred,
        } = *open;

        xml.close_tag("table")?;
        xml.flush()?;
        // dropping the tracked writer closes the entry and records the digest
        drop(xml);

        for lob in deferred {
            let mut spill = lob.spill;
            spill.seek(SeekFrom::Start(0))?;
            let mut out = self
                .strategy
                .create_output(self.lob_container, &lob.logical_path)?;
            std::io::copy(&mut spill, &mut out)
                .map_err(|e| ArchiveError::file(lob.logical_path.clone(), e))?;
            out.flush()?;
            drop(out);
            self.index.record(lob.logical_path, lob.digest_hex);
        }

        let xsd_path = path::table_xsd(schema_index, table.index);
        let out = self.strategy.create_output(self.main, &xsd_path)?;
        let mut xml = XmlWriter::new(self.index.wrap(xsd_path, out), self.pretty);
        write_table_xsd(&mut xml, &table)?;
        xml.flush()?;

        debug!(table = %table.id, rows, lobs, "table content closed");
        Ok((rows, lobs))
    }
}

/// Per-row cell encoder; a plain bundle of the writer's mutable parts so
/// composed cells can recurse without fighting the borrow checker.
struct CellSink<'b> {
    strategy: &'b mut dyn WriteStrategy,
    lob_container: &'b ArchiveContainer,
    tracker: &'b mut LobTracker,
    index: &'b FileIndex,
    deferred: &'b mut Vec<DeferredLob>,
    defer_lobs: bool,
    blob_inline_threshold: u64,
    clob_inline_threshold: u64,
    lobs: &'b mut u64,
    table_id: &'b str,
}

impl CellSink<'_> {
    fn encode(
        &mut self,
        xml: &mut XmlWriter<TrackedWriter>,
        name: &str,
        cell: &Cell,
        descriptor: &TypeDescriptor,
    ) -> Result<()> {
        match cell {
            Cell::Simple(None) => xml.empty_element(name),
            Cell::Simple(Some(text)) => self.encode_text(xml, name, text, descriptor),
            Cell::Binary(provider) => self.encode_binary(xml, name, provider.as_ref()),
            Cell::Composed(children) => {
                self.encode_composed(xml, name, children, descriptor)
            }
        }
    }

    fn encode_text(
        &mut self,
        xml: &mut XmlWriter<TrackedWriter>,
        name: &str,
        text: &str,
        descriptor: &TypeDescriptor,
    ) -> Result<()> {
        let large = typemap::xsd_type(descriptor) == XsdType::Clob;
        if large && text.len() as u64 > self.clob_inline_threshold {
            let mut reader = std::io::Cursor::new(text.as_bytes());
            return self.externalize(xml, name, &mut reader, text.len() as u64, false);
        }
        xml.text_element(name, &escape(text))
    }

    fn encode_binary(
        &mut self,
        xml: &mut XmlWriter<TrackedWriter>,
        name: &str,
        provider: &dyn LobProvider,
    ) -> Result<()> {
        let size = provider.size();
        if size == 0 {
            // zero-length payloads travel as nulls
            return xml.empty_element(name);
        }
        if size <= self.blob_inline_threshold {
            let mut bytes = Vec::with_capacity(size as usize);
            provider.open()?.read_to_end(&mut bytes)?;
            return xml.text_element(name, &hex::encode(bytes));
        }
        let mut reader = provider.open()?;
        self.externalize(xml, name, reader.as_mut(), size, true)
    }

    fn encode_composed(
        &mut self,
        xml: &mut XmlWriter<TrackedWriter>,
        name: &str,
        children: &[Cell],
        descriptor: &TypeDescriptor,
    ) -> Result<()> {
        let composed = match &descriptor.kind {
            NormalizedType::Composed(c) => c,
            _ => {
                return Err(ArchiveError::Structure(format!(
                    "composed cell {} in table {} on a non-composed column",
                    name, self.table_id
                )))
            }
        };
        let leaves: Vec<LeafField> =
            composed.flatten(descriptor.original_type_name.as_deref())?;
        let mut flat = Vec::new();
        flatten_cells(children, &mut flat);
        if flat.len() != leaves.len() {
            return Err(ArchiveError::Structure(format!(
                "composed cell {} in table {} has {} leaves for {} declared fields",
                name,
                self.table_id,
                flat.len(),
                leaves.len()
            )));
        }

        xml.open_tag(name)?;
        for (k, (cell, leaf)) in flat.iter().zip(&leaves).enumerate() {
            let leaf_name = format!("u{}", k + 1);
            self.encode(xml, &leaf_name, cell, &leaf.descriptor)?;
        }
        xml.close_tag(name)
    }

    /// Stream one payload to a tracker-chosen location and emit the
    /// reference element.
    fn externalize(
        &mut self,
        xml: &mut XmlWriter<TrackedWriter>,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        binary: bool,
    ) -> Result<()> {
        let placement = self.tracker.allocate(size);
        let logical = path::lob_file(placement.folder_id, placement.file_id, binary);

        let digest_hex = if self.defer_lobs {
            let mut spill = tempfile::tempfile()?;
            let (_, digest) = copy_with_md5(reader, &mut spill)?;
            self.deferred.push(DeferredLob {
                logical_path: logical.clone(),
                spill,
                digest_hex: digest.clone(),
            });
            digest
        } else {
            let mut out = self.strategy.create_output(self.lob_container, &logical)?;
            let (_, digest) = copy_with_md5(reader, &mut out)?;
            drop(out);
            self.index.record(&logical, &digest);
            digest
        };

        *self.lobs += 1;
        xml.begin_open_tag(name)?;
        xml.attribute("file", &logical)?;
        xml.attribute("length", &size.to_string())?;
        xml.attribute("digest", &digest_hex)?;
        xml.attribute("digestType", "MD5")?;
        xml.end_empty_tag()
    }
}

/// Pre-order flattening of a composed cell tree to its leaf cells.
fn flatten_cells<'c>(cells: &'c [Cell], out: &mut Vec<&'c Cell>) {
    for cell in cells {
        match cell {
            Cell::Composed(inner) => flatten_cells(inner, out),
            other => out.push(other),
        }
    }
}

/// Emit the table's generated schema document from structure alone.
///
/// The document is reproducible without row data: it lists one element
/// per column (or per flattened leaf of a composed column), types large
/// columns as `clobType`/`blobType`, and always declares the shared
/// custom types so the output does not depend on which columns exist.
fn write_table_xsd<W: Write>(xml: &mut XmlWriter<W>, table: &TableStructure) -> Result<()> {
    xml.declaration()?;
    xml.begin_open_tag("xs:schema")?;
    xml.attribute("xmlns:xs", "http://www.w3.org/2001/XMLSchema")?;
    xml.attribute("elementFormDefault", "qualified")?;
    xml.end_open_tag()?;

    xml.begin_open_tag("xs:element")?;
    xml.attribute("name", "table")?;
    xml.end_open_tag()?;
    xml.open_tag("xs:complexType")?;
    xml.open_tag("xs:sequence")?;
    xml.begin_open_tag("xs:element")?;
    xml.attribute("name", "row")?;
    xml.attribute("type", "recordType")?;
    xml.attribute("minOccurs", "0")?;
    xml.attribute("maxOccurs", "unbounded")?;
    xml.end_empty_tag()?;
    xml.close_tag("xs:sequence")?;
    xml.close_tag("xs:complexType")?;
    xml.close_tag("xs:element")?;

    xml.begin_open_tag("xs:complexType")?;
    xml.attribute("name", "recordType")?;
    xml.end_open_tag()?;
    xml.open_tag("xs:sequence")?;
    for (i, column) in table.columns.iter().enumerate() {
        let name = format!("c{}", i + 1);
        match &column.type_descriptor.kind {
            NormalizedType::Composed(composed) => {
                let leaves = composed
                    .flatten(column.type_descriptor.original_type_name.as_deref())?;
                xml.begin_open_tag("xs:element")?;
                xml.attribute("name", &name)?;
                if column.nillable {
                    xml.attribute("minOccurs", "0")?;
                }
                xml.end_open_tag()?;
                xml.open_tag("xs:complexType")?;
                xml.open_tag("xs:sequence")?;
                for (k, leaf) in leaves.iter().enumerate() {
                    xml.begin_open_tag("xs:element")?;
                    xml.attribute("name", &format!("u{}", k + 1))?;
                    xml.attribute("type", typemap::xsd_type(&leaf.descriptor).wire_name())?;
                    xml.attribute("minOccurs", "0")?;
                    xml.end_empty_tag()?;
                }
                xml.close_tag("xs:sequence")?;
                xml.close_tag("xs:complexType")?;
                xml.close_tag("xs:element")?;
            }
            _ => {
                xml.begin_open_tag("xs:element")?;
                xml.attribute("name", &name)?;
                xml.attribute(
                    "type",
                    typemap::xsd_type(&column.type_descriptor).wire_name(),
                )?;
                if column.nillable {
                    xml.attribute("minOccurs", "0")?;
                }
                xml.end_empty_tag()?;
            }
        }
    }
    xml.close_tag("xs:sequence")?;
    xml.close_tag("xs:complexType")?;

    for large in ["clobType", "blobType"] {
        xml.begin_open_tag("xs:complexType")?;
        xml.attribute("name", large)?;
        xml.end_open_tag()?;
        xml.open_tag("xs:simpleContent")?;
        xml.begin_open_tag("xs:extension")?;
        xml.attribute("base", "xs:string")?;
        xml.end_open_tag()?;
        for (attr, ty) in [
            ("file", "xs:string"),
            ("length", "xs:integer"),
            ("digest", "xs:string"),
            ("digestType", "xs:string"),
        ] {
            xml.begin_open_tag("xs:attribute")?;
            xml.attribute("name", attr)?;
            xml.attribute("type", ty)?;
            xml.end_empty_tag()?;
        }
        xml.close_tag("xs:extension")?;
        xml.close_tag("xs:simpleContent")?;
        xml.close_tag("xs:complexType")?;
    }

    for simple in ["dateType", "timeType", "dateTimeType"] {
        xml.begin_open_tag("xs:simpleType")?;
        xml.attribute("name", simple)?;
        xml.end_open_tag()?;
        xml.begin_open_tag("xs:restriction")?;
        xml.attribute("base", "xs:string")?;
        xml.end_empty_tag()?;
        xml.close_tag("xs:simpleType")?;
    }

    xml.close_tag("xs:schema")
}
