//! Export and import orchestration.
//!
//! Plumbing over the codec core: sequences structure validation, per-table
//! content, metadata and the file index against a producer
//! ([`DatabaseSource`]) or consumer ([`DatabaseSink`]) collaborator.
//! Engine adapters implement those traits; the orchestrators never talk
//! to a database themselves.

use tracing::{info, warn};

use crate::checksum::{copy_with_md5, FileIndex};
use crate::config::{validate_export, validate_import, Compression, ExportOptions, ImportOptions};
use crate::content::{ContentReader, ContentWriter};
use crate::error::{ArchiveError, Result};
use crate::lob::LobTracker;
use crate::metadata::{read_metadata, write_metadata};
use crate::model::cell::Row;
use crate::model::structure::DatabaseStructure;
use crate::path;
use crate::read::{self, FolderReadStrategy, ReadStrategy};
use crate::write::{
    ArchiveContainer, ContainerRole, ExternalLobWriteStrategy, FolderWriteStrategy,
    WriteStrategy, ZipWriteStrategy,
};

/// Producer-side collaborator: a database adapter feeding the export.
pub trait DatabaseSource {
    /// Supply the fully populated structure, once, before any rows.
    fn structure(&mut self) -> Result<DatabaseStructure>;

    /// Stream one table's rows through the callback. Cell count and types
    /// must match the table's columns.
    fn read_rows(
        &mut self,
        schema: &str,
        table: &str,
        on_row: &mut dyn FnMut(Row) -> Result<()>,
    ) -> Result<()>;
}

/// Consumer-side collaborator receiving an imported archive.
pub trait DatabaseSink {
    fn handle_structure(&mut self, db: &DatabaseStructure) -> Result<()>;
    fn open_table(&mut self, schema: &str, table: &str) -> Result<()>;
    fn handle_row(&mut self, row: Row) -> Result<()>;
    fn close_table(&mut self, schema: &str, table: &str) -> Result<()>;
}

/// Summary of one export run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub tables_exported: u64,
    pub rows_exported: u64,
    pub lobs_externalized: u64,
}

/// Summary of one import run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub tables_imported: u64,
    pub rows_imported: u64,
}

/// Sequences one full export: validate, per-table content in
/// schema-declared order, metadata, file index, finish.
pub struct ExportOrchestrator {
    options: ExportOptions,
}

impl ExportOrchestrator {
    pub fn new(options: ExportOptions) -> Result<Self> {
        validate_export(&options)?;
        Ok(Self { options })
    }

    pub fn run(&mut self, source: &mut dyn DatabaseSource) -> Result<ExportResult> {
        let db = source.structure()?;
        db.validate(self.options.require_primary_keys)?;
        info!(
            database = %db.name,
            tables = db.table_count(),
            output = %self.options.output.display(),
            "starting export"
        );

        let main = ArchiveContainer::new(&self.options.output, ContainerRole::Main);
        let (mut strategy, lob_container) = self.build_strategy(&main)?;
        strategy.setup(&main)?;
        if lob_container.role == ContainerRole::LobContainer {
            strategy.setup(&lob_container)?;
        }

        let index = FileIndex::new();
        let mut tracker =
            LobTracker::new(self.options.lobs_per_folder, self.options.lob_folder_size);
        let mut result = ExportResult::default();

        {
            let mut writer = ContentWriter::new(
                &mut *strategy,
                &main,
                &lob_container,
                &mut tracker,
                index.clone(),
                &self.options,
            );
            for schema in &db.schemas {
                for table in &schema.tables {
                    writer.open_table(schema.index, table)?;
                    source.read_rows(&schema.name, &table.name, &mut |row| {
                        writer.write_row(&row)
                    })?;
                    let (rows, lobs) = writer.close_table()?;
                    result.tables_exported += 1;
                    result.rows_exported += rows;
                    result.lobs_externalized += lobs;
                }
            }
        }

        write_metadata(&mut *strategy, &main, &index, &db, self.options.pretty_xml)?;

        // the index describes every other file, so it goes last and is
        // itself untracked
        let out = strategy.create_output(&main, path::FILE_INDEX_PATH)?;
        index.write_index(
            out,
            &self.options.archive_base_name(),
            self.options.pretty_xml,
        )?;

        strategy.finish(&main)?;
        if lob_container.role == ContainerRole::LobContainer {
            strategy.finish(&lob_container)?;
        }

        info!(
            tables = result.tables_exported,
            rows = result.rows_exported,
            lobs = result.lobs_externalized,
            "export finished"
        );
        Ok(result)
    }

    fn build_strategy(
        &self,
        main: &ArchiveContainer,
    ) -> Result<(Box<dyn WriteStrategy>, ArchiveContainer)> {
        let zip = || match self.options.compression {
            Compression::Store => ZipWriteStrategy::stored(),
            _ => ZipWriteStrategy::deflated(),
        };
        match (self.options.compression, &self.options.lob_root) {
            (Compression::None, _) => {
                Ok((Box::new(FolderWriteStrategy::new()), main.clone()))
            }
            (_, Some(root)) => Ok((
                Box::new(ExternalLobWriteStrategy::new(zip())),
                ArchiveContainer::new(root, ContainerRole::LobContainer),
            )),
            (_, None) => Ok((Box::new(zip()), main.clone())),
        }
    }
}

/// Sequences one full import: metadata, per-table rows in schema-declared
/// order, optional checksum verification.
pub struct ImportOrchestrator {
    options: ImportOptions,
}

impl ImportOrchestrator {
    pub fn new(options: ImportOptions) -> Result<Self> {
        validate_import(&options)?;
        Ok(Self { options })
    }

    pub fn run(&mut self, sink: &mut dyn DatabaseSink) -> Result<ImportResult> {
        let mut main = read::open_archive(&self.options.input)?;
        let mut lob_tree: Option<Box<dyn ReadStrategy>> = self
            .options
            .lob_root
            .as_ref()
            .map(|root| Box::new(FolderReadStrategy::new(root)) as Box<dyn ReadStrategy>);
        // one reborrow serves every table read and the final verification
        let mut lob = lob_tree.as_deref_mut();

        let db = read_metadata(main.create_input(path::METADATA_PATH)?)?;
        info!(database = %db.name, tables = db.table_count(), "starting import");
        sink.handle_structure(&db)?;

        let mut result = ImportResult::default();
        for schema in &db.schemas {
            for table in &schema.tables {
                sink.open_table(&schema.name, &table.name)?;
                let rows = ContentReader::read_table(
                    main.as_mut(),
                    &mut lob,
                    schema.index,
                    table,
                    &mut |row| sink.handle_row(row),
                )?;
                sink.close_table(&schema.name, &table.name)?;
                if rows != table.rows {
                    warn!(
                        table = %table.id,
                        declared = table.rows,
                        read = rows,
                        "row count differs from metadata"
                    );
                }
                result.tables_imported += 1;
                result.rows_imported += rows;
            }
        }

        if self.options.verify_checksums {
            verify_file_index(main.as_mut(), &mut lob, &self.options)?;
        }

        info!(
            tables = result.tables_imported,
            rows = result.rows_imported,
            "import finished"
        );
        Ok(result)
    }
}

/// Recompute every digest the file index records against the archive
/// bytes. Archives without a file index pass trivially.
fn verify_file_index(
    main: &mut dyn ReadStrategy,
    lob: &mut Option<&mut (dyn ReadStrategy + '_)>,
    options: &ImportOptions,
) -> Result<()> {
    if !main.exists(path::FILE_INDEX_PATH) {
        return Ok(());
    }
    let base = options
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entries = FileIndex::parse(main.create_input(path::FILE_INDEX_PATH)?, &base)?;

    for entry in entries {
        let source: &mut dyn ReadStrategy = match lob {
            Some(strategy) if entry.path.starts_with(path::LOB_ROOT) => &mut **strategy,
            _ => &mut *main,
        };
        let mut input = source.create_input(&entry.path)?;
        let (_, digest) = copy_with_md5(input.as_mut(), &mut std::io::sink())?;
        if digest != entry.digest_hex {
            return Err(ArchiveError::Checksum(format!(
                "digest mismatch for {}: index has {}, archive has {}",
                entry.path, entry.digest_hex, digest
            )));
        }
    }
    Ok(())
}
