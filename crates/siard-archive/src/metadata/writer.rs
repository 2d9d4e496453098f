//! Serializes a [`DatabaseStructure`] into the header metadata document.

use std::io::Write;

use tracing::info;

use crate::checksum::FileIndex;
use crate::content::escape::escape;
use crate::content::xml::XmlWriter;
use crate::error::Result;
use crate::model::structure::{
    DatabaseStructure, SchemaStructure, TableStructure,
};
use crate::model::types::NormalizedType;
use crate::path;
use crate::write::{ArchiveContainer, WriteStrategy};

/// Stream `header/metadata.xml` through the write strategy, digest
/// tracked like every other archive file.
pub fn write_metadata(
    strategy: &mut dyn WriteStrategy,
    container: &ArchiveContainer,
    index: &FileIndex,
    db: &DatabaseStructure,
    pretty: bool,
) -> Result<()> {
    info!(database = %db.name, schemas = db.schemas.len(), "writing metadata");
    let out = strategy.create_output(container, path::METADATA_PATH)?;
    let mut xml = XmlWriter::new(index.wrap(path::METADATA_PATH, out), pretty);

    xml.declaration()?;
    xml.begin_open_tag("siardArchive")?;
    xml.attribute("version", "2.1")?;
    xml.end_open_tag()?;

    xml.text_element("dbname", &escape(&db.name))?;
    optional(&mut xml, "description", &db.description)?;
    optional(&mut xml, "archiver", &db.archiver)?;
    optional(&mut xml, "archivalDate", &db.archival_date)?;
    optional(&mut xml, "producerApplication", &db.producer_application)?;

    xml.open_tag("schemas")?;
    for schema in &db.schemas {
        write_schema(&mut xml, schema)?;
    }
    xml.close_tag("schemas")?;

    xml.close_tag("siardArchive")?;
    xml.flush()?;
    Ok(())
}

fn write_schema<W: Write>(xml: &mut XmlWriter<W>, schema: &SchemaStructure) -> Result<()> {
    xml.open_tag("schema")?;
    xml.text_element("name", &escape(&schema.name))?;
    xml.text_element("folder", &schema.folder)?;
    optional(xml, "description", &schema.description)?;

    xml.open_tag("tables")?;
    for table in &schema.tables {
        write_table(xml, table)?;
    }
    xml.close_tag("tables")?;

    if !schema.views.is_empty() {
        xml.open_tag("views")?;
        for view in &schema.views {
            xml.open_tag("view")?;
            xml.text_element("name", &escape(&view.name))?;
            optional(xml, "query", &view.query)?;
            optional(xml, "description", &view.description)?;
            xml.close_tag("view")?;
        }
        xml.close_tag("views")?;
    }
    if !schema.routines.is_empty() {
        xml.open_tag("routines")?;
        for routine in &schema.routines {
            xml.open_tag("routine")?;
            xml.text_element("name", &escape(&routine.name))?;
            optional(xml, "body", &routine.body)?;
            optional(xml, "description", &routine.description)?;
            xml.close_tag("routine")?;
        }
        xml.close_tag("routines")?;
    }

    xml.close_tag("schema")
}

fn write_table<W: Write>(xml: &mut XmlWriter<W>, table: &TableStructure) -> Result<()> {
    xml.open_tag("table")?;
    xml.text_element("name", &escape(&table.name))?;
    xml.text_element("folder", &table.folder)?;
    optional(xml, "description", &table.description)?;

    xml.open_tag("columns")?;
    for column in &table.columns {
        xml.open_tag("column")?;
        xml.text_element("name", &escape(&column.name))?;
        xml.text_element("type", &escape(&column.type_descriptor.sql2008()))?;
        optional(xml, "typeOriginal", &column.type_descriptor.original_type_name)?;
        if let NormalizedType::Binary {
            format_registry: Some(registry),
            ..
        } = &column.type_descriptor.kind
        {
            xml.text_element("formatRegistry", &escape(registry))?;
        }
        xml.text_element("nullable", if column.nillable { "true" } else { "false" })?;
        optional(xml, "defaultValue", &column.default_value)?;
        optional(xml, "description", &column.description)?;
        xml.close_tag("column")?;
    }
    xml.close_tag("columns")?;

    if let Some(pk) = &table.primary_key {
        xml.open_tag("primaryKey")?;
        xml.text_element("name", &escape(&pk.name))?;
        for column in &pk.columns {
            xml.text_element("column", &escape(column))?;
        }
        xml.close_tag("primaryKey")?;
    }

    if !table.foreign_keys.is_empty() {
        xml.open_tag("foreignKeys")?;
        for fk in &table.foreign_keys {
            xml.open_tag("foreignKey")?;
            xml.text_element("name", &escape(&fk.name))?;
            xml.text_element("referencedSchema", &escape(&fk.referenced_schema))?;
            xml.text_element("referencedTable", &escape(&fk.referenced_table))?;
            for (local, referenced) in &fk.column_refs {
                xml.open_tag("reference")?;
                xml.text_element("column", &escape(local))?;
                xml.text_element("referenced", &escape(referenced))?;
                xml.close_tag("reference")?;
            }
            xml.close_tag("foreignKey")?;
        }
        xml.close_tag("foreignKeys")?;
    }

    if !table.candidate_keys.is_empty() {
        xml.open_tag("candidateKeys")?;
        for key in &table.candidate_keys {
            xml.open_tag("candidateKey")?;
            xml.text_element("name", &escape(&key.name))?;
            for column in &key.columns {
                xml.text_element("column", &escape(column))?;
            }
            xml.close_tag("candidateKey")?;
        }
        xml.close_tag("candidateKeys")?;
    }

    if !table.check_constraints.is_empty() {
        xml.open_tag("checkConstraints")?;
        for check in &table.check_constraints {
            xml.open_tag("checkConstraint")?;
            xml.text_element("name", &escape(&check.name))?;
            xml.text_element("condition", &escape(&check.condition))?;
            optional(xml, "description", &check.description)?;
            xml.close_tag("checkConstraint")?;
        }
        xml.close_tag("checkConstraints")?;
    }

    if !table.triggers.is_empty() {
        xml.open_tag("triggers")?;
        for trigger in &table.triggers {
            xml.open_tag("trigger")?;
            xml.text_element("name", &escape(&trigger.name))?;
            xml.text_element("actionTime", &escape(&trigger.action_time))?;
            xml.text_element("triggerEvent", &escape(&trigger.trigger_event))?;
            xml.text_element("triggeredAction", &escape(&trigger.triggered_action))?;
            optional(xml, "description", &trigger.description)?;
            xml.close_tag("trigger")?;
        }
        xml.close_tag("triggers")?;
    }

    xml.text_element("rows", &table.rows.to_string())?;
    xml.close_tag("table")
}

fn optional<W: Write>(
    xml: &mut XmlWriter<W>,
    name: &str,
    value: &Option<String>,
) -> Result<()> {
    if let Some(v) = value {
        xml.text_element(name, &escape(v))?;
    }
    Ok(())
}
