//! Parses the header metadata document back into a [`DatabaseStructure`].
//!
//! Recursive descent over the pull tokenizer. Unknown elements are
//! skipped so newer archives with extra metadata sections still load.
//! Column spellings are restored verbatim and their normalized kinds
//! re-derived through the type map.

use std::io::Read;

use crate::content::escape::unescape;
use crate::content::events::{XmlEvent, XmlTokenizer};
use crate::error::{ArchiveError, Result};
use crate::model::structure::{
    CandidateKey, CheckConstraint, ColumnStructure, DatabaseStructure, ForeignKey,
    PrimaryKey, RoutineStructure, SchemaStructure, TableStructure, Trigger,
    ViewStructure,
};
use crate::model::types::{NormalizedType, TypeDescriptor};
use crate::typemap;

type Tokens = XmlTokenizer<Box<dyn Read>>;

/// Parse a metadata document.
pub fn read_metadata(input: Box<dyn Read>) -> Result<DatabaseStructure> {
    let mut tokens = XmlTokenizer::new(input);
    tokens.expect_start("siardArchive")?;

    let mut db = DatabaseStructure::default();
    until_end(&mut tokens, "siardArchive", |tokens, name| {
        match name {
            "dbname" => db.name = text_of(tokens, name)?,
            "description" => db.description = Some(text_of(tokens, name)?),
            "archiver" => db.archiver = Some(text_of(tokens, name)?),
            "archivalDate" => db.archival_date = Some(text_of(tokens, name)?),
            "producerApplication" => {
                db.producer_application = Some(text_of(tokens, name)?)
            }
            "schemas" => db.schemas = parse_schemas(tokens)?,
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;

    // restore positional indices and derived identifiers
    for (si, schema) in db.schemas.iter_mut().enumerate() {
        schema.index = si + 1;
        if schema.folder.is_empty() {
            schema.folder = format!("schema{}", schema.index);
        }
        for (ti, table) in schema.tables.iter_mut().enumerate() {
            table.index = ti + 1;
            if table.folder.is_empty() {
                table.folder = format!("table{}", table.index);
            }
            table.id = format!("{}.{}", schema.name, table.name);
            for column in &mut table.columns {
                column.id = format!("{}.{}", table.id, column.name);
            }
        }
    }
    Ok(db)
}

fn parse_schemas(tokens: &mut Tokens) -> Result<Vec<SchemaStructure>> {
    let mut schemas = Vec::new();
    until_end(tokens, "schemas", |tokens, name| {
        if name == "schema" {
            schemas.push(parse_schema(tokens)?);
        } else {
            skip_element(tokens, name)?;
        }
        Ok(())
    })?;
    Ok(schemas)
}

fn parse_schema(tokens: &mut Tokens) -> Result<SchemaStructure> {
    let mut schema = SchemaStructure::default();
    until_end(tokens, "schema", |tokens, name| {
        match name {
            "name" => schema.name = text_of(tokens, name)?,
            "folder" => schema.folder = text_of(tokens, name)?,
            "description" => schema.description = Some(text_of(tokens, name)?),
            "tables" => {
                until_end(tokens, "tables", |tokens, name| {
                    if name == "table" {
                        schema.tables.push(parse_table(tokens)?);
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            "views" => {
                until_end(tokens, "views", |tokens, name| {
                    if name == "view" {
                        schema.views.push(parse_view(tokens)?);
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            "routines" => {
                until_end(tokens, "routines", |tokens, name| {
                    if name == "routine" {
                        schema.routines.push(parse_routine(tokens)?);
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(schema)
}

fn parse_table(tokens: &mut Tokens) -> Result<TableStructure> {
    let mut table = TableStructure::default();
    until_end(tokens, "table", |tokens, name| {
        match name {
            "name" => table.name = text_of(tokens, name)?,
            "folder" => table.folder = text_of(tokens, name)?,
            "description" => table.description = Some(text_of(tokens, name)?),
            "columns" => {
                until_end(tokens, "columns", |tokens, name| {
                    if name == "column" {
                        table.columns.push(parse_column(tokens)?);
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            "primaryKey" => table.primary_key = Some(parse_key(tokens, "primaryKey")?),
            "foreignKeys" => {
                until_end(tokens, "foreignKeys", |tokens, name| {
                    if name == "foreignKey" {
                        table.foreign_keys.push(parse_foreign_key(tokens)?);
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            "candidateKeys" => {
                until_end(tokens, "candidateKeys", |tokens, name| {
                    if name == "candidateKey" {
                        let key = parse_key(tokens, "candidateKey")?;
                        table.candidate_keys.push(CandidateKey {
                            name: key.name,
                            columns: key.columns,
                            description: key.description,
                        });
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            "checkConstraints" => {
                until_end(tokens, "checkConstraints", |tokens, name| {
                    if name == "checkConstraint" {
                        table.check_constraints.push(parse_check(tokens)?);
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            "triggers" => {
                until_end(tokens, "triggers", |tokens, name| {
                    if name == "trigger" {
                        table.triggers.push(parse_trigger(tokens)?);
                    } else {
                        skip_element(tokens, name)?;
                    }
                    Ok(())
                })?;
            }
            "rows" => {
                let text = text_of(tokens, name)?;
                table.rows = text.trim().parse::<u64>().map_err(|_| {
                    ArchiveError::malformed(
                        &table.name,
                        format!("row count {:?} is not a number", text),
                    )
                })?;
            }
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(table)
}

fn parse_column(tokens: &mut Tokens) -> Result<ColumnStructure> {
    let mut name = String::new();
    let mut spelling = String::new();
    let mut original = None;
    let mut format_registry = None;
    let mut nillable = true;
    let mut default_value = None;
    let mut description = None;

    until_end(tokens, "column", |tokens, element| {
        match element {
            "name" => name = text_of(tokens, element)?,
            "type" => spelling = text_of(tokens, element)?,
            "typeOriginal" => original = Some(text_of(tokens, element)?),
            "formatRegistry" => format_registry = Some(text_of(tokens, element)?),
            "nullable" => nillable = text_of(tokens, element)?.trim() == "true",
            "defaultValue" => default_value = Some(text_of(tokens, element)?),
            "description" => description = Some(text_of(tokens, element)?),
            _ => skip_element(tokens, element)?,
        }
        Ok(())
    })?;

    let mut descriptor = TypeDescriptor::new(typemap::parse_sql2008(&spelling));
    descriptor.set_sql2008(spelling);
    descriptor.original_type_name = original;
    descriptor.description = None;
    // format registry only attaches to binary columns
    if let NormalizedType::Binary {
        format_registry: slot,
        ..
    } = &mut descriptor.kind
    {
        *slot = format_registry;
    }

    Ok(ColumnStructure {
        id: String::new(),
        name,
        type_descriptor: descriptor,
        nillable,
        default_value,
        description,
    })
}

fn parse_key(tokens: &mut Tokens, element: &str) -> Result<PrimaryKey> {
    let mut key = PrimaryKey::default();
    until_end(tokens, element, |tokens, name| {
        match name {
            "name" => key.name = text_of(tokens, name)?,
            "column" => key.columns.push(text_of(tokens, name)?),
            "description" => key.description = Some(text_of(tokens, name)?),
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(key)
}

fn parse_foreign_key(tokens: &mut Tokens) -> Result<ForeignKey> {
    let mut fk = ForeignKey::default();
    until_end(tokens, "foreignKey", |tokens, name| {
        match name {
            "name" => fk.name = text_of(tokens, name)?,
            "referencedSchema" => fk.referenced_schema = text_of(tokens, name)?,
            "referencedTable" => fk.referenced_table = text_of(tokens, name)?,
            "reference" => {
                let mut local = String::new();
                let mut referenced = String::new();
                until_end(tokens, "reference", |tokens, name| {
                    match name {
                        "column" => local = text_of(tokens, name)?,
                        "referenced" => referenced = text_of(tokens, name)?,
                        _ => skip_element(tokens, name)?,
                    }
                    Ok(())
                })?;
                fk.column_refs.push((local, referenced));
            }
            "description" => fk.description = Some(text_of(tokens, name)?),
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(fk)
}

fn parse_check(tokens: &mut Tokens) -> Result<CheckConstraint> {
    let mut check = CheckConstraint::default();
    until_end(tokens, "checkConstraint", |tokens, name| {
        match name {
            "name" => check.name = text_of(tokens, name)?,
            "condition" => check.condition = text_of(tokens, name)?,
            "description" => check.description = Some(text_of(tokens, name)?),
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(check)
}

fn parse_trigger(tokens: &mut Tokens) -> Result<Trigger> {
    let mut trigger = Trigger::default();
    until_end(tokens, "trigger", |tokens, name| {
        match name {
            "name" => trigger.name = text_of(tokens, name)?,
            "actionTime" => trigger.action_time = text_of(tokens, name)?,
            "triggerEvent" => trigger.trigger_event = text_of(tokens, name)?,
            "triggeredAction" => trigger.triggered_action = text_of(tokens, name)?,
            "description" => trigger.description = Some(text_of(tokens, name)?),
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(trigger)
}

fn parse_view(tokens: &mut Tokens) -> Result<ViewStructure> {
    let mut view = ViewStructure::default();
    until_end(tokens, "view", |tokens, name| {
        match name {
            "name" => view.name = text_of(tokens, name)?,
            "query" => view.query = Some(text_of(tokens, name)?),
            "description" => view.description = Some(text_of(tokens, name)?),
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(view)
}

fn parse_routine(tokens: &mut Tokens) -> Result<RoutineStructure> {
    let mut routine = RoutineStructure::default();
    until_end(tokens, "routine", |tokens, name| {
        match name {
            "name" => routine.name = text_of(tokens, name)?,
            "body" => routine.body = Some(text_of(tokens, name)?),
            "description" => routine.description = Some(text_of(tokens, name)?),
            _ => skip_element(tokens, name)?,
        }
        Ok(())
    })?;
    Ok(routine)
}

/// Drive child elements of `parent` through `on_child` until the parent's
/// end tag.
fn until_end(
    tokens: &mut Tokens,
    parent: &str,
    mut on_child: impl FnMut(&mut Tokens, &str) -> Result<()>,
) -> Result<()> {
    loop {
        match tokens.next_event()? {
            XmlEvent::StartElement { name, .. } => on_child(tokens, &name)?,
            XmlEvent::EndElement { name } if name == parent => return Ok(()),
            XmlEvent::EndElement { .. } => {}
            XmlEvent::Text(_) => {}
            XmlEvent::Eof => {
                return Err(ArchiveError::malformed(
                    "<metadata>",
                    format!("document ended inside <{}>", parent),
                ))
            }
        }
    }
}

/// Collect and unescape the text content of the current element.
fn text_of(tokens: &mut Tokens, name: &str) -> Result<String> {
    let mut text = String::new();
    loop {
        match tokens.next_event()? {
            XmlEvent::Text(t) => text.push_str(&t),
            XmlEvent::EndElement { name: n } if n == name => break,
            XmlEvent::EndElement { .. } => {}
            XmlEvent::StartElement { name: n, .. } => {
                return Err(ArchiveError::malformed(
                    "<metadata>",
                    format!("unexpected element <{}> inside <{}>", n, name),
                ))
            }
            XmlEvent::Eof => {
                return Err(ArchiveError::malformed(
                    "<metadata>",
                    format!("document ended inside <{}>", name),
                ))
            }
        }
    }
    Ok(unescape(&text))
}

/// Skip an element and everything inside it.
fn skip_element(tokens: &mut Tokens, name: &str) -> Result<()> {
    let mut depth = 1;
    loop {
        match tokens.next_event()? {
            XmlEvent::StartElement { name: n, .. } if n == name => depth += 1,
            XmlEvent::EndElement { name: n } if n == name => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            XmlEvent::Eof => {
                return Err(ArchiveError::malformed(
                    "<metadata>",
                    format!("document ended inside <{}>", name),
                ))
            }
            _ => {}
        }
    }
}
