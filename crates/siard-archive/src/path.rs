//! Logical archive paths.
//!
//! Every component addresses the archive through these helpers so the
//! layout stays in one place. Paths use forward slashes regardless of
//! platform; the write strategies translate them to filesystem paths or
//! container entry names.

/// Path of the structural metadata document.
pub const METADATA_PATH: &str = "header/metadata.xml";

/// Path of the file index, written last.
pub const FILE_INDEX_PATH: &str = "Indices/fileIndex.xml";

/// Root of the externalized large-object tree.
pub const LOB_ROOT: &str = "Documents";

/// Folder of one schema, 1-based.
pub fn schema_folder(schema_index: usize) -> String {
    format!("content/schema{}", schema_index)
}

/// Folder of one table inside its schema, both 1-based.
pub fn table_folder(schema_index: usize, table_index: usize) -> String {
    format!(
        "{}/table{}",
        schema_folder(schema_index),
        table_index
    )
}

/// Path of a table's row document.
pub fn table_xml(schema_index: usize, table_index: usize) -> String {
    format!(
        "{}/table{}.xml",
        table_folder(schema_index, table_index),
        table_index
    )
}

/// Path of a table's generated schema document.
pub fn table_xsd(schema_index: usize, table_index: usize) -> String {
    format!(
        "{}/table{}.xsd",
        table_folder(schema_index, table_index),
        table_index
    )
}

/// Folder of one LOB collection.
pub fn lob_folder(folder_id: u32) -> String {
    format!("{}/docCollection{}", LOB_ROOT, folder_id)
}

/// Path of one externalized LOB payload. Binary payloads use `.bin`,
/// character payloads `.txt`.
pub fn lob_file(folder_id: u32, file_id: u32, binary: bool) -> String {
    let ext = if binary { "bin" } else { "txt" };
    format!("{}/{}/1.{}", lob_folder(folder_id), file_id, ext)
}
