//! Streaming table content codec.
//!
//! The writer turns rows into per-table row documents plus a generated
//! schema document; the reader parses them back one row at a time. Both
//! sides share the escape transform and the XML plumbing.

pub mod escape;
pub mod events;
pub mod reader;
pub mod writer;
pub mod xml;

pub use reader::ContentReader;
pub use writer::ContentWriter;
