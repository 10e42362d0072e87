// Decoding engine: node access, B+-tree navigation, leaf encodings, table schema, and file access.
pub mod bptree;
pub mod error;
pub mod file;
pub mod header;
pub mod leaf;
pub mod node;
pub mod spec;
pub mod table;
#[cfg(test)]
pub(crate) mod test_support;
pub mod value;
