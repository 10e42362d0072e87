//! Purpose: Read-only decoder for Realm (T-DB) database files.
//! Exports: `api` (file, group, table, spec, and value types plus errors).
//! Role: Library backing the `realm-reader` CLI and any other presentation layer.
//! Invariants: Decoding never mutates the file buffer and never panics on malformed input.
//! Invariants: Every read is bounds-checked against the buffer it borrows from.
pub mod api;
mod core;
