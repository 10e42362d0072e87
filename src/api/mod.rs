//! Purpose: Define the public Rust API boundary for the reader.
//! Exports: File/group/table views, schema types, decoded values, and errors.
//! Role: Public, additive-only surface; hides the internal module layout.
//! Invariants: This module is the only public path to the decoding primitives.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::file::{Group, RealmFile};
pub use crate::core::header::{FILE_HEADER_LEN, FileHeader, MAGIC, TopRef};
pub use crate::core::spec::{ColumnAttr, ColumnSpec, ColumnType, TableSpec};
pub use crate::core::table::Table;
pub use crate::core::value::{Timestamp, Value};

/// Low-level node and leaf access for diagnostics tooling.
pub mod raw {
    pub use crate::core::bptree::{BpTree, ChildPos, MAX_TREE_DEPTH, find_child};
    pub use crate::core::leaf::{
        BasicLeaf, BigBlobLeaf, BinaryLeaf, DOUBLE_NULL_BITS, FLOAT_NULL_BITS, IntLeaf,
        IntNullLeaf, LongStringLeaf, NativeValue, ShortStringLeaf, SmallBlobLeaf, StringLeaf,
    };
    pub use crate::core::node::{NODE_HEADER_LEN, Node, NodeHeader, Ref, RefValue, WidthType};
}
