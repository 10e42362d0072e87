// Table schema: column types, names, attribute flags, and the subspecs that
// resolve link targets, backlink origins, and nested table specs.
use std::fmt;

use serde::{Serialize, Serializer};

use crate::core::error::{Error, ErrorKind};
use crate::core::leaf::ShortStringLeaf;
use crate::core::node::{Node, Ref, RefValue};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum ColumnType {
    Int,
    Bool,
    String,
    StringEnum,
    Binary,
    Table,
    Mixed,
    OldDateTime,
    Timestamp,
    Float,
    Double,
    Decimal,
    Link,
    LinkList,
    BackLink,
}

impl ColumnType {
    pub fn from_code(code: i64) -> Result<Self, Error> {
        let column_type = match code {
            0 => ColumnType::Int,
            1 => ColumnType::Bool,
            2 => ColumnType::String,
            3 => ColumnType::StringEnum,
            4 => ColumnType::Binary,
            5 => ColumnType::Table,
            6 => ColumnType::Mixed,
            7 => ColumnType::OldDateTime,
            8 => ColumnType::Timestamp,
            9 => ColumnType::Float,
            10 => ColumnType::Double,
            11 => ColumnType::Decimal,
            12 => ColumnType::Link,
            13 => ColumnType::LinkList,
            14 => ColumnType::BackLink,
            _ => return Err(Error::format(format!("unknown column type code {code}"))),
        };
        Ok(column_type)
    }

    pub fn code(self) -> i64 {
        match self {
            ColumnType::Int => 0,
            ColumnType::Bool => 1,
            ColumnType::String => 2,
            ColumnType::StringEnum => 3,
            ColumnType::Binary => 4,
            ColumnType::Table => 5,
            ColumnType::Mixed => 6,
            ColumnType::OldDateTime => 7,
            ColumnType::Timestamp => 8,
            ColumnType::Float => 9,
            ColumnType::Double => 10,
            ColumnType::Decimal => 11,
            ColumnType::Link => 12,
            ColumnType::LinkList => 13,
            ColumnType::BackLink => 14,
        }
    }

    /// Whether this reader decodes values of the type.
    pub fn is_supported(self) -> bool {
        !matches!(self, ColumnType::StringEnum | ColumnType::Mixed | ColumnType::Decimal)
    }

    fn subspec_slots(self) -> usize {
        match self {
            ColumnType::Table | ColumnType::Link | ColumnType::LinkList => 1,
            ColumnType::BackLink => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags::bitflags! {
    /// Column attribute bits as stored. Bits without a name are kept as read.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ColumnAttr: u32 {
        const INDEXED = 1;
        /// Always set together with `INDEXED`.
        const UNIQUE = 2;
        const RESERVED = 4;
        const STRONG_LINKS = 8;
        const NULLABLE = 16;
    }
}

impl ColumnAttr {
    pub const NONE: ColumnAttr = ColumnAttr::empty();

    pub fn is_indexed(self) -> bool {
        self.contains(ColumnAttr::INDEXED)
    }

    pub fn is_nullable(self) -> bool {
        self.contains(ColumnAttr::NULLABLE)
    }

    /// Set flags by display name, then any unnamed bits in hex.
    pub fn labels(self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .iter_names()
            .map(|(name, _)| display_name(name).to_string())
            .collect();
        let unnamed = self.bits() & !ColumnAttr::all().bits();
        if unnamed != 0 {
            labels.push(format!("{unnamed:#x}"));
        }
        labels
    }
}

fn display_name(flag: &'static str) -> &'static str {
    match flag {
        "INDEXED" => "Indexed",
        "UNIQUE" => "Unique",
        "RESERVED" => "Reserved",
        "STRONG_LINKS" => "StrongLinks",
        "NULLABLE" => "Nullable",
        other => other,
    }
}

impl fmt::Display for ColumnAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self.labels();
        if labels.is_empty() {
            return f.write_str("None");
        }
        f.write_str(&labels.join(" | "))
    }
}

impl Serialize for ColumnAttr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.labels())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// `None` only for backlink columns.
    pub name: Option<String>,
    pub attr: ColumnAttr,
}

impl ColumnSpec {
    pub fn is_nullable(&self) -> bool {
        self.attr.is_nullable()
    }

    pub fn is_indexed(&self) -> bool {
        self.attr.is_indexed()
    }
}

/// Spec root children: `[types, names, attrs, subspecs?]`. The types array is
/// authoritative for the column count; names omits trailing backlink columns.
#[derive(Clone, Copy, Debug)]
pub struct TableSpec<'a> {
    node: Node<'a>,
    types: Node<'a>,
    names: ShortStringLeaf<'a>,
    attrs: Node<'a>,
    subspecs: Option<Node<'a>>,
}

impl<'a> TableSpec<'a> {
    pub fn open(buf: &'a [u8], at: Ref) -> Result<Self, Error> {
        Self::from_node(Node::open(buf, at)?)
    }

    pub fn from_node(node: Node<'a>) -> Result<Self, Error> {
        let subspecs = if node.len() >= 4 {
            match node.get_ref(3)? {
                RefValue::Ref(at) => Some(node.open_ref(at)?),
                RefValue::Null => None,
                RefValue::Tagged(_) => {
                    return Err(Error::format("spec subspecs slot is not a ref").with_offset(node.at()));
                }
            }
        } else {
            None
        };
        Ok(Self {
            node,
            types: node.child(0)?,
            names: ShortStringLeaf::new(node.child(1)?, false),
            attrs: node.child(2)?,
            subspecs,
        })
    }

    pub fn at(&self) -> Ref {
        self.node.at()
    }

    pub fn column_count(&self) -> usize {
        self.types.len()
    }

    pub fn column_type(&self, column: usize) -> Result<ColumnType, Error> {
        let code = self.types.get(column)?;
        ColumnType::from_code(code).map_err(|err| err.with_offset(self.types.at()))
    }

    pub fn column_attr(&self, column: usize) -> Result<ColumnAttr, Error> {
        let bits = self.attrs.get(column)?;
        u32::try_from(bits).map(ColumnAttr::from_bits_retain).map_err(|_| {
            Error::format(format!("invalid column attribute bits {bits}")).with_offset(self.attrs.at())
        })
    }

    pub fn column_name(&self, column: usize) -> Result<Option<&'a str>, Error> {
        self.types.check_index(column)?;
        if column >= self.names.len() {
            return Ok(None);
        }
        self.names.get(column)
    }

    pub fn column(&self, column: usize) -> Result<ColumnSpec, Error> {
        Ok(ColumnSpec {
            column_type: self.column_type(column)?,
            name: self.column_name(column)?.map(str::to_owned),
            attr: self.column_attr(column)?,
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = Result<ColumnSpec, Error>> + '_ {
        (0..self.column_count()).map(|column| self.column(column))
    }

    /// First subspec slot belonging to `column`.
    pub fn subspec_index(&self, column: usize) -> Result<usize, Error> {
        self.types.check_index(column)?;
        let mut slot = 0;
        for earlier in 0..column {
            slot += self.column_type(earlier)?.subspec_slots();
        }
        Ok(slot)
    }

    pub fn link_target_table_index(&self, column: usize) -> Result<usize, Error> {
        self.expect_type(
            column,
            &[ColumnType::Link, ColumnType::LinkList, ColumnType::BackLink],
            "link target",
        )?;
        let slot = self.subspec_index(column)?;
        self.tagged_subspec(slot)
    }

    pub fn backlink_origin_column_index(&self, column: usize) -> Result<usize, Error> {
        self.expect_type(column, &[ColumnType::BackLink], "backlink origin")?;
        let slot = self.subspec_index(column)?;
        self.tagged_subspec(slot + 1)
    }

    /// Spec of the nested table stored in a Table-typed column.
    pub fn subspec(&self, column: usize) -> Result<TableSpec<'a>, Error> {
        self.expect_type(column, &[ColumnType::Table], "subtable spec")?;
        let slot = self.subspec_index(column)?;
        let subspecs = self.subspecs()?;
        match subspecs.get_ref(slot)? {
            RefValue::Ref(at) => TableSpec::open(subspecs.buffer(), at),
            _ => Err(Error::format(format!("subspec slot {slot} is not a ref"))
                .with_offset(subspecs.at())),
        }
    }

    fn subspecs(&self) -> Result<Node<'a>, Error> {
        self.subspecs
            .ok_or_else(|| Error::format("spec has no subspecs array").with_offset(self.node.at()))
    }

    fn tagged_subspec(&self, slot: usize) -> Result<usize, Error> {
        let subspecs = self.subspecs()?;
        match subspecs.get_ref(slot)? {
            RefValue::Tagged(value) => usize::try_from(value).map_err(|_| {
                Error::format(format!("subspec value {value} too large")).with_offset(subspecs.at())
            }),
            _ => Err(Error::format(format!("subspec slot {slot} is not a tagged integer"))
                .with_offset(subspecs.at())),
        }
    }

    fn expect_type(
        &self,
        column: usize,
        allowed: &[ColumnType],
        operation: &str,
    ) -> Result<ColumnType, Error> {
        let column_type = self.column_type(column)?;
        if !allowed.contains(&column_type) {
            return Err(Error::new(ErrorKind::TypeMismatch).with_message(format!(
                "{operation} is not available on column {column} of type {column_type}"
            )));
        }
        Ok(column_type)
    }
}
