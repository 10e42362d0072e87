//! Purpose: Typed, validated row access over one table's spec and columns array.
//! Exports: `Table`.
//! Role: Joins `TableSpec` column metadata with the per-column B+-trees and picks
//! the leaf decoder from each leaf's own header at read time.
//! Invariants: An accessor only runs when the stored column type (and, for
//! nullability-specific accessors, the stored nullability) matches exactly.
//! Invariants: An indexed column occupies two slots in the columns array; only the
//! first (the data tree) is read here.
use crate::core::bptree::BpTree;
use crate::core::error::{Error, ErrorKind};
use crate::core::leaf::{BasicLeaf, BinaryLeaf, IntLeaf, IntNullLeaf, NativeValue, StringLeaf};
use crate::core::node::{Node, Ref, RefValue};
use crate::core::spec::{ColumnType, TableSpec};
use crate::core::value::{Timestamp, Value};

#[derive(Clone, Copy, Debug)]
pub struct Table<'a> {
    spec: TableSpec<'a>,
    columns: Node<'a>,
}

impl<'a> Table<'a> {
    /// Opens a table root holding `[specRef, columnsRef]`.
    pub fn open(buf: &'a [u8], at: Ref) -> Result<Self, Error> {
        let root = Node::open(buf, at)?;
        let spec = TableSpec::from_node(root.child(0)?)?;
        Ok(Self::from_parts(spec, root.child(1)?))
    }

    pub fn from_parts(spec: TableSpec<'a>, columns: Node<'a>) -> Self {
        Self { spec, columns }
    }

    pub fn spec(&self) -> &TableSpec<'a> {
        &self.spec
    }

    pub fn column_count(&self) -> usize {
        self.spec.column_count()
    }

    pub fn column_bptree_index(&self, column: usize) -> Result<usize, Error> {
        self.spec.column_attr(column)?;
        let mut slot = column;
        for earlier in 0..column {
            if self.spec.column_attr(earlier)?.is_indexed() {
                slot += 1;
            }
        }
        Ok(slot)
    }

    fn column_root(&self, column: usize) -> Result<Node<'a>, Error> {
        let slot = self.column_bptree_index(column)?;
        self.columns.child(slot)
    }

    fn column_tree(&self, column: usize) -> Result<BpTree<'a>, Error> {
        self.column_root(column).map(BpTree::from_root)
    }

    /// Logical element count of one column. Leaf roots are measured with the
    /// decoder their encoding needs, so sentinel slots and blob children are
    /// never counted as rows.
    pub fn column_len(&self, column: usize) -> Result<usize, Error> {
        let column_type = self.spec.column_type(column)?;
        let nullable = self.spec.column_attr(column)?.is_nullable();
        if column_type == ColumnType::Timestamp {
            let top = self.column_root(column)?;
            return BpTree::from_root(top.child(1)?).len();
        }
        if matches!(column_type, ColumnType::Mixed | ColumnType::Decimal) {
            return Err(unsupported(column, column_type));
        }

        let tree = self.column_tree(column)?;
        if !tree.root_is_leaf() {
            return tree.len();
        }
        let root = tree.root();
        match column_type {
            ColumnType::Int | ColumnType::Bool | ColumnType::OldDateTime if nullable => {
                Ok(IntNullLeaf::new(root)?.len())
            }
            ColumnType::String => Ok(StringLeaf::from_node(root, nullable)?.len()),
            ColumnType::Binary => Ok(BinaryLeaf::from_node(root)?.len()),
            _ => Ok(root.len()),
        }
    }

    pub fn row_count(&self) -> Result<usize, Error> {
        if self.column_count() == 0 {
            return Ok(0);
        }
        self.column_len(0)
    }

    pub fn get_int(&self, column: usize, row: usize) -> Result<i64, Error> {
        self.expect_column(column, ColumnType::Int, Some(false))?;
        self.plain_int(column, row)
    }

    pub fn get_nullable_int(&self, column: usize, row: usize) -> Result<Option<i64>, Error> {
        self.expect_column(column, ColumnType::Int, Some(true))?;
        self.nullable_int(column, row)
    }

    pub fn get_bool(&self, column: usize, row: usize) -> Result<bool, Error> {
        self.expect_column(column, ColumnType::Bool, Some(false))?;
        self.plain_int(column, row).map(|value| value != 0)
    }

    pub fn get_nullable_bool(&self, column: usize, row: usize) -> Result<Option<bool>, Error> {
        self.expect_column(column, ColumnType::Bool, Some(true))?;
        Ok(self.nullable_int(column, row)?.map(|value| value != 0))
    }

    /// Seconds since the epoch.
    pub fn get_old_datetime(&self, column: usize, row: usize) -> Result<i64, Error> {
        self.expect_column(column, ColumnType::OldDateTime, Some(false))?;
        self.plain_int(column, row)
    }

    pub fn get_nullable_old_datetime(&self, column: usize, row: usize) -> Result<Option<i64>, Error> {
        self.expect_column(column, ColumnType::OldDateTime, Some(true))?;
        self.nullable_int(column, row)
    }

    pub fn get_float(&self, column: usize, row: usize) -> Result<f32, Error> {
        self.expect_column(column, ColumnType::Float, Some(false))?;
        Ok(self.native::<f32>(column, row)?.unwrap_or(f32::ZERO))
    }

    pub fn get_nullable_float(&self, column: usize, row: usize) -> Result<Option<f32>, Error> {
        self.expect_column(column, ColumnType::Float, Some(true))?;
        self.native(column, row)
    }

    pub fn get_double(&self, column: usize, row: usize) -> Result<f64, Error> {
        self.expect_column(column, ColumnType::Double, Some(false))?;
        Ok(self.native::<f64>(column, row)?.unwrap_or(f64::ZERO))
    }

    pub fn get_nullable_double(&self, column: usize, row: usize) -> Result<Option<f64>, Error> {
        self.expect_column(column, ColumnType::Double, Some(true))?;
        self.native(column, row)
    }

    /// `None` only for nullable columns; a non-nullable column reads null as `""`.
    pub fn get_string(&self, column: usize, row: usize) -> Result<Option<&'a str>, Error> {
        let nullable = self.expect_column(column, ColumnType::String, None)?;
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        let value = StringLeaf::from_node(leaf, nullable)?.get(index)?;
        Ok(if nullable { value } else { Some(value.unwrap_or("")) })
    }

    /// `None` only for nullable columns; a non-nullable column reads null as empty.
    pub fn get_binary(&self, column: usize, row: usize) -> Result<Option<&'a [u8]>, Error> {
        let nullable = self.expect_column(column, ColumnType::Binary, None)?;
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        let value = BinaryLeaf::from_node(leaf)?.get(index)?;
        Ok(if nullable { value } else { Some(value.unwrap_or(&[])) })
    }

    /// The column slot holds `[secondsRef, nanosecondsRef]`; null iff seconds is null.
    pub fn get_timestamp(&self, column: usize, row: usize) -> Result<Option<Timestamp>, Error> {
        let nullable = self.expect_column(column, ColumnType::Timestamp, None)?;
        let top = self.column_root(column)?;

        let (leaf, index) = BpTree::from_root(top.child(0)?).get(row)?;
        let Some(seconds) = IntNullLeaf::new(leaf)?.get(index)? else {
            return Ok((!nullable).then(|| Timestamp::new(0, 0)));
        };
        let (leaf, index) = BpTree::from_root(top.child(1)?).get(row)?;
        let nanos = IntLeaf::new(leaf).get(index)?;
        let nanoseconds = i32::try_from(nanos).map_err(|_| {
            Error::format(format!("nanosecond part {nanos} out of range")).with_offset(leaf.at())
        })?;
        Ok(Some(Timestamp::new(seconds, nanoseconds)))
    }

    /// Target row of a link; stored as `row + 1` with `0` meaning null.
    pub fn get_link(&self, column: usize, row: usize) -> Result<Option<usize>, Error> {
        self.expect_column(column, ColumnType::Link, None)?;
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        let raw = leaf.get(index)?;
        if raw == 0 {
            return Ok(None);
        }
        usize::try_from(raw - 1)
            .map(Some)
            .map_err(|_| Error::format(format!("negative link value {raw}")).with_offset(leaf.at()))
    }

    pub fn get_link_list(&self, column: usize, row: usize) -> Result<Vec<usize>, Error> {
        self.expect_column(column, ColumnType::LinkList, None)?;
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        match leaf.get_ref(index)? {
            RefValue::Null => Ok(Vec::new()),
            RefValue::Ref(at) => collect_rows(BpTree::from_root(leaf.open_ref(at)?)),
            RefValue::Tagged(_) => Err(Error::format("link list cell is a tagged integer")
                .with_offset(leaf.at())),
        }
    }

    /// Origin rows in the table named by `link_target_table_index`.
    pub fn get_backlinks(&self, column: usize, row: usize) -> Result<Vec<usize>, Error> {
        self.expect_column(column, ColumnType::BackLink, None)?;
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        match leaf.get_ref(index)? {
            RefValue::Null => Ok(Vec::new()),
            RefValue::Tagged(origin) => Ok(vec![to_row(origin as i64, leaf.at())?]),
            RefValue::Ref(at) => collect_rows(BpTree::from_root(leaf.open_ref(at)?)),
        }
    }

    /// Nested table stored in a Table-typed cell; `None` when the cell is empty.
    pub fn get_subtable(&self, column: usize, row: usize) -> Result<Option<Table<'a>>, Error> {
        self.expect_column(column, ColumnType::Table, None)?;
        let spec = self.spec.subspec(column)?;
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        match leaf.get_ref(index)? {
            RefValue::Null => Ok(None),
            RefValue::Ref(at) => Ok(Some(Table::from_parts(spec, leaf.open_ref(at)?))),
            RefValue::Tagged(_) => Err(Error::format("subtable cell is a tagged integer")
                .with_offset(leaf.at())),
        }
    }

    /// Reads a cell with the accessor its column spec calls for.
    pub fn get_value(&self, column: usize, row: usize) -> Result<Value<'a>, Error> {
        let column_type = self.spec.column_type(column)?;
        let nullable = self.spec.column_attr(column)?.is_nullable();
        let value = match column_type {
            ColumnType::Int if nullable => self.get_nullable_int(column, row)?.map(Value::Int),
            ColumnType::Int => Some(Value::Int(self.get_int(column, row)?)),
            ColumnType::Bool if nullable => self.get_nullable_bool(column, row)?.map(Value::Bool),
            ColumnType::Bool => Some(Value::Bool(self.get_bool(column, row)?)),
            ColumnType::OldDateTime if nullable => self
                .get_nullable_old_datetime(column, row)?
                .map(Value::OldDateTime),
            ColumnType::OldDateTime => Some(Value::OldDateTime(self.get_old_datetime(column, row)?)),
            ColumnType::Float if nullable => self.get_nullable_float(column, row)?.map(Value::Float),
            ColumnType::Float => Some(Value::Float(self.get_float(column, row)?)),
            ColumnType::Double if nullable => self.get_nullable_double(column, row)?.map(Value::Double),
            ColumnType::Double => Some(Value::Double(self.get_double(column, row)?)),
            ColumnType::String => self.get_string(column, row)?.map(Value::String),
            ColumnType::Binary => self.get_binary(column, row)?.map(Value::Binary),
            ColumnType::Timestamp => self.get_timestamp(column, row)?.map(Value::Timestamp),
            ColumnType::Link => self.get_link(column, row)?.map(Value::Link),
            ColumnType::LinkList => Some(Value::LinkList(self.get_link_list(column, row)?)),
            ColumnType::BackLink => Some(Value::BackLinks(self.get_backlinks(column, row)?)),
            ColumnType::Table => {
                let rows = match self.get_subtable(column, row)? {
                    Some(subtable) => subtable.row_count()?,
                    None => 0,
                };
                Some(Value::Subtable(rows))
            }
            ColumnType::StringEnum | ColumnType::Mixed | ColumnType::Decimal => {
                return Err(unsupported(column, column_type));
            }
        };
        Ok(value.unwrap_or(Value::Null))
    }

    /// Checks the stored type (and nullability, when given) and returns the
    /// stored nullability.
    fn expect_column(
        &self,
        column: usize,
        expected: ColumnType,
        nullable: Option<bool>,
    ) -> Result<bool, Error> {
        let column_type = self.spec.column_type(column)?;
        if !column_type.is_supported() {
            return Err(unsupported(column, column_type));
        }
        if column_type != expected {
            return Err(Error::new(ErrorKind::TypeMismatch).with_message(format!(
                "column {column} has type {column_type}, not {expected}"
            )));
        }
        let stored = self.spec.column_attr(column)?.is_nullable();
        if let Some(requested) = nullable {
            if requested != stored {
                let describe = |nullable: bool| if nullable { "nullable" } else { "non-nullable" };
                return Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message(format!(
                        "column {column} is {}, accessor expects {}",
                        describe(stored),
                        describe(requested)
                    ))
                    .with_hint("use the accessor matching the column's nullability"));
            }
        }
        Ok(stored)
    }

    fn plain_int(&self, column: usize, row: usize) -> Result<i64, Error> {
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        IntLeaf::new(leaf).get(index)
    }

    fn nullable_int(&self, column: usize, row: usize) -> Result<Option<i64>, Error> {
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        IntNullLeaf::new(leaf)?.get(index)
    }

    fn native<T: NativeValue>(&self, column: usize, row: usize) -> Result<Option<T>, Error> {
        let (leaf, index) = self.column_tree(column)?.get(row)?;
        BasicLeaf::<T>::new(leaf).get(index)
    }
}

fn unsupported(column: usize, column_type: ColumnType) -> Error {
    Error::new(ErrorKind::Unsupported).with_message(format!(
        "column {column} uses the {column_type} encoding, which is not decoded"
    ))
}

fn to_row(raw: i64, at: Ref) -> Result<usize, Error> {
    usize::try_from(raw).map_err(|_| Error::format(format!("negative row index {raw}")).with_offset(at))
}

fn collect_rows(tree: BpTree<'_>) -> Result<Vec<usize>, Error> {
    let declared = tree.len()?;
    let mut rows = Vec::new();
    for leaf in tree.leaves()? {
        if rows.len() + leaf.len() > declared {
            let message = format!("row list holds more than its {declared} declared rows");
            return Err(Error::format(message).with_offset(tree.root().at()));
        }
        for raw in leaf.values() {
            rows.push(to_row(raw?, leaf.at())?);
        }
    }
    Ok(rows)
}
