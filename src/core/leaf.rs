//! Purpose: Decode column values out of B+-tree leaf nodes.
//! Exports: one reader per on-disk leaf encoding plus `StringLeaf`/`BinaryLeaf` dispatch.
//! Role: Pure functions of (node, index); callers pick the reader from the leaf's own header.
//! Invariants: Null markers are reproduced exactly as stored, including the opposite
//! polarity of long-string (`0` = null) and small-blob (nonzero = null) null arrays.
//! Invariants: Strings borrow from the file bytes; invalid UTF-8 is a format error.
use std::marker::PhantomData;

use crate::core::error::Error;
use crate::core::node::{Node, Ref, RefValue};

pub const FLOAT_NULL_BITS: u32 = 0x7fc0_00aa;
pub const DOUBLE_NULL_BITS: u64 = 0x7ff8_0000_0000_00aa;

fn decode_utf8(bytes: &[u8], at: Ref) -> Result<&str, Error> {
    std::str::from_utf8(bytes)
        .map_err(|err| Error::format("invalid utf-8 in string data").with_offset(at).with_source(err))
}

fn offset_at(offsets: &Node<'_>, index: usize) -> Result<usize, Error> {
    let value = offsets.get(index)?;
    usize::try_from(value)
        .map_err(|_| Error::format(format!("negative blob offset {value}")).with_offset(offsets.at()))
}

/// `[begin, end)` of entry `index` from an array of exclusive end offsets.
fn blob_bounds(offsets: &Node<'_>, index: usize) -> Result<(usize, usize), Error> {
    let begin = if index > 0 { offset_at(offsets, index - 1)? } else { 0 };
    let end = offset_at(offsets, index)?;
    if end < begin {
        return Err(Error::format("blob offsets decrease").with_offset(offsets.at()));
    }
    Ok((begin, end))
}

#[derive(Clone, Copy, Debug)]
pub struct IntLeaf<'a> {
    node: Node<'a>,
}

impl<'a> IntLeaf<'a> {
    pub fn new(node: Node<'a>) -> Self {
        Self { node }
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<i64, Error> {
        self.node.get(index)
    }
}

/// Element 0 holds the value that stands for null; data starts at element 1.
#[derive(Clone, Copy, Debug)]
pub struct IntNullLeaf<'a> {
    node: Node<'a>,
}

impl<'a> IntNullLeaf<'a> {
    pub fn new(node: Node<'a>) -> Result<Self, Error> {
        if node.is_empty() {
            return Err(Error::format("nullable integer leaf without null sentinel")
                .with_offset(node.at()));
        }
        Ok(Self { node })
    }

    pub fn len(&self) -> usize {
        self.node.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_value(&self) -> Result<i64, Error> {
        self.node.get(0)
    }

    pub fn get(&self, index: usize) -> Result<Option<i64>, Error> {
        if index >= self.len() {
            return Err(Error::range(format!(
                "index {index} out of range for nullable leaf of {}",
                self.len()
            ))
            .with_offset(self.node.at()));
        }
        let value = self.node.get(index + 1)?;
        Ok((value != self.null_value()?).then_some(value))
    }
}

/// Fixed-width slots; `width` is bytes per slot and the last byte counts padding.
#[derive(Clone, Copy, Debug)]
pub struct ShortStringLeaf<'a> {
    node: Node<'a>,
    nullable: bool,
}

impl<'a> ShortStringLeaf<'a> {
    pub fn new(node: Node<'a>, nullable: bool) -> Self {
        Self { node, nullable }
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<&'a str>, Error> {
        self.node.check_index(index)?;
        let width = self.node.width() as usize;
        if width == 0 {
            return Ok(self.absent());
        }

        let slot = self.node.bytes(index * width, width)?;
        let zero_count = slot[width - 1] as usize;
        if zero_count == width {
            return Ok(self.absent());
        }
        if zero_count > width {
            return Err(Error::format(format!(
                "string padding {zero_count} exceeds slot width {width}"
            ))
            .with_offset(self.node.at()));
        }
        let len = width - 1 - zero_count;
        decode_utf8(&slot[..len], self.node.at()).map(Some)
    }

    fn absent(&self) -> Option<&'a str> {
        if self.nullable { None } else { Some("") }
    }
}

/// `[offsets, blob, nulls?]`; each string is stored with a trailing terminator.
#[derive(Clone, Copy, Debug)]
pub struct LongStringLeaf<'a> {
    offsets: Node<'a>,
    blob: Node<'a>,
    nulls: Option<Node<'a>>,
}

impl<'a> LongStringLeaf<'a> {
    pub fn new(node: Node<'a>, nullable: bool) -> Result<Self, Error> {
        let nulls = if nullable { Some(node.child(2)?) } else { None };
        Ok(Self {
            offsets: node.child(0)?,
            blob: node.child(1)?,
            nulls,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<&'a str>, Error> {
        self.offsets.check_index(index)?;
        if let Some(nulls) = &self.nulls {
            if nulls.get(index)? == 0 {
                return Ok(None);
            }
        }
        let (begin, end) = blob_bounds(&self.offsets, index)?;
        if end == begin {
            return Err(Error::format("long string entry without terminator")
                .with_offset(self.offsets.at()));
        }
        let bytes = self.blob.bytes(begin, end - 1 - begin)?;
        decode_utf8(bytes, self.blob.at()).map(Some)
    }
}

/// `[offsets, blob, nulls?]` without terminators; files written before null
/// support have no third child.
#[derive(Clone, Copy, Debug)]
pub struct SmallBlobLeaf<'a> {
    offsets: Node<'a>,
    blob: Node<'a>,
    nulls: Option<Node<'a>>,
}

impl<'a> SmallBlobLeaf<'a> {
    pub fn new(node: Node<'a>) -> Result<Self, Error> {
        let nulls = if node.len() >= 3 { Some(node.child(2)?) } else { None };
        Ok(Self {
            offsets: node.child(0)?,
            blob: node.child(1)?,
            nulls,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<&'a [u8]>, Error> {
        self.offsets.check_index(index)?;
        if let Some(nulls) = &self.nulls {
            if nulls.get(index)? != 0 {
                return Ok(None);
            }
        }
        let (begin, end) = blob_bounds(&self.offsets, index)?;
        self.blob.bytes(begin, end - begin).map(Some)
    }
}

/// Each element refs its own blob node; the payload is `size` raw bytes.
#[derive(Clone, Copy, Debug)]
pub struct BigBlobLeaf<'a> {
    node: Node<'a>,
}

impl<'a> BigBlobLeaf<'a> {
    pub fn new(node: Node<'a>) -> Self {
        Self { node }
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<&'a [u8]>, Error> {
        let at = match self.node.get_ref(index)? {
            RefValue::Null => return Ok(None),
            RefValue::Ref(at) => at,
            RefValue::Tagged(_) => {
                return Err(Error::format("big blob element is a tagged integer")
                    .with_offset(self.node.at()));
            }
        };
        let blob = self.node.open_ref(at)?;
        // Blob nodes carrying the context flag read as null.
        if blob.header().context_flag {
            return Ok(None);
        }
        blob.bytes(0, blob.len()).map(Some)
    }

    /// Blob holding a null-terminated string.
    pub fn get_str(&self, index: usize) -> Result<Option<&'a str>, Error> {
        let Some(bytes) = self.get(index)? else {
            return Ok(None);
        };
        let Some((_, text)) = bytes.split_last() else {
            return Err(Error::format("big string blob without terminator")
                .with_offset(self.node.at()));
        };
        decode_utf8(text, self.node.at()).map(Some)
    }
}

/// Fixed-size native values whose null is one specific bit pattern.
pub trait NativeValue: Copy {
    const SIZE: usize;
    const ZERO: Self;

    fn from_le_slice(bytes: &[u8]) -> Self;
    fn is_null_pattern(self) -> bool;
}

impl NativeValue for f32 {
    const SIZE: usize = 4;
    const ZERO: Self = 0.0;

    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        f32::from_le_bytes(raw)
    }

    fn is_null_pattern(self) -> bool {
        self.to_bits() == FLOAT_NULL_BITS
    }
}

impl NativeValue for f64 {
    const SIZE: usize = 8;
    const ZERO: Self = 0.0;

    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        f64::from_le_bytes(raw)
    }

    fn is_null_pattern(self) -> bool {
        self.to_bits() == DOUBLE_NULL_BITS
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BasicLeaf<'a, T> {
    node: Node<'a>,
    _value: PhantomData<T>,
}

impl<'a, T: NativeValue> BasicLeaf<'a, T> {
    pub fn new(node: Node<'a>) -> Self {
        Self {
            node,
            _value: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<T>, Error> {
        self.node.check_index(index)?;
        let value = T::from_le_slice(self.node.bytes(index * T::SIZE, T::SIZE)?);
        Ok((!value.is_null_pattern()).then_some(value))
    }
}

/// String column leaf, chosen per leaf from `has_refs` and `context_flag`.
#[derive(Clone, Copy, Debug)]
pub enum StringLeaf<'a> {
    Short(ShortStringLeaf<'a>),
    Long(LongStringLeaf<'a>),
    Big(BigBlobLeaf<'a>),
}

impl<'a> StringLeaf<'a> {
    pub fn from_node(node: Node<'a>, nullable: bool) -> Result<Self, Error> {
        let header = node.header();
        if !header.has_refs {
            Ok(StringLeaf::Short(ShortStringLeaf::new(node, nullable)))
        } else if !header.context_flag {
            LongStringLeaf::new(node, nullable).map(StringLeaf::Long)
        } else {
            Ok(StringLeaf::Big(BigBlobLeaf::new(node)))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StringLeaf::Short(leaf) => leaf.len(),
            StringLeaf::Long(leaf) => leaf.len(),
            StringLeaf::Big(leaf) => leaf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Option<&'a str>, Error> {
        match self {
            StringLeaf::Short(leaf) => leaf.get(index),
            StringLeaf::Long(leaf) => leaf.get(index),
            StringLeaf::Big(leaf) => leaf.get_str(index),
        }
    }
}

/// Binary column leaf, chosen per leaf from `context_flag`.
#[derive(Clone, Copy, Debug)]
pub enum BinaryLeaf<'a> {
    Small(SmallBlobLeaf<'a>),
    Big(BigBlobLeaf<'a>),
}

impl<'a> BinaryLeaf<'a> {
    pub fn from_node(node: Node<'a>) -> Result<Self, Error> {
        if node.header().context_flag {
            Ok(BinaryLeaf::Big(BigBlobLeaf::new(node)))
        } else {
            SmallBlobLeaf::new(node).map(BinaryLeaf::Small)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BinaryLeaf::Small(leaf) => leaf.len(),
            BinaryLeaf::Big(leaf) => leaf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Option<&'a [u8]>, Error> {
        match self {
            BinaryLeaf::Small(leaf) => leaf.get(index),
            BinaryLeaf::Big(leaf) => leaf.get(index),
        }
    }
}
