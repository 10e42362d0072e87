// Node header decoding and packed element access over the file bytes.
// A node is a (buffer, ref) pair; every read is bounds-checked against the buffer.
use crate::core::error::Error;

pub const NODE_HEADER_LEN: usize = 8;

/// Byte offset of a node inside the file.
pub type Ref = u64;

/// Classification of a raw element stored in a ref-carrying array.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefValue {
    Null,
    /// Low bit set: an inline integer, already shifted down.
    Tagged(u64),
    Ref(Ref),
}

impl RefValue {
    pub fn from_raw(raw: i64) -> Self {
        if raw == 0 {
            RefValue::Null
        } else if raw & 1 != 0 {
            RefValue::Tagged((raw as u64) >> 1)
        } else {
            RefValue::Ref(raw as u64)
        }
    }
}

/// How the payload byte length is derived from width and size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WidthType {
    /// `ceil(width * size / 8)` bytes; width is in bits.
    Bits,
    /// `width * size` bytes; width is in bytes.
    Multiply,
    /// `size` bytes; width is unused.
    Ignore,
}

impl WidthType {
    fn from_bits(bits: u8) -> Result<Self, Error> {
        match bits {
            0 => Ok(WidthType::Bits),
            1 => Ok(WidthType::Multiply),
            2 => Ok(WidthType::Ignore),
            _ => Err(Error::format("invalid width type in node header")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NodeHeader {
    pub is_inner_bptree_node: bool,
    pub has_refs: bool,
    pub context_flag: bool,
    pub width_type: WidthType,
    /// One of 0, 1, 2, 4, 8, 16, 32, 64.
    pub width: u8,
    pub size: usize,
    /// Allocated bytes; meaningless for data read from a file.
    pub capacity: usize,
}

impl NodeHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < NODE_HEADER_LEN {
            return Err(Error::range("node header truncated"));
        }
        let flags = buf[4];
        let width_type = WidthType::from_bits((flags & 0x18) >> 3)?;
        Ok(Self {
            is_inner_bptree_node: flags & 0x80 != 0,
            has_refs: flags & 0x40 != 0,
            context_flag: flags & 0x20 != 0,
            width_type,
            width: (1u8 << (flags & 0x07)) >> 1,
            size: ((buf[5] as usize) << 16) | ((buf[6] as usize) << 8) | buf[7] as usize,
            capacity: ((buf[0] as usize) << 19) | ((buf[1] as usize) << 11) | ((buf[2] as usize) << 3),
        })
    }

    pub fn payload_len(&self) -> usize {
        let width = self.width as usize;
        match self.width_type {
            WidthType::Bits => (self.size * width).div_ceil(8),
            WidthType::Multiply => self.size * width,
            WidthType::Ignore => self.size,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Node<'a> {
    buf: &'a [u8],
    at: Ref,
    header: NodeHeader,
}

impl<'a> Node<'a> {
    pub fn open(buf: &'a [u8], at: Ref) -> Result<Self, Error> {
        if at == 0 {
            return Err(Error::format("null ref where a node was expected"));
        }
        if at & 1 != 0 {
            return Err(Error::format("tagged integer used as a ref").with_offset(at));
        }
        let bytes = slice(buf, at, 0, NODE_HEADER_LEN).map_err(|err| err.with_offset(at))?;
        let header = NodeHeader::decode(bytes).map_err(|err| err.with_offset(at))?;
        Ok(Self { buf, at, header })
    }

    /// Opens another node in the same buffer.
    pub fn open_ref(&self, at: Ref) -> Result<Node<'a>, Error> {
        Node::open(self.buf, at)
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub fn at(&self) -> Ref {
        self.at
    }

    pub fn header(&self) -> NodeHeader {
        self.header
    }

    pub fn width(&self) -> u8 {
        self.header.width
    }

    pub fn len(&self) -> usize {
        self.header.size
    }

    pub fn is_empty(&self) -> bool {
        self.header.size == 0
    }

    pub fn get(&self, index: usize) -> Result<i64, Error> {
        self.check_index(index)?;
        let width = self.header.width;
        match width {
            0 => Ok(0),
            1 | 2 | 4 => {
                let per_byte = 8 / width as usize;
                let byte = self.bytes(index / per_byte, 1)?[0];
                let shift = (index % per_byte) * width as usize;
                let mask = (1u8 << width) - 1;
                Ok(((byte >> shift) & mask) as i64)
            }
            8 => Ok(self.bytes(index, 1)?[0] as i8 as i64),
            16 => Ok(i16::from_le_bytes(self.array(index * 2)?) as i64),
            32 => Ok(i32::from_le_bytes(self.array(index * 4)?) as i64),
            64 => Ok(i64::from_le_bytes(self.array(index * 8)?)),
            _ => Err(Error::format(format!("invalid element width {width}")).with_offset(self.at)),
        }
    }

    pub fn get_ref(&self, index: usize) -> Result<RefValue, Error> {
        self.get(index).map(RefValue::from_raw)
    }

    /// Opens the node referenced by element `index`; null or tagged elements are format errors.
    pub fn child(&self, index: usize) -> Result<Node<'a>, Error> {
        match self.get_ref(index)? {
            RefValue::Ref(at) => self.open_ref(at),
            RefValue::Null => Err(Error::format(format!("element {index} is a null ref"))
                .with_offset(self.at)),
            RefValue::Tagged(_) => Err(Error::format(format!(
                "element {index} is a tagged integer, expected a ref"
            ))
            .with_offset(self.at)),
        }
    }

    pub fn values(self) -> impl Iterator<Item = Result<i64, Error>> + 'a {
        (0..self.len()).map(move |index| self.get(index))
    }

    /// Payload bytes `[offset, offset + len)` counted from the end of the header.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], Error> {
        slice(self.buf, self.at, NODE_HEADER_LEN + offset, len).map_err(|err| err.with_offset(self.at))
    }

    pub fn check_index(&self, index: usize) -> Result<(), Error> {
        if index >= self.len() {
            return Err(Error::range(format!(
                "index {index} out of range for node of size {}",
                self.len()
            ))
            .with_offset(self.at));
        }
        Ok(())
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }
}

fn slice(buf: &[u8], at: Ref, offset: usize, len: usize) -> Result<&[u8], Error> {
    usize::try_from(at)
        .ok()
        .and_then(|start| start.checked_add(offset))
        .and_then(|start| Some(start..start.checked_add(len)?))
        .and_then(|range| buf.get(range))
        .ok_or_else(|| Error::range(format!("read of {len} bytes at +{offset} exceeds file")))
}
