// Fixed 24-byte file preamble: two candidate top refs, magic, per-ref format
// versions, and the flag bit selecting the active top ref.
use serde::Serialize;

use crate::core::error::Error;
use crate::core::node::Ref;

pub const FILE_HEADER_LEN: usize = 24;
pub const MAGIC: [u8; 4] = *b"T-DB";

const SELECT_BIT: u8 = 0x01;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TopRef {
    pub top_ref: Ref,
    pub file_format_version: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct FileHeader {
    pub top_refs: [TopRef; 2],
    pub flags: u8,
}

impl FileHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let Some(bytes) = buf.get(..FILE_HEADER_LEN) else {
            return Err(Error::format(format!(
                "file is {} bytes, shorter than the {FILE_HEADER_LEN}-byte header",
                buf.len()
            )));
        };
        if bytes[16..20] != MAGIC {
            return Err(Error::format("bad magic, expected \"T-DB\"")
                .with_offset(16)
                .with_hint("the file is not a Realm database"));
        }
        Ok(Self {
            top_refs: [
                TopRef {
                    top_ref: read_u64(bytes, 0),
                    file_format_version: bytes[20],
                },
                TopRef {
                    top_ref: read_u64(bytes, 8),
                    file_format_version: bytes[21],
                },
            ],
            flags: bytes[23],
        })
    }

    pub fn selected_slot(&self) -> usize {
        usize::from(self.flags & SELECT_BIT)
    }

    /// The active `(ref, version)` pair.
    pub fn top_ref(&self) -> TopRef {
        self.top_refs[self.selected_slot()]
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}
