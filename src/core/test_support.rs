//! In-memory writer for well-formed node graphs and whole database files.
//! Compiled only for tests. Integration tests pull it in with `#[path]`, so it
//! must depend on nothing but std.
#![allow(dead_code)]

pub const FILE_HEADER_LEN: usize = 24;
pub const NODE_HEADER_LEN: usize = 8;

pub const WIDTH_TYPE_BITS: u8 = 0;
pub const WIDTH_TYPE_MULTIPLY: u8 = 1;
pub const WIDTH_TYPE_IGNORE: u8 = 2;

pub const FLOAT_NULL_BITS: u32 = 0x7fc0_00aa;
pub const DOUBLE_NULL_BITS: u64 = 0x7ff8_0000_0000_00aa;

pub mod col {
    pub const INT: i64 = 0;
    pub const BOOL: i64 = 1;
    pub const STRING: i64 = 2;
    pub const STRING_ENUM: i64 = 3;
    pub const BINARY: i64 = 4;
    pub const TABLE: i64 = 5;
    pub const MIXED: i64 = 6;
    pub const OLD_DATETIME: i64 = 7;
    pub const TIMESTAMP: i64 = 8;
    pub const FLOAT: i64 = 9;
    pub const DOUBLE: i64 = 10;
    pub const LINK: i64 = 12;
    pub const LINK_LIST: i64 = 13;
    pub const BACKLINK: i64 = 14;
}

pub mod attr {
    pub const NONE: i64 = 0;
    pub const INDEXED: i64 = 1;
    pub const UNIQUE: i64 = 2;
    pub const STRONG_LINKS: i64 = 8;
    pub const NULLABLE: i64 = 16;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Flags {
    pub inner: bool,
    pub has_refs: bool,
    pub context: bool,
}

impl Flags {
    pub const PLAIN: Flags = Flags { inner: false, has_refs: false, context: false };
    pub const REFS: Flags = Flags { inner: false, has_refs: true, context: false };
    pub const INNER: Flags = Flags { inner: true, has_refs: true, context: false };
    pub const BIG_BLOBS: Flags = Flags { inner: false, has_refs: true, context: true };
    pub const CONTEXT: Flags = Flags { inner: false, has_refs: false, context: true };
}

#[derive(Clone, Copy, Debug)]
pub enum Subspec {
    Tagged(u64),
    Ref(u64),
}

/// Raw encoding of an inline integer stored in a ref array.
pub fn tagged(value: u64) -> i64 {
    ((value << 1) | 1) as i64
}

pub fn width_code(width: u8) -> u8 {
    match width {
        0 => 0,
        1 => 1,
        2 => 2,
        4 => 3,
        8 => 4,
        16 => 5,
        32 => 6,
        64 => 7,
        _ => panic!("unsupported width {width}"),
    }
}

pub fn min_width(values: &[i64]) -> u8 {
    values.iter().map(|&value| value_width(value)).max().unwrap_or(0)
}

fn value_width(value: i64) -> u8 {
    match value {
        0 => 0,
        1 => 1,
        2..=3 => 2,
        4..=15 => 4,
        _ if i8::try_from(value).is_ok() => 8,
        _ if i16::try_from(value).is_ok() => 16,
        _ if i32::try_from(value).is_ok() => 32,
        _ => 64,
    }
}

/// Packs `values` at a fixed bit width, sub-byte widths little-end first.
pub fn pack(values: &[i64], width: u8) -> Vec<u8> {
    match width {
        0 => Vec::new(),
        1 | 2 | 4 => {
            let per_byte = 8 / width as usize;
            let mask = (1u8 << width) - 1;
            let mut out = vec![0u8; values.len().div_ceil(per_byte)];
            for (i, &value) in values.iter().enumerate() {
                out[i / per_byte] |= ((value as u8) & mask) << ((i % per_byte) * width as usize);
            }
            out
        }
        8 => values.iter().map(|&value| value as i8 as u8).collect(),
        16 => values.iter().flat_map(|&value| (value as i16).to_le_bytes()).collect(),
        32 => values.iter().flat_map(|&value| (value as i32).to_le_bytes()).collect(),
        64 => values.iter().flat_map(|&value| value.to_le_bytes()).collect(),
        _ => panic!("unsupported width {width}"),
    }
}

pub struct FileBuilder {
    buf: Vec<u8>,
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FileBuilder {
    pub fn new() -> Self {
        Self { buf: vec![0; FILE_HEADER_LEN] }
    }

    /// Ref the next appended node will get.
    pub fn next_ref(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn node(
        &mut self,
        flags: Flags,
        width_type: u8,
        width: u8,
        size: usize,
        payload: &[u8],
    ) -> u64 {
        let at = self.buf.len();
        let total = (NODE_HEADER_LEN + payload.len()).next_multiple_of(8);

        let mut flag_byte = width_code(width) | (width_type << 3);
        if flags.inner {
            flag_byte |= 0x80;
        }
        if flags.has_refs {
            flag_byte |= 0x40;
        }
        if flags.context {
            flag_byte |= 0x20;
        }

        self.buf.extend_from_slice(&[
            (total >> 19) as u8,
            (total >> 11) as u8,
            (total >> 3) as u8,
            0,
            flag_byte,
            (size >> 16) as u8,
            (size >> 8) as u8,
            size as u8,
        ]);
        self.buf.extend_from_slice(payload);
        self.buf.resize(at + total, 0);
        at as u64
    }

    pub fn ints(&mut self, values: &[i64]) -> u64 {
        self.ints_with(Flags::PLAIN, min_width(values), values)
    }

    pub fn ints_with(&mut self, flags: Flags, width: u8, values: &[i64]) -> u64 {
        let payload = pack(values, width);
        self.node(flags, WIDTH_TYPE_BITS, width, values.len(), &payload)
    }

    pub fn refs(&mut self, values: &[i64]) -> u64 {
        self.ints_with(Flags::REFS, min_width(values), values)
    }

    /// Nullable integers with the smallest non-negative sentinel not used by a value.
    pub fn nullable_ints(&mut self, values: &[Option<i64>]) -> u64 {
        let sentinel = (0i64..)
            .find(|candidate| !values.contains(&Some(*candidate)))
            .expect("free sentinel");
        self.nullable_ints_with(sentinel, values)
    }

    pub fn nullable_ints_with(&mut self, sentinel: i64, values: &[Option<i64>]) -> u64 {
        let mut raw = vec![sentinel];
        raw.extend(values.iter().map(|value| value.unwrap_or(sentinel)));
        self.ints(&raw)
    }

    pub fn short_strings(&mut self, values: &[Option<&str>]) -> u64 {
        let width = match values.iter().flatten().map(|value| value.len()).max() {
            None => 0,
            Some(longest) => [4u8, 8, 16, 32, 64]
                .into_iter()
                .find(|width| longest < *width as usize)
                .expect("short string too long"),
        };
        self.short_strings_with_width(width, values)
    }

    pub fn short_strings_with_width(&mut self, width: u8, values: &[Option<&str>]) -> u64 {
        let slot_len = width as usize;
        let mut payload = Vec::with_capacity(slot_len * values.len());
        for value in values {
            let mut slot = vec![0u8; slot_len];
            if slot_len > 0 {
                match value {
                    Some(text) => {
                        slot[..text.len()].copy_from_slice(text.as_bytes());
                        slot[slot_len - 1] = (slot_len - 1 - text.len()) as u8;
                    }
                    None => slot[slot_len - 1] = width,
                }
            }
            payload.extend_from_slice(&slot);
        }
        self.node(Flags::PLAIN, WIDTH_TYPE_MULTIPLY, width, values.len(), &payload)
    }

    pub fn blob(&mut self, flags: Flags, bytes: &[u8]) -> u64 {
        self.node(flags, WIDTH_TYPE_IGNORE, 0, bytes.len(), bytes)
    }

    /// Offsets + blob (+ nulls when nullable, zero marking null).
    pub fn long_strings(&mut self, values: &[Option<&str>], nullable: bool) -> u64 {
        let mut blob = Vec::new();
        let mut ends = Vec::new();
        let mut nulls = Vec::new();
        for value in values {
            if let Some(text) = value {
                blob.extend_from_slice(text.as_bytes());
            }
            blob.push(0);
            ends.push(blob.len() as i64);
            nulls.push(i64::from(value.is_some()));
        }
        let offsets = self.ints(&ends);
        let blob = self.blob(Flags::PLAIN, &blob);
        let mut children = vec![offsets as i64, blob as i64];
        if nullable {
            children.push(self.ints(&nulls) as i64);
        }
        self.refs(&children)
    }

    /// Offsets + blob (+ nulls when requested, nonzero marking null).
    pub fn binaries(&mut self, values: &[Option<&[u8]>], with_nulls: bool) -> u64 {
        let mut blob = Vec::new();
        let mut ends = Vec::new();
        let mut nulls = Vec::new();
        for value in values {
            if let Some(bytes) = value {
                blob.extend_from_slice(bytes);
            }
            ends.push(blob.len() as i64);
            nulls.push(i64::from(value.is_none()));
        }
        let offsets = self.ints(&ends);
        let blob = self.blob(Flags::PLAIN, &blob);
        let mut children = vec![offsets as i64, blob as i64];
        if with_nulls {
            children.push(self.ints(&nulls) as i64);
        }
        self.refs(&children)
    }

    pub fn big_blobs(&mut self, values: &[Option<&[u8]>]) -> u64 {
        let children: Vec<i64> = values
            .iter()
            .map(|value| match value {
                Some(bytes) => self.blob(Flags::PLAIN, bytes) as i64,
                None => 0,
            })
            .collect();
        self.ints_with(Flags::BIG_BLOBS, min_width(&children), &children)
    }

    pub fn big_strings(&mut self, values: &[Option<&str>]) -> u64 {
        let terminated: Vec<Option<Vec<u8>>> = values
            .iter()
            .map(|value| {
                value.map(|text| {
                    let mut bytes = text.as_bytes().to_vec();
                    bytes.push(0);
                    bytes
                })
            })
            .collect();
        let borrowed: Vec<Option<&[u8]>> = terminated.iter().map(|value| value.as_deref()).collect();
        self.big_blobs(&borrowed)
    }

    pub fn floats(&mut self, values: &[Option<f32>]) -> u64 {
        let payload: Vec<u8> = values
            .iter()
            .flat_map(|value| value.map_or(FLOAT_NULL_BITS, f32::to_bits).to_le_bytes())
            .collect();
        self.node(Flags::PLAIN, WIDTH_TYPE_MULTIPLY, 4, values.len(), &payload)
    }

    pub fn doubles(&mut self, values: &[Option<f64>]) -> u64 {
        let payload: Vec<u8> = values
            .iter()
            .flat_map(|value| value.map_or(DOUBLE_NULL_BITS, f64::to_bits).to_le_bytes())
            .collect();
        self.node(Flags::PLAIN, WIDTH_TYPE_MULTIPLY, 8, values.len(), &payload)
    }

    pub fn compact_inner(&mut self, elems_per_child: u64, children: &[u64], total: u64) -> u64 {
        let mut values = vec![tagged(elems_per_child)];
        values.extend(children.iter().map(|&child| child as i64));
        values.push(tagged(total));
        self.ints_with(Flags::INNER, min_width(&values), &values)
    }

    pub fn general_inner(&mut self, children: &[u64], child_sizes: &[u64]) -> u64 {
        let mut running = 0u64;
        let mut offsets = Vec::new();
        for size in &child_sizes[..child_sizes.len().saturating_sub(1)] {
            running += size;
            offsets.push(running as i64);
        }
        let total: u64 = child_sizes.iter().sum();
        let offsets = self.ints(&offsets);

        let mut values = vec![offsets as i64];
        values.extend(children.iter().map(|&child| child as i64));
        values.push(tagged(total));
        self.ints_with(Flags::INNER, min_width(&values), &values)
    }

    /// Columns are `(type code, name, attr bits)`; unnamed columns must come last.
    pub fn spec(&mut self, columns: &[(i64, Option<&str>, i64)], subspecs: &[Subspec]) -> u64 {
        let types: Vec<i64> = columns.iter().map(|column| column.0).collect();
        let names: Vec<Option<&str>> = columns.iter().filter_map(|column| column.1).map(Some).collect();
        let attrs: Vec<i64> = columns.iter().map(|column| column.2).collect();

        let types = self.ints(&types);
        let names = self.short_strings(&names);
        let attrs = self.ints(&attrs);
        let mut children = vec![types as i64, names as i64, attrs as i64];
        if !subspecs.is_empty() {
            let raw: Vec<i64> = subspecs
                .iter()
                .map(|entry| match entry {
                    Subspec::Tagged(value) => tagged(*value),
                    Subspec::Ref(at) => *at as i64,
                })
                .collect();
            children.push(self.refs(&raw) as i64);
        }
        self.refs(&children)
    }

    pub fn columns(&mut self, roots: &[u64]) -> u64 {
        let raw: Vec<i64> = roots.iter().map(|&root| root as i64).collect();
        self.refs(&raw)
    }

    pub fn table(&mut self, spec: u64, column_roots: &[u64]) -> u64 {
        let columns = self.columns(column_roots);
        self.refs(&[spec as i64, columns as i64])
    }

    pub fn group(&mut self, names: &[&str], tables: &[u64]) -> u64 {
        let names: Vec<Option<&str>> = names.iter().copied().map(Some).collect();
        let names = self.short_strings(&names);
        let tables = self.columns(tables);
        let logical_size = self.next_ref() + 32;
        self.refs(&[names as i64, tables as i64, tagged(logical_size)])
    }

    pub fn finish(self, top_ref: u64, version: u8) -> Vec<u8> {
        self.finish_with([top_ref, 0], [version, 0], 0)
    }

    pub fn finish_with(mut self, top_refs: [u64; 2], versions: [u8; 2], flags: u8) -> Vec<u8> {
        self.buf[0..8].copy_from_slice(&top_refs[0].to_le_bytes());
        self.buf[8..16].copy_from_slice(&top_refs[1].to_le_bytes());
        self.buf[16..20].copy_from_slice(b"T-DB");
        self.buf[20] = versions[0];
        self.buf[21] = versions[1];
        self.buf[23] = flags;
        self.buf
    }
}

pub const SAMPLE_TABLES: [&str; 3] = ["class_Currency", "class_CurrencyRate", "class_AllTypes"];
pub const SAMPLE_FORMAT_VERSION: u8 = 9;

/// Three tables covering every decodable column type and both inner-node forms.
pub fn sample_database() -> Vec<u8> {
    let mut b = FileBuilder::new();

    let codes = b.short_strings(&[Some("JPY"), Some("USD"), Some("EUR")]);
    let codes_index = b.ints(&[]);
    let names = b.long_strings(&[Some("Japanese Yen"), Some("US Dollar"), Some("Euro")], false);
    let seconds = b.nullable_ints(&[Some(1_500_000_000), Some(1_500_000_001), Some(1_500_000_002)]);
    let nanos = b.ints(&[0, 500_000_000, 0]);
    let modified = b.refs(&[seconds as i64, nanos as i64]);
    let eur_rates = b.ints(&[1, 2]);
    let backlinks = b.refs(&[tagged(0), 0, eur_rates as i64]);
    let currency_spec = b.spec(
        &[
            (col::STRING, Some("CurrencyCode"), attr::INDEXED),
            (col::STRING, Some("Name"), attr::NONE),
            (col::TIMESTAMP, Some("ModifiedDate"), attr::NONE),
            (col::BACKLINK, None, attr::NONE),
        ],
        &[Subspec::Tagged(1), Subspec::Tagged(0)],
    );
    let currency = b.table(currency_spec, &[codes, codes_index, names, modified, backlinks]);

    let links_a = b.ints(&[1, 3]);
    let links_b = b.ints(&[3, 0]);
    let links = b.compact_inner(2, &[links_a, links_b], 4);
    let averages_a = b.doubles(&[Some(1.5)]);
    let averages_b = b.doubles(&[Some(2.25), None, Some(4.0)]);
    let averages = b.general_inner(&[averages_a, averages_b], &[1, 3]);
    let rates = b.floats(&[Some(0.5), Some(1.0), Some(1.5), Some(2.0)]);
    let rate_spec = b.spec(
        &[
            (col::LINK, Some("Currency"), attr::NONE),
            (col::DOUBLE, Some("AverageRate"), attr::NULLABLE),
            (col::FLOAT, Some("Rate"), attr::NONE),
        ],
        &[Subspec::Tagged(0)],
    );
    let rate = b.table(rate_spec, &[links, averages, rates]);

    let counts = b.ints(&[7, -300]);
    let maybe = b.nullable_ints(&[Some(42), None]);
    let flags = b.ints(&[1, 0]);
    let maybe_flags = b.nullable_ints(&[None, Some(1)]);
    let notes = b.big_strings(&[Some("big note"), None]);
    let payloads = b.binaries(&[Some(&[0xde, 0xad][..]), None], true);
    let legacy = b.ints(&[86_400, 0]);
    let picks = b.ints(&[0, 2]);
    let currencies = b.refs(&[picks as i64, 0]);
    let qty = b.ints(&[3, 4, 5]);
    let item_columns = b.columns(&[qty]);
    let items = b.refs(&[item_columns as i64, 0]);
    let mixed = b.ints(&[0, 0]);
    let ratios = b.floats(&[None, Some(0.25)]);
    let item_spec = b.spec(&[(col::INT, Some("qty"), attr::NONE)], &[]);
    let all_spec = b.spec(
        &[
            (col::INT, Some("Count"), attr::NONE),
            (col::INT, Some("Maybe"), attr::NULLABLE),
            (col::BOOL, Some("Flag"), attr::NONE),
            (col::BOOL, Some("MaybeFlag"), attr::NULLABLE),
            (col::STRING, Some("Note"), attr::NULLABLE),
            (col::BINARY, Some("Payload"), attr::NULLABLE),
            (col::OLD_DATETIME, Some("Legacy"), attr::NONE),
            (col::LINK_LIST, Some("Currencies"), attr::NONE),
            (col::TABLE, Some("Items"), attr::NONE),
            (col::MIXED, Some("Any"), attr::NONE),
            (col::FLOAT, Some("Ratio"), attr::NULLABLE),
        ],
        &[Subspec::Tagged(0), Subspec::Ref(item_spec)],
    );
    let all = b.table(
        all_spec,
        &[
            counts, maybe, flags, maybe_flags, notes, payloads, legacy, currencies, items, mixed,
            ratios,
        ],
    );

    let top = b.group(&SAMPLE_TABLES, &[currency, rate, all]);
    b.finish(top, SAMPLE_FORMAT_VERSION)
}
