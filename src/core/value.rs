// Decoded cell values handed to presentation code.
use time::OffsetDateTime;

use crate::core::error::Error;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Seconds plus a nanosecond part carrying the same sign.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanoseconds: i32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    pub fn unix_timestamp_nanos(&self) -> i128 {
        self.seconds as i128 * NANOS_PER_SECOND + self.nanoseconds as i128
    }

    pub fn to_offset_date_time(&self) -> Result<OffsetDateTime, Error> {
        OffsetDateTime::from_unix_timestamp_nanos(self.unix_timestamp_nanos()).map_err(|err| {
            Error::range(format!("timestamp {}s is outside the supported range", self.seconds))
                .with_source(err)
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value<'a> {
    Null,
    Int(i64),
    Bool(bool),
    /// Seconds since the epoch.
    OldDateTime(i64),
    Float(f32),
    Double(f64),
    String(&'a str),
    Binary(&'a [u8]),
    Timestamp(Timestamp),
    /// Target row index.
    Link(usize),
    LinkList(Vec<usize>),
    /// Origin row indexes.
    BackLinks(Vec<usize>),
    /// Row count of the nested table; read it with `Table::get_subtable`.
    Subtable(usize),
}

impl Value<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}
