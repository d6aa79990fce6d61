use crate::capture::header::TimestampPrecision;
use crate::endianness::{CaptureBE, CaptureEndianness, CaptureLE};
use crate::error::TruncationWarning;
use nom::IResult;
use std::time::Duration;

/// Size of the fixed header in front of every record, in bytes
pub const RECORD_HEADER_LEN: usize = 16;

/// Fixed part of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub caplen: u32,
    pub origlen: u32,
}

/// Borrowed view of one record, pointing into the capture buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordRef<'a> {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub caplen: u32,
    pub origlen: u32,
    pub data: &'a [u8],
}

impl<'a> RecordRef<'a> {
    /// Copy the record out of the capture buffer
    pub fn to_record(&self) -> PacketRecord {
        PacketRecord {
            ts_sec: self.ts_sec,
            ts_usec: self.ts_usec,
            caplen: self.caplen,
            origlen: self.origlen,
            data: self.data.to_vec(),
        }
    }
}

/// One captured frame, owning its bytes
///
/// `caplen` is not checked against `origlen`: both are returned as found in the file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketRecord {
    /// The date and time when this packet was captured (seconds since epoch)
    pub ts_sec: u32,
    /// Fractional part of the timestamp, unscaled (micro- or nanoseconds
    /// depending on the capture magic number)
    pub ts_usec: u32,
    /// The number of bytes of packet data actually captured and saved in the file
    pub caplen: u32,
    /// The length of the packet as it appeared on the network when it was captured
    pub origlen: u32,
    /// Exactly `caplen` bytes of packet data
    pub data: Vec<u8>,
}

impl PacketRecord {
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Capture time since epoch, scaling the fractional part according to `precision`.
    ///
    /// Out-of-range fractional values (not smaller than one second) carry over into seconds.
    pub fn timestamp(&self, precision: TimestampPrecision) -> Duration {
        let units = precision.units_per_sec();
        let nanos_per_unit = 1_000_000_000 / units;
        let extra_secs = self.ts_usec / units;
        let frac = self.ts_usec % units;
        Duration::new(
            u64::from(self.ts_sec) + u64::from(extra_secs),
            frac * nanos_per_unit,
        )
    }
}

fn parse_record_header<E: CaptureEndianness>(
    i: &[u8],
) -> IResult<&[u8], RecordHeader> {
    let (i, ts_sec) = E::parse_u32(i)?;
    let (i, ts_usec) = E::parse_u32(i)?;
    let (i, caplen) = E::parse_u32(i)?;
    let (i, origlen) = E::parse_u32(i)?;
    Ok((
        i,
        RecordHeader {
            ts_sec,
            ts_usec,
            caplen,
            origlen,
        },
    ))
}

type RecordHeaderFn = fn(&[u8]) -> IResult<&[u8], RecordHeader>;

/// Parsing iterator over the records following the global header (zero-copy)
///
/// Yields records until the data is exhausted. If the remaining bytes cannot hold
/// a complete record, a single `TruncationWarning` is yielded and iteration stops:
/// no byte of the partial record is reinterpreted as a following record.
pub struct RecordIter<'a> {
    rem: &'a [u8],
    offset: usize,
    index: usize,
    done: bool,
    parse: RecordHeaderFn,
}

impl<'a> RecordIter<'a> {
    /// Iterate over `i`, located at `offset` bytes from the start of the capture
    pub fn new(i: &'a [u8], offset: usize, big_endian: bool) -> RecordIter<'a> {
        let parse = if big_endian {
            parse_record_header::<CaptureBE>
        } else {
            parse_record_header::<CaptureLE>
        };
        RecordIter {
            rem: i,
            offset,
            index: 0,
            done: false,
            parse,
        }
    }

    /// Offset of the next record in the capture buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn truncated(&mut self, needed: usize, available: usize) -> TruncationWarning {
        self.done = true;
        TruncationWarning {
            index: self.index,
            offset: self.offset,
            needed,
            available,
        }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<RecordRef<'a>, TruncationWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.rem.is_empty() {
            return None;
        }
        let (rest, hdr) = match (self.parse)(self.rem) {
            Ok(r) => r,
            // fewer bytes than a record header
            Err(_) => {
                let available = self.rem.len();
                return Some(Err(self.truncated(RECORD_HEADER_LEN, available)));
            }
        };
        let caplen = hdr.caplen as usize;
        if rest.len() < caplen {
            let available = rest.len();
            return Some(Err(self.truncated(caplen, available)));
        }
        let (data, rest) = rest.split_at(caplen);
        self.rem = rest;
        self.offset += RECORD_HEADER_LEN + caplen;
        self.index += 1;
        Some(Ok(RecordRef {
            ts_sec: hdr.ts_sec,
            ts_usec: hdr.ts_usec,
            caplen: hdr.caplen,
            origlen: hdr.origlen,
            data,
        }))
    }
}
