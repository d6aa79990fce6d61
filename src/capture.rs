//! Capture file container
//!
//! See <https://wiki.wireshark.org/Development/LibpcapFileFormat> for details.
//!
//! A capture is a 24-byte global header followed by a sequence of records, each made of a
//! 16-byte record header and `caplen` bytes of packet data. The byte order of the whole file is
//! given by the magic number.
//!
//! There are 2 ways of reading a capture held in memory. [`parse_capture`] walks the entire
//! buffer and returns owned records, which stay valid after the buffer is dropped or modified.
//! [`CaptureSlice`] parses the global header and then iterates over borrowed records.
//!
//! Truncated trailing records are dropped: the iteration stops at the first record that does
//! not fit in the buffer and the caller receives a [`TruncationWarning`] next to the
//! records accepted so far.

mod header;
mod record;

pub use header::*;
pub use record::*;

use crate::error::{FormatError, TruncationWarning};
use tracing::{debug, warn};

/// Parsing iterator over capture data (requires data to be loaded into memory)
///
/// ```rust
/// use pcap_forensics::capture::CaptureSlice;
///
/// # let buffer: Vec<u8> = vec![0xd4, 0xc3, 0xb2, 0xa1, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0,
/// #                            0xff, 0xff, 0, 0, 1, 0, 0, 0];
/// let slice = CaptureSlice::from_slice(&buffer).expect("not a capture file");
/// let mut num_blocks = 0;
/// for record in slice {
///     match record {
///         Ok(_record) => num_blocks += 1,
///         Err(warning) => println!("{}", warning),
///     }
/// }
/// assert_eq!(num_blocks, 0);
/// ```
pub struct CaptureSlice<'a> {
    pub header: GlobalHeader,
    records: RecordIter<'a>,
}

impl<'a> CaptureSlice<'a> {
    pub fn from_slice(i: &'a [u8]) -> Result<CaptureSlice<'a>, FormatError> {
        let (rem, header) = parse_global_header(i)?;
        let records = RecordIter::new(rem, GLOBAL_HEADER_LEN, header.big_endian);
        Ok(CaptureSlice { header, records })
    }
}

/// Iterator for CaptureSlice. Truncation is returned as an item so it is not
/// silently ignored
impl<'a> Iterator for CaptureSlice<'a> {
    type Item = Result<RecordRef<'a>, TruncationWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

/// A fully parsed capture
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capture {
    pub header: GlobalHeader,
    /// Complete records, in file order
    pub packets: Vec<PacketRecord>,
    /// Set if the buffer ended in the middle of a record
    pub truncation: Option<TruncationWarning>,
}

impl Capture {
    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }
}

/// Parse the entire capture
///
/// Fails only if the global header is missing or unrecognized. A truncated record
/// stops the walk; the records read before it are returned with the warning.
pub fn parse_capture(i: &[u8]) -> Result<Capture, FormatError> {
    let slice = CaptureSlice::from_slice(i)?;
    let header = slice.header.clone();
    if !header.network.is_ethernet() {
        warn!(linktype = %header.network, "records are not Ethernet frames");
    }
    let mut packets = Vec::new();
    let mut truncation = None;
    for record in slice {
        match record {
            Ok(r) => packets.push(r.to_record()),
            Err(w) => {
                warn!(%w, "capture truncated");
                truncation = Some(w);
            }
        }
    }
    debug!(
        packets = packets.len(),
        big_endian = header.big_endian,
        nanosecond = header.is_nanosecond_precision(),
        "capture parsed"
    );
    Ok(Capture {
        header,
        packets,
        truncation,
    })
}
