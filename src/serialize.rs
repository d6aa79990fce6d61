//! Capture file writer
//!
//! Serializes a global header and records back into the container format, in the byte
//! order given by [`GlobalHeader::big_endian`].

use crate::capture::{GlobalHeader, PacketRecord, MAGIC_MICROS, MAGIC_NANOS};
use cookie_factory::bytes::{be_i32, be_u16, be_u32, le_i32, le_u16, le_u32};
use cookie_factory::combinator::slice;
use cookie_factory::sequence::tuple;
use cookie_factory::{gen, GenError};

/// Common trait for all serialization functions
pub trait ToVec {
    /// Serialize to bytes representation.
    /// Check values and fix all fields before serializing.
    fn to_vec(&mut self) -> Result<Vec<u8>, GenError> {
        self.fix();
        self.to_vec_raw()
    }

    /// Check and correct all fields: use magic, fix lengths fields and other values if possible.
    fn fix(&mut self) {}

    /// Serialize to bytes representation. Do not check values
    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError>;
}

impl ToVec for GlobalHeader {
    fn fix(&mut self) {
        if self.magic_number != MAGIC_NANOS {
            self.magic_number = MAGIC_MICROS;
        }
        self.version_major = 2;
        self.version_minor = 4;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(self.size());
        if self.big_endian {
            gen(
                tuple((
                    be_u32(self.magic_number),
                    be_u16(self.version_major),
                    be_u16(self.version_minor),
                    be_i32(self.thiszone),
                    be_u32(self.sigfigs),
                    be_u32(self.snaplen),
                    be_i32(self.network.0),
                )),
                &mut v,
            )
            .map(|res| res.0.to_vec())
        } else {
            gen(
                tuple((
                    le_u32(self.magic_number),
                    le_u16(self.version_major),
                    le_u16(self.version_minor),
                    le_i32(self.thiszone),
                    le_u32(self.sigfigs),
                    le_u32(self.snaplen),
                    le_i32(self.network.0),
                )),
                &mut v,
            )
            .map(|res| res.0.to_vec())
        }
    }
}

/// Serialize one record in the requested byte order
pub fn record_to_vec(record: &PacketRecord, big_endian: bool) -> Result<Vec<u8>, GenError> {
    let mut v = Vec::with_capacity(record.data.len() + 16);
    // records have no alignment constraints
    if big_endian {
        gen(
            tuple((
                be_u32(record.ts_sec),
                be_u32(record.ts_usec),
                be_u32(record.caplen),
                be_u32(record.origlen),
                slice(&record.data),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    } else {
        gen(
            tuple((
                le_u32(record.ts_sec),
                le_u32(record.ts_usec),
                le_u32(record.caplen),
                le_u32(record.origlen),
                slice(&record.data),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl ToVec for PacketRecord {
    /// Set `caplen` to the number of bytes held, and make sure `origlen` is not smaller
    fn fix(&mut self) {
        self.caplen = self.data.len() as u32;
        if self.origlen < self.caplen {
            self.origlen = self.caplen;
        }
    }

    /// Little-endian record
    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        record_to_vec(self, false)
    }
}

/// Serialize a complete capture: the header followed by every record, all in the header's byte order.
///
/// Record lengths are written as found; use [`ToVec::fix`] on records first to make them consistent.
pub fn capture_to_vec(header: &GlobalHeader, records: &[PacketRecord]) -> Result<Vec<u8>, GenError> {
    let mut v = header.to_vec_raw()?;
    for record in records {
        v.extend_from_slice(&record_to_vec(record, header.big_endian)?);
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::parse_global_header;
    use hex_literal::hex;

    #[test]
    fn test_serialize_header_le() {
        let mut hdr = GlobalHeader::new();
        hdr.snaplen = 262_144;
        let v = hdr.to_vec().expect("serialize");
        assert_eq!(
            v,
            hex!("D4 C3 B2 A1 02 00 04 00 00 00 00 00 00 00 00 00 00 00 04 00 01 00 00 00")
        );
    }

    #[test]
    fn test_serialize_header_be_parses_back() {
        let hdr = GlobalHeader {
            big_endian: true,
            magic_number: MAGIC_NANOS,
            thiszone: -3600,
            ..GlobalHeader::new()
        };
        let v = hdr.to_vec_raw().expect("serialize");
        assert_eq!(&v[..4], &hex!("A1 B2 3C 4D"));
        let (_, parsed) = parse_global_header(&v).expect("parse");
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn test_record_fix() {
        let mut rec = PacketRecord {
            data: vec![1, 2, 3],
            ..PacketRecord::default()
        };
        let v = rec.to_vec().expect("serialize");
        assert_eq!(rec.caplen, 3);
        assert_eq!(rec.origlen, 3);
        assert_eq!(v.len(), 16 + 3);
        assert_eq!(&v[8..12], &[3, 0, 0, 0]);
    }
}
