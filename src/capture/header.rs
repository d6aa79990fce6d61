use crate::endianness::{CaptureBE, CaptureEndianness, CaptureLE};
use crate::error::FormatError;
use nom::IResult;
use rusticata_macros::newtype_enum;

/// Size of the capture global header, in bytes
pub const GLOBAL_HEADER_LEN: usize = 24;

/// Magic number of captures with microsecond timestamps
pub const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
/// Magic number of captures with nanosecond timestamps
pub const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Link-layer header type of every record, from the header `network` field
///
/// Only Ethernet records are understood by [`decode`](crate::decode::decode); records of
/// any other type are still parsed and returned as raw bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Linktype(pub i32);

newtype_enum! {
impl display Linktype {
    NULL = 0,
    ETHERNET = 1,
    RAW = 101,
    LINUX_SLL = 113,
    IPV4 = 228,
    IPV6 = 229,
}
}

impl Linktype {
    #[inline]
    pub fn is_ethernet(self) -> bool {
        self == Linktype::ETHERNET
    }
}

/// Unit of the fractional timestamp component of every record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampPrecision {
    Micro,
    Nano,
}

impl TimestampPrecision {
    pub const fn units_per_sec(self) -> u32 {
        match self {
            TimestampPrecision::Micro => 1_000_000,
            TimestampPrecision::Nano => 1_000_000_000,
        }
    }
}

/// Capture global header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalHeader {
    /// Either `0xa1b2c3d4` (microseconds) or `0xa1b23c4d` (nanoseconds), as read in the
    /// byte order of the file.
    pub magic_number: u32,
    /// True if the magic number (and thus every following field) was stored big-endian
    pub big_endian: bool,
    /// Version major number (currently 2)
    pub version_major: u16,
    /// Version minor number (currently 4)
    pub version_minor: u16,
    /// The correction time in seconds between GMT (UTC) and the local timezone of the following packet header timestamps
    pub thiszone: i32,
    /// In theory, the accuracy of time stamps in the capture; in practice, all tools set it to 0
    pub sigfigs: u32,
    /// max len of captured packets, in octets
    pub snaplen: u32,
    /// Data link type
    pub network: Linktype,
}

impl GlobalHeader {
    pub fn new() -> GlobalHeader {
        GlobalHeader {
            magic_number: MAGIC_MICROS,
            big_endian: false,
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: 65535,
            network: Linktype::ETHERNET,
        }
    }

    pub const fn size(&self) -> usize {
        GLOBAL_HEADER_LEN
    }

    pub fn is_nanosecond_precision(&self) -> bool {
        self.magic_number == MAGIC_NANOS
    }

    pub fn precision(&self) -> TimestampPrecision {
        if self.is_nanosecond_precision() {
            TimestampPrecision::Nano
        } else {
            TimestampPrecision::Micro
        }
    }
}

impl Default for GlobalHeader {
    fn default() -> Self {
        GlobalHeader::new()
    }
}

#[inline]
fn is_magic(n: u32) -> bool {
    n == MAGIC_MICROS || n == MAGIC_NANOS
}

fn parse_header_body<E: CaptureEndianness>(
    i: &[u8],
    magic_number: u32,
) -> IResult<&[u8], GlobalHeader> {
    let (i, version_major) = E::parse_u16(i)?;
    let (i, version_minor) = E::parse_u16(i)?;
    let (i, thiszone) = E::parse_i32(i)?;
    let (i, sigfigs) = E::parse_u32(i)?;
    let (i, snaplen) = E::parse_u32(i)?;
    let (i, network) = E::parse_i32(i)?;
    let header = GlobalHeader {
        magic_number,
        big_endian: E::BIG_ENDIAN,
        version_major,
        version_minor,
        thiszone,
        sigfigs,
        snaplen,
        network: Linktype(network),
    };
    Ok((i, header))
}

/// Read the capture global header
///
/// The byte order is discovered from the magic number: the first 4 bytes are
/// read both ways, and the interpretation that yields a known magic number
/// decides how every following field is read.
pub fn parse_global_header(i: &[u8]) -> Result<(&[u8], GlobalHeader), FormatError> {
    if i.len() < GLOBAL_HEADER_LEN {
        return Err(FormatError::HeaderTooShort { len: i.len() });
    }
    let magic = [i[0], i[1], i[2], i[3]];
    let le = u32::from_le_bytes(magic);
    let be = u32::from_be_bytes(magic);
    let body = &i[4..];
    let res = if is_magic(le) {
        parse_header_body::<CaptureLE>(body, le)
    } else if is_magic(be) {
        parse_header_body::<CaptureBE>(body, be)
    } else {
        return Err(FormatError::InvalidMagic { le, be });
    };
    res.map_err(|_| FormatError::HeaderTooShort { len: i.len() })
}
