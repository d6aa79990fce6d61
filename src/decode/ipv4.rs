//! IPv4 header.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version|  IHL  |Type of Service|          Total Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Identification        |Flags|      Fragment Offset    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Time to Live |    Protocol   |         Header Checksum       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Source Address                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Destination Address                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::decode::field::{hex_value, incomplete, DecodedField};
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;
use rusticata_macros::newtype_enum;
use std::net::Ipv4Addr;

/// Minimum IPv4 header length (no options)
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// IP protocol number of the transport payload
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IpProtocol(pub u8);

newtype_enum! {
impl display IpProtocol {
    ICMP = 1,
    TCP = 6,
    UDP = 17,
}
}

impl IpProtocol {
    pub fn description(self) -> &'static str {
        match self {
            IpProtocol::ICMP => "ICMP",
            IpProtocol::TCP => "TCP",
            IpProtocol::UDP => "UDP",
            _ => "Unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub total_length: u16,
    pub identification: u16,
    pub ttl: u8,
    pub protocol: IpProtocol,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Header length in bytes, as declared by the IHL nibble
    #[inline]
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl) * 4
    }
}

/// Parse the fixed 20 bytes of the header. Options are not interpreted.
pub(crate) fn parse_ipv4_header(i: &[u8]) -> IResult<&[u8], Ipv4Header> {
    let (i, version_ihl) = be_u8(i)?;
    let (i, _tos) = be_u8(i)?;
    let (i, total_length) = be_u16(i)?;
    let (i, identification) = be_u16(i)?;
    let (i, _flags_fragment) = be_u16(i)?;
    let (i, ttl) = be_u8(i)?;
    let (i, protocol) = be_u8(i)?;
    let (i, checksum) = be_u16(i)?;
    let (i, source) = be_u32(i)?;
    let (i, destination) = be_u32(i)?;
    let header = Ipv4Header {
        version: version_ihl >> 4,
        ihl: version_ihl & 0x0f,
        total_length,
        identification,
        ttl,
        protocol: IpProtocol(protocol),
        checksum,
        source: Ipv4Addr::from(source),
        destination: Ipv4Addr::from(destination),
    };
    Ok((i, header))
}

/// Decode the network layer. `data` starts right after the link header.
///
/// Returns the transport protocol and the bytes following the declared header length. The
/// checksum is displayed, not verified.
pub(crate) fn decode_ipv4<'a>(
    data: &'a [u8],
    fields: &mut Vec<DecodedField>,
) -> Option<(IpProtocol, &'a [u8])> {
    if data.len() < IPV4_MIN_HEADER_LEN {
        fields.push(incomplete("IPv4", data.len(), IPV4_MIN_HEADER_LEN));
        return None;
    }
    let (_, ip) = parse_ipv4_header(data).ok()?;
    if ip.version != 4 {
        fields.push(DecodedField::new(
            "IP Version",
            format!("Unsupported version {}", ip.version),
        ));
        return None;
    }
    let header_len = ip.header_len();
    fields.push(DecodedField::new("Version", ip.version));
    fields.push(DecodedField::described(
        "IP Header Length",
        format!("{} bytes", header_len),
        format!("IHL {}", ip.ihl),
    ));
    if header_len < IPV4_MIN_HEADER_LEN {
        fields.push(DecodedField::described(
            "IPv4",
            "Invalid header length",
            format!("{} bytes is below the {} byte minimum", header_len, IPV4_MIN_HEADER_LEN),
        ));
        return None;
    }
    fields.push(DecodedField::new("Total Length", ip.total_length));
    fields.push(DecodedField::described(
        "Identification",
        hex_value(u32::from(ip.identification), 4),
        ip.identification.to_string(),
    ));
    fields.push(DecodedField::new("TTL", ip.ttl));
    fields.push(DecodedField::described(
        "Protocol",
        ip.protocol.0,
        ip.protocol.description(),
    ));
    fields.push(DecodedField::new(
        "Header Checksum",
        hex_value(u32::from(ip.checksum), 4),
    ));
    fields.push(DecodedField::new("Source IP", ip.source.to_string()));
    fields.push(DecodedField::new("Destination IP", ip.destination.to_string()));
    // options beyond the minimum header are skipped, not decoded
    let transport = data.get(header_len..).unwrap_or(&[]);
    Some((ip.protocol, transport))
}
