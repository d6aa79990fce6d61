//! Ethernet II header.

use crate::decode::field::{hex_value, incomplete, DecodedField};
use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;
use rusticata_macros::newtype_enum;

/// Ethernet header length, without 802.1Q tag
pub const ETHERNET_HEADER_LEN: usize = 14;

/// EtherType of the encapsulated protocol
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EtherType(pub u16);

newtype_enum! {
impl display EtherType {
    IPV4 = 0x0800,
    ARP = 0x0806,
    IPV6 = 0x86dd,
}
}

impl EtherType {
    pub fn description(self) -> &'static str {
        match self {
            EtherType::IPV4 => "IPv4",
            EtherType::ARP => "ARP",
            EtherType::IPV6 => "IPv6",
            _ => "Unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EthernetHeader<'a> {
    pub destination: &'a [u8],
    pub source: &'a [u8],
    pub ethertype: EtherType,
}

pub(crate) fn parse_ethernet_header(i: &[u8]) -> IResult<&[u8], EthernetHeader<'_>> {
    let (i, destination) = take(6usize)(i)?;
    let (i, source) = take(6usize)(i)?;
    let (i, ethertype) = be_u16(i)?;
    let header = EthernetHeader {
        destination,
        source,
        ethertype: EtherType(ethertype),
    };
    Ok((i, header))
}

/// Lowercase, colon-separated MAC address
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Decode the link layer. Returns the EtherType and the remaining bytes if the header was complete.
pub(crate) fn decode_ethernet<'a>(
    data: &'a [u8],
    fields: &mut Vec<DecodedField>,
) -> Option<(EtherType, &'a [u8])> {
    if data.len() < ETHERNET_HEADER_LEN {
        fields.push(incomplete("Ethernet", data.len(), ETHERNET_HEADER_LEN));
        return None;
    }
    let (rem, eth) = parse_ethernet_header(data).ok()?;
    fields.push(DecodedField::new(
        "Destination MAC",
        format_mac(eth.destination),
    ));
    fields.push(DecodedField::new("Source MAC", format_mac(eth.source)));
    fields.push(DecodedField::described(
        "EtherType",
        hex_value(u32::from(eth.ethertype.0), 4),
        eth.ethertype.description(),
    ));
    Some((eth.ethertype, rem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::field::FieldValue;
    use hex_literal::hex;

    const ETH_ARP: &[u8] = &hex!("FF FF FF FF FF FF 00 1A 2B 3C 4D 5E 08 06 00 01");

    #[test]
    fn test_decode_ethernet_arp() {
        let mut fields = Vec::new();
        let (ethertype, rem) = decode_ethernet(ETH_ARP, &mut fields).expect("complete header");
        assert_eq!(ethertype, EtherType::ARP);
        assert_eq!(rem, &[0x00, 0x01]);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].value, FieldValue::Text("ff:ff:ff:ff:ff:ff".into()));
        assert_eq!(fields[1].value, FieldValue::Text("00:1a:2b:3c:4d:5e".into()));
        assert_eq!(fields[2].value, FieldValue::Text("0x0806".into()));
        assert_eq!(fields[2].description.as_deref(), Some("ARP"));
    }

    #[test]
    fn test_unknown_ethertype() {
        assert_eq!(EtherType(0x88cc).description(), "Unknown");
        assert_eq!(hex_value(0x88cc, 4), "0x88cc");
    }

    #[test]
    fn test_short_frame() {
        let mut fields = Vec::new();
        assert!(decode_ethernet(&ETH_ARP[..13], &mut fields).is_none());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "Ethernet");
    }
}
