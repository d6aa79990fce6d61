//! TCP, UDP and ICMP headers.

use crate::decode::field::{hex_value, incomplete, DecodedField};
use crate::decode::ipv4::IpProtocol;
use nom::number::complete::{be_u16, be_u32};
use nom::IResult;

/// Minimum TCP header length (no options)
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;

/// TCP flag names, indexed by bit position in the low 9 bits of the offset/flags word
const TCP_FLAG_NAMES: [&str; 9] = ["FIN", "SYN", "RST", "PSH", "ACK", "URG", "ECE", "CWR", "NS"];

/// Names of the flags set in the low 9 bits of `offset_flags`, lowest bit first
pub fn tcp_flag_names(offset_flags: u16) -> Vec<&'static str> {
    TCP_FLAG_NAMES
        .iter()
        .enumerate()
        .filter(|(bit, _)| offset_flags & (1 << bit) != 0)
        .map(|(_, name)| *name)
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub offset_flags: u16,
    pub window: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
}

impl TcpHeader {
    /// Header length in bytes (data offset × 4)
    #[inline]
    pub fn header_len(&self) -> usize {
        usize::from(self.offset_flags >> 12) * 4
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        self.offset_flags & 0x01ff
    }
}

pub(crate) fn parse_tcp_header(i: &[u8]) -> IResult<&[u8], TcpHeader> {
    let (i, src_port) = be_u16(i)?;
    let (i, dst_port) = be_u16(i)?;
    let (i, seq) = be_u32(i)?;
    let (i, ack) = be_u32(i)?;
    let (i, offset_flags) = be_u16(i)?;
    let (i, window) = be_u16(i)?;
    let (i, checksum) = be_u16(i)?;
    let (i, urgent_pointer) = be_u16(i)?;
    let header = TcpHeader {
        src_port,
        dst_port,
        seq,
        ack,
        offset_flags,
        window,
        checksum,
        urgent_pointer,
    };
    Ok((i, header))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    pub checksum: u16,
}

pub(crate) fn parse_udp_header(i: &[u8]) -> IResult<&[u8], UdpHeader> {
    let (i, src_port) = be_u16(i)?;
    let (i, dst_port) = be_u16(i)?;
    let (i, length) = be_u16(i)?;
    let (i, checksum) = be_u16(i)?;
    let header = UdpHeader {
        src_port,
        dst_port,
        length,
        checksum,
    };
    Ok((i, header))
}

fn decode_tcp(data: &[u8], fields: &mut Vec<DecodedField>) {
    if data.len() < TCP_MIN_HEADER_LEN {
        fields.push(incomplete("TCP", data.len(), TCP_MIN_HEADER_LEN));
        return;
    }
    let tcp = match parse_tcp_header(data) {
        Ok((_, tcp)) => tcp,
        Err(_) => return,
    };
    let names = tcp_flag_names(tcp.offset_flags);
    let flags = if names.is_empty() {
        "None".to_owned()
    } else {
        names.join(", ")
    };
    fields.push(DecodedField::new("Source Port", tcp.src_port));
    fields.push(DecodedField::new("Destination Port", tcp.dst_port));
    fields.push(DecodedField::new("Sequence Number", tcp.seq));
    fields.push(DecodedField::new("Acknowledgment Number", tcp.ack));
    fields.push(DecodedField::new(
        "TCP Header Length",
        format!("{} bytes", tcp.header_len()),
    ));
    fields.push(DecodedField::described(
        "Flags",
        flags,
        hex_value(u32::from(tcp.flags()), 3),
    ));
    fields.push(DecodedField::new("Window Size", tcp.window));
    fields.push(DecodedField::new("Checksum", hex_value(u32::from(tcp.checksum), 4)));
    fields.push(DecodedField::new("Urgent Pointer", tcp.urgent_pointer));
}

fn decode_udp(data: &[u8], fields: &mut Vec<DecodedField>) {
    if data.len() < UDP_HEADER_LEN {
        fields.push(incomplete("UDP", data.len(), UDP_HEADER_LEN));
        return;
    }
    let udp = match parse_udp_header(data) {
        Ok((_, udp)) => udp,
        Err(_) => return,
    };
    fields.push(DecodedField::new("Source Port", udp.src_port));
    fields.push(DecodedField::new("Destination Port", udp.dst_port));
    fields.push(DecodedField::new("Length", udp.length));
    fields.push(DecodedField::new("Checksum", hex_value(u32::from(udp.checksum), 4)));
}

/// Decode the transport layer selected by the IPv4 protocol number
pub(crate) fn decode_transport(protocol: IpProtocol, data: &[u8], fields: &mut Vec<DecodedField>) {
    match protocol {
        IpProtocol::TCP => decode_tcp(data, fields),
        IpProtocol::UDP => decode_udp(data, fields),
        IpProtocol::ICMP => fields.push(DecodedField::new("ICMP", "Basic decoding only")),
        IpProtocol(n) => fields.push(DecodedField::new(
            "Transport",
            format!("Unrecognized protocol {}", n),
        )),
    }
}
