//! Addressing summary of a frame, used to build matcher inputs.

use crate::decode::ethernet::{parse_ethernet_header, EtherType, ETHERNET_HEADER_LEN};
use crate::decode::ipv4::{parse_ipv4_header, IpProtocol, IPV4_MIN_HEADER_LEN};
use crate::decode::transport::{parse_tcp_header, parse_udp_header, TCP_MIN_HEADER_LEN, UDP_HEADER_LEN};
use serde::Serialize;
use std::net::Ipv4Addr;

/// Addresses, ports and protocol label of one Ethernet frame
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PacketSummary {
    pub source_ip: Option<Ipv4Addr>,
    pub destination_ip: Option<Ipv4Addr>,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    /// Highest-level protocol recognized, e.g. `HTTP`, `DNS`, `TCP`, `ARP`
    pub protocol: String,
}

/// Application protocol conventionally served on `port`
pub fn well_known_service(port: u16) -> Option<&'static str> {
    let name = match port {
        20 | 21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 | 587 => "SMTP",
        53 => "DNS",
        67 | 68 => "DHCP",
        80 | 8080 => "HTTP",
        110 => "POP3",
        123 => "NTP",
        143 => "IMAP",
        161 | 162 => "SNMP",
        443 => "HTTPS",
        445 => "SMB",
        3389 => "RDP",
        _ => return None,
    };
    Some(name)
}

/// Service label for a port pair, checking the lower port first
fn service_label(src: u16, dst: u16) -> Option<&'static str> {
    let (low, high) = if src <= dst { (src, dst) } else { (dst, src) };
    well_known_service(low).or_else(|| well_known_service(high))
}

/// Summarize an Ethernet frame. Never fails: missing layers leave fields empty
/// and the label at the deepest layer recognized.
pub fn summarize(data: &[u8]) -> PacketSummary {
    let mut summary = PacketSummary {
        protocol: "Unknown".to_owned(),
        ..PacketSummary::default()
    };
    if data.len() < ETHERNET_HEADER_LEN {
        return summary;
    }
    let (rem, eth) = match parse_ethernet_header(data) {
        Ok(r) => r,
        Err(_) => return summary,
    };
    match eth.ethertype {
        EtherType::IPV4 => summary.protocol = "IPv4".to_owned(),
        EtherType::ARP => {
            summary.protocol = "ARP".to_owned();
            return summary;
        }
        EtherType::IPV6 => {
            summary.protocol = "IPv6".to_owned();
            return summary;
        }
        _ => return summary,
    }
    if rem.len() < IPV4_MIN_HEADER_LEN {
        return summary;
    }
    let ip = match parse_ipv4_header(rem) {
        Ok((_, ip)) if ip.version == 4 && ip.header_len() >= IPV4_MIN_HEADER_LEN => ip,
        _ => return summary,
    };
    summary.source_ip = Some(ip.source);
    summary.destination_ip = Some(ip.destination);
    let transport = rem.get(ip.header_len()..).unwrap_or(&[]);
    let ports = match ip.protocol {
        IpProtocol::TCP if transport.len() >= TCP_MIN_HEADER_LEN => {
            summary.protocol = "TCP".to_owned();
            parse_tcp_header(transport)
                .ok()
                .map(|(_, tcp)| (tcp.src_port, tcp.dst_port))
        }
        IpProtocol::UDP if transport.len() >= UDP_HEADER_LEN => {
            summary.protocol = "UDP".to_owned();
            parse_udp_header(transport)
                .ok()
                .map(|(_, udp)| (udp.src_port, udp.dst_port))
        }
        IpProtocol::ICMP => {
            summary.protocol = "ICMP".to_owned();
            None
        }
        _ => None,
    };
    if let Some((src, dst)) = ports {
        summary.source_port = Some(src);
        summary.destination_port = Some(dst);
        if let Some(service) = service_label(src, dst) {
            summary.protocol = service.to_owned();
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_label_prefers_low_port() {
        assert_eq!(service_label(51234, 80), Some("HTTP"));
        assert_eq!(service_label(53, 51234), Some("DNS"));
        assert_eq!(service_label(40000, 50000), None);
        // both well-known: lower port wins
        assert_eq!(service_label(443, 22), Some("SSH"));
    }

    #[test]
    fn test_summarize_short_frame() {
        let s = summarize(&[0u8; 10]);
        assert_eq!(s.protocol, "Unknown");
        assert!(s.source_ip.is_none());
    }
}
