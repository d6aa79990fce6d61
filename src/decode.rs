//! Layered protocol header decoding
//!
//! [`decode`] turns the raw bytes of one Ethernet frame into an ordered list of
//! [`DecodedField`]s: link layer, then IPv4, then TCP/UDP/ICMP. Decoding never fails.
//! When a layer is missing, truncated or unsupported, a descriptive field is emitted
//! in place of the layer and decoding stops there.
//!
//! ```rust
//! use pcap_forensics::decode::decode;
//!
//! let fields = decode(&[]);
//! assert_eq!(fields.len(), 1);
//! ```

mod ethernet;
mod field;
mod ipv4;
mod summary;
mod transport;

pub use ethernet::{format_mac, EtherType, ETHERNET_HEADER_LEN};
pub use field::{DecodedField, FieldValue};
pub use ipv4::{IpProtocol, IPV4_MIN_HEADER_LEN};
pub use summary::{summarize, well_known_service, PacketSummary};
pub use transport::{tcp_flag_names, TCP_MIN_HEADER_LEN, UDP_HEADER_LEN};

use ethernet::decode_ethernet;
use ipv4::decode_ipv4;
use transport::decode_transport;

/// Decode the headers of one Ethernet frame
pub fn decode(data: &[u8]) -> Vec<DecodedField> {
    let mut fields = Vec::new();
    if data.is_empty() {
        fields.push(DecodedField::new("Error", "No packet data"));
        return fields;
    }
    let (ethertype, rem) = match decode_ethernet(data, &mut fields) {
        Some(r) => r,
        None => return fields,
    };
    if ethertype != EtherType::IPV4 {
        return fields;
    }
    if let Some((protocol, transport)) = decode_ipv4(rem, &mut fields) {
        decode_transport(protocol, transport, &mut fields);
    }
    fields
}
