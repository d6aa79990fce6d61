//! Multi-criteria packet matching
//!
//! [`evaluate`] checks a packet against every criterion of a [`MatchCriteria`]
//! independently and reports one boolean per structured field, plus the offsets of every
//! payload occurrence. Combining the booleans (`AND`/`OR`) is left to the caller, which
//! receives the requested [`LogicMode`] along with the criteria.

use crate::capture::PacketRecord;
use crate::config::SearchConfig;
use crate::decode::summarize;
use ipnetwork::Ipv4Network;
use memchr::memmem;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// How the caller combines per-field results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicMode {
    #[default]
    And,
    Or,
}

/// Address criterion. With `is_cidr`, `address` is an IPv4 network such as
/// `10.0.0.0/8` (a bare address is treated as `/32`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpCriterion {
    pub address: String,
    #[serde(default)]
    pub is_cidr: bool,
}

impl IpCriterion {
    pub fn exact(address: impl Into<String>) -> Self {
        IpCriterion {
            address: address.into(),
            is_cidr: false,
        }
    }

    pub fn cidr(network: impl Into<String>) -> Self {
        IpCriterion {
            address: network.into(),
            is_cidr: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadCriterion {
    pub term: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl PayloadCriterion {
    pub fn new(term: impl Into<String>, case_sensitive: bool) -> Self {
        PayloadCriterion {
            term: term.into(),
            case_sensitive,
        }
    }

    /// Term searched with the configured default case sensitivity
    pub fn with_defaults(term: impl Into<String>, config: &SearchConfig) -> Self {
        Self::new(term, config.default_case_sensitive)
    }
}

/// A search query. Every field is optional; absent fields never match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchCriteria {
    pub source_ip: Option<IpCriterion>,
    pub destination_ip: Option<IpCriterion>,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    /// Application protocol label, compared case-sensitively
    pub protocol: Option<String>,
    pub payload: Option<PayloadCriterion>,
    pub logic: LogicMode,
}

/// A packet as seen by the matcher
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InspectedPacket {
    pub source_ip: Option<String>,
    pub destination_ip: Option<String>,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    pub protocol: String,
    pub data: Vec<u8>,
}

impl InspectedPacket {
    /// Build from a parsed record, resolving addresses and the protocol label from its headers
    pub fn from_record(record: &PacketRecord) -> Self {
        let summary = summarize(&record.data);
        InspectedPacket {
            source_ip: summary.source_ip.map(|ip| ip.to_string()),
            destination_ip: summary.destination_ip.map(|ip| ip.to_string()),
            source_port: summary.source_port,
            destination_port: summary.destination_port,
            protocol: summary.protocol,
            data: record.data.clone(),
        }
    }
}

/// Byte range of one payload occurrence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSpan {
    pub offset: usize,
    pub length: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub source_ip: bool,
    pub destination_ip: bool,
    pub source_port: bool,
    pub destination_port: bool,
    pub protocol: bool,
    pub payload_matches: Vec<PayloadSpan>,
}

impl MatchResult {
    pub fn payload_matched(&self) -> bool {
        !self.payload_matches.is_empty()
    }
}

fn parse_network(s: &str) -> Option<Ipv4Network> {
    let s = s.trim();
    if s.contains('/') {
        s.parse().ok()
    } else {
        let addr: Ipv4Addr = s.parse().ok()?;
        Ipv4Network::new(addr, 32).ok()
    }
}

/// Test an address criterion against the address recorded for the packet
pub fn ip_matches(recorded: Option<&str>, criterion: &IpCriterion) -> bool {
    let recorded = match recorded {
        Some(r) => r,
        None => return false,
    };
    if !criterion.is_cidr {
        return recorded == criterion.address;
    }
    let network = match parse_network(&criterion.address) {
        Some(n) => n,
        None => return false,
    };
    match recorded.trim().parse::<Ipv4Addr>() {
        Ok(addr) => network.contains(addr),
        Err(_) => false,
    }
}

/// All non-overlapping occurrences of `term` in `data`.
///
/// Case-insensitive search folds ASCII letters only, so offsets are byte offsets in `data`
/// and every span length is the byte length of `term`.
pub fn find_payload(data: &[u8], term: &str, case_sensitive: bool) -> Vec<PayloadSpan> {
    let needle = term.as_bytes();
    if needle.is_empty() {
        return Vec::new();
    }
    let span = |offset| PayloadSpan {
        offset,
        length: needle.len(),
    };
    if case_sensitive {
        memmem::find_iter(data, needle).map(span).collect()
    } else {
        let haystack = data.to_ascii_lowercase();
        let needle = needle.to_ascii_lowercase();
        memmem::find_iter(&haystack, &needle).map(span).collect()
    }
}

/// Evaluate `criteria` against `packet`. Absent criteria yield an all-false result.
pub fn evaluate(packet: &InspectedPacket, criteria: Option<&MatchCriteria>) -> MatchResult {
    let criteria = match criteria {
        Some(c) => c,
        None => return MatchResult::default(),
    };
    MatchResult {
        source_ip: criteria
            .source_ip
            .as_ref()
            .map_or(false, |c| ip_matches(packet.source_ip.as_deref(), c)),
        destination_ip: criteria
            .destination_ip
            .as_ref()
            .map_or(false, |c| ip_matches(packet.destination_ip.as_deref(), c)),
        source_port: criteria
            .source_port
            .map_or(false, |p| packet.source_port == Some(p)),
        destination_port: criteria
            .destination_port
            .map_or(false, |p| packet.destination_port == Some(p)),
        protocol: criteria
            .protocol
            .as_ref()
            .map_or(false, |p| *p == packet.protocol),
        payload_matches: criteria
            .payload
            .as_ref()
            .map(|p| find_payload(&packet.data, &p.term, p.case_sensitive))
            .unwrap_or_default(),
    }
}
