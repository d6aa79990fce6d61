//! # Capture analysis toolkit
//!
//! This crate contains the building blocks of a packet forensics pipeline:
//!
//! - [`capture`]: a zero-copy parser for classic capture files (little or big-endian,
//!   microsecond or nanosecond timestamps), tolerant of truncated trailing records
//! - [`decode`]: Ethernet, IPv4, TCP, UDP and ICMP header decoding into display fields
//! - [`matcher`]: address, CIDR, port, protocol and payload criteria evaluation
//! - [`scan`]: a signature scanning engine running rules in an isolated execution unit,
//!   driven through async, id-correlated requests
//!
//! Parsing, decoding and matching are pure functions over their input and may be called
//! concurrently. Only the scan engine owns threads.
//!
//! # Example
//!
//! ```rust
//! use pcap_forensics::capture::parse_capture;
//! use pcap_forensics::decode::decode;
//!
//! # let buffer: Vec<u8> = vec![
//! #     0xd4, 0xc3, 0xb2, 0xa1, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0, 0, 1, 0, 0, 0,
//! #     1, 0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0, 4, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef,
//! # ];
//! let capture = parse_capture(&buffer).expect("not a capture file");
//! for packet in &capture.packets {
//!     for field in decode(packet.data()) {
//!         println!("{}", field);
//!     }
//! }
//! if let Some(warning) = &capture.truncation {
//!     println!("{}", warning);
//! }
//! ```

pub mod capture;
pub mod config;
pub mod decode;
mod endianness;
pub mod error;
pub mod matcher;
pub mod scan;
#[cfg(feature = "serialize")]
pub mod serialize;

pub use capture::{parse_capture, Capture, CaptureSlice, GlobalHeader, Linktype, PacketRecord};
pub use config::Config;
pub use decode::{decode, DecodedField};
pub use error::{ConfigError, FormatError, RuleError, ScanError, TruncationWarning};
pub use matcher::{evaluate, MatchCriteria, MatchResult};
pub use scan::ScanEngine;
