use hex_literal::hex;
use pcap_forensics::capture::*;
use pcap_forensics::error::{FormatError, TruncationWarning};
use pcap_forensics::Linktype;

// little-endian header, one record of 4 bytes: DE AD BE EF
static CAPTURE_LE: &[u8] = &hex!(
    "
D4 C3 B2 A1 02 00 04 00 00 00 00 00 00 00 00 00
FF FF 00 00 01 00 00 00
10 32 54 76 A0 86 01 00 04 00 00 00 04 00 00 00
DE AD BE EF"
);

// same capture, only 2 of the 4 announced payload bytes present
static CAPTURE_LE_TRUNCATED: &[u8] = &hex!(
    "
D4 C3 B2 A1 02 00 04 00 00 00 00 00 00 00 00 00
FF FF 00 00 01 00 00 00
10 32 54 76 A0 86 01 00 04 00 00 00 04 00 00 00
DE AD"
);

// big-endian header, two records
static CAPTURE_BE: &[u8] = &hex!(
    "
A1 B2 C3 D4 00 02 00 04 00 00 00 00 00 00 00 00
00 04 00 00 00 00 00 01
5F 00 00 01 00 00 00 2A 00 00 00 02 00 00 00 3C
01 02
5F 00 00 02 00 0F 42 3F 00 00 00 01 00 00 00 01
03"
);

#[test]
fn test_single_record_le() {
    let capture = parse_capture(CAPTURE_LE).expect("valid capture");
    assert!(!capture.header.big_endian);
    assert_eq!(capture.header.network, Linktype::ETHERNET);
    assert_eq!(capture.header.snaplen, 65535);
    assert!(!capture.is_truncated());
    assert_eq!(capture.packets.len(), 1);
    let packet = &capture.packets[0];
    assert_eq!(packet.ts_sec, 0x7654_3210);
    assert_eq!(packet.ts_usec, 100_000);
    assert_eq!(packet.caplen, 4);
    assert_eq!(packet.origlen, 4);
    assert_eq!(packet.data(), &[0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn test_truncated_payload_dropped() {
    let capture = parse_capture(CAPTURE_LE_TRUNCATED).expect("valid header");
    assert!(capture.packets.is_empty());
    assert_eq!(
        capture.truncation,
        Some(TruncationWarning {
            index: 0,
            offset: 24,
            needed: 4,
            available: 2,
        })
    );
}

#[test]
fn test_truncation_keeps_earlier_records() {
    // first BE record complete, second cut in its header
    let cut = &CAPTURE_BE[..24 + 18 + 10];
    let capture = parse_capture(cut).expect("valid header");
    assert_eq!(capture.packets.len(), 1);
    assert_eq!(capture.packets[0].data, vec![1, 2]);
    let warning = capture.truncation.expect("truncation");
    assert_eq!(warning.index, 1);
    assert_eq!(warning.offset, 42);
    assert_eq!(warning.needed, 16);
    assert_eq!(warning.available, 10);
}

#[test]
fn test_big_endian_records() {
    let capture = parse_capture(CAPTURE_BE).expect("valid capture");
    assert!(capture.header.big_endian);
    assert_eq!(capture.header.snaplen, 0x0004_0000);
    let fields: Vec<_> = capture
        .packets
        .iter()
        .map(|p| (p.ts_sec, p.ts_usec, p.caplen, p.origlen))
        .collect();
    assert_eq!(
        fields,
        vec![(0x5f00_0001, 42, 2, 60), (0x5f00_0002, 999_999, 1, 1)]
    );
}

#[test]
fn test_slice_iteration_is_borrowed() {
    let slice = CaptureSlice::from_slice(CAPTURE_BE).expect("valid capture");
    let data: Vec<&[u8]> = slice
        .map(|r| r.expect("complete record").data)
        .collect();
    assert_eq!(data, vec![&[1u8, 2][..], &[3u8][..]]);
}

#[test]
fn test_format_errors() {
    assert_eq!(
        parse_capture(&CAPTURE_LE[..10]).unwrap_err(),
        FormatError::HeaderTooShort { len: 10 }
    );
    let mut bad = CAPTURE_LE.to_vec();
    bad[..4].copy_from_slice(&[0x0a, 0x0d, 0x0d, 0x0a]);
    let err = parse_capture(&bad).unwrap_err();
    assert_eq!(
        err,
        FormatError::InvalidMagic {
            le: 0x0a0d_0d0a,
            be: 0x0a0d_0d0a,
        }
    );
    let mut bad = CAPTURE_LE.to_vec();
    bad[..4].copy_from_slice(&[0x01, 0x02, 0x03, 0x04]);
    let msg = parse_capture(&bad).unwrap_err().to_string();
    assert!(msg.contains("0x04030201"), "{}", msg);
    assert!(msg.contains("0x01020304"), "{}", msg);
}

#[test]
fn test_nanosecond_precision() {
    let mut buf = CAPTURE_LE.to_vec();
    buf[..4].copy_from_slice(&hex!("4D 3C B2 A1"));
    let capture = parse_capture(&buf).expect("valid capture");
    assert_eq!(capture.header.precision(), TimestampPrecision::Nano);
    let packet = &capture.packets[0];
    // raw field is kept as written
    assert_eq!(packet.ts_usec, 100_000);
    let ts = packet.timestamp(capture.header.precision());
    assert_eq!(ts.subsec_nanos(), 100_000);
    let ts = packet.timestamp(TimestampPrecision::Micro);
    assert_eq!(ts.subsec_nanos(), 100_000_000);
}

#[cfg(feature = "serialize")]
#[test]
fn test_round_trip_both_byte_orders() {
    use pcap_forensics::serialize::{capture_to_vec, ToVec};

    let mut records = vec![
        PacketRecord {
            ts_sec: 1_700_000_000,
            ts_usec: 123_456,
            data: vec![0xde, 0xad, 0xbe, 0xef],
            ..PacketRecord::default()
        },
        PacketRecord {
            ts_sec: 1_700_000_001,
            ts_usec: 999_999,
            origlen: 1500,
            data: vec![0u8; 60],
            ..PacketRecord::default()
        },
    ];
    for r in records.iter_mut() {
        r.fix();
    }
    for big_endian in [false, true] {
        let header = GlobalHeader {
            big_endian,
            ..GlobalHeader::new()
        };
        let buf = capture_to_vec(&header, &records).expect("serialize");
        let capture = parse_capture(&buf).expect("parse back");
        assert_eq!(capture.header, header);
        assert_eq!(capture.packets, records);
        assert!(capture.truncation.is_none());
    }
}
