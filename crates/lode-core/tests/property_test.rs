//! Property-based tests for the LSN codec and wal2json decoder.
//!
//! Uses proptest to generate random inputs and verify invariants hold
//! across the full 64-bit LSN range.

use lode_core::{decode, format_lsn, parse_lsn};
use proptest::prelude::*;

proptest! {
    /// Property: parse is the inverse of format for every u64.
    #[test]
    fn lsn_roundtrip(lsn in any::<u64>()) {
        let formatted = format_lsn(lsn);
        let parsed = parse_lsn(&formatted).unwrap();
        prop_assert_eq!(lsn, parsed);
    }

    /// Property: the textual form is always two hex halves joined by '/'.
    #[test]
    fn lsn_format_shape(lsn in any::<u64>()) {
        let formatted = format_lsn(lsn);
        let parts: Vec<&str> = formatted.split('/').collect();
        prop_assert_eq!(parts.len(), 2);
        prop_assert!(u32::from_str_radix(parts[0], 16).is_ok());
        prop_assert!(u32::from_str_radix(parts[1], 16).is_ok());
    }

    /// Property: the decoder never panics, whatever bytes arrive.
    #[test]
    fn decode_never_panics(payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode(&payload);
    }

    /// Property: a decoded nextlsn round-trips through the LSN codec.
    #[test]
    fn decoded_next_lsn_roundtrips(lsn in any::<u64>()) {
        let payload = format!(
            r#"{{"nextlsn":"{}","timestamp":"2020-03-01 12:02:47.530709+00","change":[]}}"#,
            format_lsn(lsn)
        );
        let record = decode(payload.as_bytes()).unwrap();
        prop_assert_eq!(parse_lsn(&record.next_lsn).unwrap(), lsn);
    }
}
