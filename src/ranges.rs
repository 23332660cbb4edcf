//! Range-encoded integer sets.
//!
//! A set of ids is encoded as a minimal comma-separated list of singletons
//! and closed ranges, sorted ascending: `{1,2,3,5,6,9}` becomes `"1-3,5-6,9"`.
//! The server and client exchange id sets in this form so that neither side
//! has to resend unchanged payloads during a resync.

use crate::error::{Result, StreamError};

/// Encode a sorted sequence of ids into range form.
///
/// The input must be sorted ascending and free of duplicates; `KeyCache`
/// guarantees this by storing ids in a `BTreeSet`. An empty input encodes
/// to the empty string.
pub fn encode(ids: impl IntoIterator<Item = i64>) -> String {
    let mut ids = ids.into_iter();
    let Some(first) = ids.next() else {
        return String::new();
    };

    let mut out: Vec<String> = Vec::new();
    let mut start = first;
    let mut end = first;

    fn emit(start: i64, end: i64, out: &mut Vec<String>) {
        if start == end {
            out.push(start.to_string());
        } else {
            out.push(format!("{start}-{end}"));
        }
    }

    for id in ids {
        if id == end + 1 {
            // continue the current range
            end = id;
            continue;
        }
        emit(start, end, &mut out);
        start = id;
        end = id;
    }
    emit(start, end, &mut out);

    out.join(",")
}

/// Decode a range-encoded string back into explicit ids.
///
/// The empty string decodes to an empty vec. Malformed input is a protocol
/// violation: the encoding only ever comes from the peer.
pub fn decode(encoded: &str) -> Result<Vec<i64>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for part in encoded.split(',') {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_id(lo, encoded)?;
                let hi = parse_id(hi, encoded)?;
                if hi < lo {
                    return Err(StreamError::Protocol(format!(
                        "invalid range encoding: {encoded:?}"
                    )));
                }
                ids.extend(lo..=hi);
            }
            None => ids.push(parse_id(part, encoded)?),
        }
    }
    Ok(ids)
}

fn parse_id(s: &str, encoded: &str) -> Result<i64> {
    s.parse().map_err(|_| {
        StreamError::Protocol(format!("invalid range encoding: {encoded:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode([]), "");
    }

    #[test]
    fn test_encode_singletons_and_ranges() {
        assert_eq!(encode([1, 2, 3, 5, 6, 9]), "1-3,5-6,9");
        assert_eq!(encode([5]), "5");
        assert_eq!(encode([5, 6]), "5-6");
        assert_eq!(encode([1, 3, 5]), "1,3,5");
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode("").unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_decode_mixed() {
        assert_eq!(decode("1-3,5-6,9").unwrap(), vec![1, 2, 3, 5, 6, 9]);
        assert_eq!(decode("7").unwrap(), vec![7]);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode("1-").is_err());
        assert!(decode("a,b").is_err());
        assert!(decode("5-3").is_err());
        assert!(decode("1,,3").is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_roundtrip(ids in proptest::collection::btree_set(0i64..10_000, 0..200)) {
            let encoded = encode(ids.iter().copied());
            let decoded: BTreeSet<i64> = decode(&encoded).unwrap().into_iter().collect();
            prop_assert_eq!(decoded, ids);
        }
    }
}
