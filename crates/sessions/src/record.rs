//! Framed record codec for the file-backed session log.
//!
//! Wire format, one record per line:
//!
//! ```text
//! len (4 bytes, big-endian) | payload (len bytes) | crc32(payload) (4 bytes, big-endian) | '\n'
//! ```
//!
//! A scan stops at the first length/checksum mismatch and reports the byte
//! offset of the last valid record boundary, so a partially written tail
//! (crash mid-append) can be truncated away on recovery.

use talon_core::{Error, Result};

/// Hard cap on a single record payload. A length field above this is
/// treated as corruption rather than an allocation request.
const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// Encode one payload into its framed representation.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_RECORD_LEN as usize {
        return Err(Error::StorageUnavailable(format!(
            "record payload of {} bytes exceeds the {} byte cap",
            payload.len(),
            MAX_RECORD_LEN
        )));
    }
    let mut out = Vec::with_capacity(payload.len() + 9);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc32fast::hash(payload).to_be_bytes());
    out.push(b'\n');
    Ok(out)
}

/// Result of scanning a log buffer.
pub struct Scan {
    /// Decoded payloads, in append order.
    pub payloads: Vec<Vec<u8>>,
    /// Byte offset of the last valid record boundary.
    pub valid_len: u64,
    /// Whether trailing bytes past `valid_len` were found and ignored.
    pub truncated: bool,
}

/// Scan a buffer of framed records, stopping at the first invalid frame.
pub fn scan(buf: &[u8]) -> Scan {
    let mut payloads = Vec::new();
    let mut offset = 0usize;

    loop {
        let rest = &buf[offset..];
        if rest.is_empty() {
            return Scan {
                payloads,
                valid_len: offset as u64,
                truncated: false,
            };
        }
        if rest.len() < 4 {
            break;
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        if len > MAX_RECORD_LEN {
            break;
        }
        let frame_len = 4 + len as usize + 4 + 1;
        if rest.len() < frame_len {
            break;
        }
        let payload = &rest[4..4 + len as usize];
        let crc_bytes = &rest[4 + len as usize..4 + len as usize + 4];
        let expected = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(payload) != expected {
            break;
        }
        if rest[frame_len - 1] != b'\n' {
            break;
        }
        payloads.push(payload.to_vec());
        offset += frame_len;
    }

    Scan {
        payloads,
        valid_len: offset as u64,
        truncated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_record() {
        let framed = encode(b"hello").unwrap();
        let scan = scan(&framed);
        assert_eq!(scan.payloads, vec![b"hello".to_vec()]);
        assert_eq!(scan.valid_len, framed.len() as u64);
        assert!(!scan.truncated);
    }

    #[test]
    fn roundtrip_multiple_records() {
        let mut buf = Vec::new();
        for payload in [&b"one"[..], b"two", b"three"] {
            buf.extend_from_slice(&encode(payload).unwrap());
        }
        let scan = scan(&buf);
        assert_eq!(scan.payloads.len(), 3);
        assert!(!scan.truncated);
    }

    #[test]
    fn partial_tail_is_detected() {
        let mut buf = encode(b"complete").unwrap();
        let boundary = buf.len() as u64;
        let partial = encode(b"interrupted").unwrap();
        buf.extend_from_slice(&partial[..partial.len() / 2]);

        let scan = scan(&buf);
        assert_eq!(scan.payloads, vec![b"complete".to_vec()]);
        assert_eq!(scan.valid_len, boundary);
        assert!(scan.truncated);
    }

    #[test]
    fn corrupted_checksum_stops_scan() {
        let mut buf = encode(b"good").unwrap();
        let boundary = buf.len() as u64;
        let mut bad = encode(b"flipped").unwrap();
        bad[6] ^= 0xff; // flip a payload byte, CRC no longer matches
        buf.extend_from_slice(&bad);
        buf.extend_from_slice(&encode(b"after").unwrap());

        let scan = scan(&buf);
        assert_eq!(scan.payloads, vec![b"good".to_vec()]);
        assert_eq!(scan.valid_len, boundary);
        assert!(scan.truncated);
    }

    #[test]
    fn absurd_length_field_is_corruption() {
        let mut buf = encode(b"fine").unwrap();
        let boundary = buf.len() as u64;
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        buf.extend_from_slice(b"junk");

        let scan = scan(&buf);
        assert_eq!(scan.valid_len, boundary);
        assert!(scan.truncated);
    }

    #[test]
    fn empty_buffer_is_clean() {
        let scan = scan(&[]);
        assert!(scan.payloads.is_empty());
        assert_eq!(scan.valid_len, 0);
        assert!(!scan.truncated);
    }
}
