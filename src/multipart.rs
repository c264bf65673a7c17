//! MJPEG multipart framing
//!
//! Each frame becomes one part of a `multipart/x-mixed-replace` response:
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <payload>\r\n
//! \r\n
//! ```
//! The payload is copied verbatim. It is expected to already be JPEG, but
//! nothing here checks that.

use bytes::{BufMut, Bytes, BytesMut};

use crate::shm::FrameSnapshot;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Response content type for the stream
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TAIL: &[u8] = b"\r\n\r\n";

/// Wrap a payload into one multipart segment
pub fn encode(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEAD.len() + payload.len() + PART_TAIL.len());
    buf.put_slice(PART_HEAD);
    buf.put_slice(payload);
    buf.put_slice(PART_TAIL);
    buf.freeze()
}

/// Stateless encoder for frame snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartEncoder;

impl MultipartEncoder {
    pub fn encode_snapshot(&self, snapshot: &FrameSnapshot) -> Bytes {
        encode(snapshot.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_literal() {
        let part = encode(b"ABCDEF");
        assert_eq!(
            &part[..],
            &b"--frame\r\nContent-Type: image/jpeg\r\n\r\nABCDEF\r\n\r\n"[..]
        );
    }

    #[test]
    fn test_encode_is_deterministic() {
        let payload = [0xFFu8, 0xD8, 0x00, 0x0D, 0x0A, 0xFF, 0xD9];
        assert_eq!(encode(&payload), encode(&payload));
    }

    #[test]
    fn test_encode_empty_payload() {
        let part = encode(b"");
        assert_eq!(
            &part[..],
            &b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\r\n\r\n"[..]
        );
    }

    #[test]
    fn test_boundary_matches_content_type() {
        assert!(CONTENT_TYPE.ends_with(&format!("boundary={}", BOUNDARY)));
        assert!(PART_HEAD.starts_with(format!("--{}\r\n", BOUNDARY).as_bytes()));
    }
}
