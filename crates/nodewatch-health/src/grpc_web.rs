//! Minimal gRPC-Web framing for the version RPC.
//!
//! Frames are a 1-byte flag plus a 4-byte big-endian length, followed by
//! the protobuf message. The request is an empty message, so it is just
//! the header. The response carries a single string in field 1.

use bytes::Bytes;

/// Content type for both request and response.
pub const CONTENT_TYPE: &str = "application/grpc-web";

/// Length of the frame header (flag + length).
pub const FRAME_HEADER_LEN: usize = 5;

/// Protobuf tag for field 1, wire type 2 (length-delimited).
const VERSION_FIELD_TAG: u8 = 0x0A;

/// The request body: an empty message in a data frame.
pub fn empty_request() -> Bytes {
    Bytes::from_static(&[0u8; FRAME_HEADER_LEN])
}

/// Extract the version string from a response body.
///
/// Returns `None` when the body is too short, the first field is not
/// field 1, the length needs more than one varint byte, the string is
/// truncated, or it is empty.
pub fn decode_version(body: &[u8]) -> Option<String> {
    let message = body.get(FRAME_HEADER_LEN..)?;
    let (&tag, rest) = message.split_first()?;
    if tag != VERSION_FIELD_TAG {
        return None;
    }
    let (&len, rest) = rest.split_first()?;
    // Multi-byte varint lengths are not supported.
    if len & 0x80 != 0 {
        return None;
    }
    let bytes = rest.get(..len as usize)?;
    let version = String::from_utf8_lossy(bytes).into_owned();
    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}
