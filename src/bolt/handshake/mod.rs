//! Bolt protocol handshake.
//!
//! The client sends the magic preamble followed by four version proposals,
//! each laid out as `[0x00, range, minor, major]`; `range` lets one proposal
//! cover `minor, minor-1, ..., minor-range`. The server answers with the
//! chosen version as `[0x00, 0x00, minor, major]`, or all zeroes.

mod version;

pub use version::{AuthStyle, BoltVersion, PullStyle, RouteStyle};

use super::error::{BoltError, BoltResult};

/// Bolt protocol magic number.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the client preamble (magic + 4 proposals).
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of the server answer.
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// Version proposals, newest first: 5.4–5.0, 4.4–4.0, 3.0, none.
pub const VERSION_PROPOSALS: [[u8; 4]; 4] = [
    [0x00, 0x04, 0x04, 0x05],
    [0x00, 0x04, 0x04, 0x04],
    [0x00, 0x00, 0x00, 0x03],
    [0x00, 0x00, 0x00, 0x00],
];

/// Client preamble.
pub fn handshake_request() -> [u8; HANDSHAKE_SIZE] {
    let mut buf = [0u8; HANDSHAKE_SIZE];
    buf[..4].copy_from_slice(&BOLT_MAGIC);
    for (i, proposal) in VERSION_PROPOSALS.iter().enumerate() {
        let offset = 4 + i * 4;
        buf[offset..offset + 4].copy_from_slice(proposal);
    }
    buf
}

/// Interpret the server's answer.
pub fn parse_handshake_response(response: [u8; HANDSHAKE_RESPONSE_SIZE]) -> BoltResult<BoltVersion> {
    if response == [0, 0, 0, 0] {
        return Err(BoltError::handshake(
            "server does not support any proposed Bolt version",
        ));
    }
    // HTTP servers answer with "HTTP"
    if &response == b"HTTP" {
        return Err(BoltError::handshake(
            "server answered with HTTP; check the port points at a Bolt listener",
        ));
    }

    let (minor, major) = (response[2], response[3]);
    BoltVersion::from_parts(major, minor).ok_or_else(|| {
        BoltError::handshake(format!("server chose unsupported version {}.{}", major, minor))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        let buf = handshake_request();
        assert_eq!(&buf[0..4], &BOLT_MAGIC);
        // 5.4 with range 4
        assert_eq!(&buf[4..8], &[0x00, 0x04, 0x04, 0x05]);
        // 4.4 with range 4
        assert_eq!(&buf[8..12], &[0x00, 0x04, 0x04, 0x04]);
        assert_eq!(&buf[12..16], &[0x00, 0x00, 0x00, 0x03]);
        assert_eq!(&buf[16..20], &[0x00; 4]);
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_handshake_response([0, 0, 2, 5]).unwrap(), BoltVersion::V5_2);
        assert_eq!(parse_handshake_response([0, 0, 3, 4]).unwrap(), BoltVersion::V4_3);
        assert_eq!(parse_handshake_response([0, 0, 0, 3]).unwrap(), BoltVersion::V3);
    }

    #[test]
    fn test_parse_response_rejections() {
        assert!(matches!(
            parse_handshake_response([0, 0, 0, 0]),
            Err(BoltError::Handshake(_))
        ));
        assert!(matches!(
            parse_handshake_response(*b"HTTP"),
            Err(BoltError::Handshake(_))
        ));
        assert!(matches!(
            parse_handshake_response([0, 0, 9, 5]),
            Err(BoltError::Handshake(_))
        ));
    }
}
