//! Bolt message framing for tokio_util.
//!
//! Each message is written as one or more chunks, every chunk prefixed with
//! its 2-byte big-endian length, and terminated by a zero-length chunk.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::BoltError;
use super::message::{BoltRequest, BoltResponse};
use super::packstream::{self, PackStreamValue};

/// Largest chunk payload.
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// End of message marker.
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Default cap on a single inbound message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Client-side codec: encodes requests, decodes responses.
#[derive(Debug)]
pub struct BoltCodec {
    max_message_size: usize,
    message: BytesMut,
}

impl BoltCodec {
    /// Codec with the default message size cap.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Codec with a custom message size cap.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message: BytesMut::with_capacity(4096),
        }
    }

    fn write_chunked(data: &[u8], dst: &mut BytesMut) {
        dst.reserve(data.len() + 2 * (data.len() / MAX_CHUNK_SIZE + 2));
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }
            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                if self.message.is_empty() {
                    // NOOP keep-alive chunk
                    continue;
                }
                let mut payload = self.message.split().freeze();
                let value = packstream::decode(&mut payload)?;
                return match value {
                    PackStreamValue::Structure(s) => BoltResponse::from_structure(s).map(Some),
                    other => Err(BoltError::protocol(format!(
                        "expected a message structure, got {:?}",
                        other
                    ))),
                };
            }

            if src.len() < 2 + chunk_size {
                src.reserve(2 + chunk_size - src.len());
                return Ok(None);
            }
            let size = self.message.len() + chunk_size;
            if size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.message.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl Encoder<BoltRequest> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::with_capacity(128);
        packstream::encode(&PackStreamValue::Structure(item.into_structure()), &mut body)?;
        Self::write_chunked(&body, dst);
        Ok(())
    }
}
