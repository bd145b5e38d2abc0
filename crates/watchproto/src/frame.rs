//! Length-prefixed framing over blocking streams.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+---------------------------+
//! | length: u32 (BE)     | body: `length` bytes JSON |
//! +----------------------+---------------------------+
//! ```
//!
//! `read_frame` only ever returns whole frames; a stream that ends inside a
//! frame is a transport error, never a short body. The async codec in
//! [`crate::channel`] uses the identical layout.

use std::io::{ErrorKind, Read, Write};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::ChannelError;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Serialize an envelope to its JSON frame body.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ChannelError> {
    serde_json::to_vec(msg).map_err(ChannelError::Encode)
}

/// Deserialize a JSON frame body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ChannelError> {
    serde_json::from_slice(body).map_err(ChannelError::Decode)
}

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<(), ChannelError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(ChannelError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one complete frame body.
///
/// Returns [`ChannelError::Closed`] when the stream ends before a new frame
/// starts.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, ChannelError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(ChannelError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ChannelError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Encode and write one envelope.
pub fn send_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), ChannelError> {
    let body = encode(msg)?;
    write_frame(writer, &body)
}

/// Read and decode one envelope.
pub fn recv_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, ChannelError> {
    let body = read_frame(reader)?;
    decode(&body)
}
