//! Async framed channel for the executor side.
//!
//! Reading suspends on stream readiness through the tokio reactor, so a
//! pending `receive` never monopolizes a thread and other tasks on the same
//! event loop keep running. Writers share one framed sink behind an async
//! mutex, which keeps concurrent sends from interleaving frames.

use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::trace;

use crate::error::ChannelError;
use crate::frame::{self, LENGTH_PREFIX_LEN, MAX_FRAME_LEN};

/// Codec matching the blocking framing in [`crate::frame`].
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_PREFIX_LEN)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Receiving half of a channel.
pub struct ChannelReader<R> {
    frames: FramedRead<R, LengthDelimitedCodec>,
}

impl<R: AsyncRead + Unpin> ChannelReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            frames: FramedRead::new(reader, codec()),
        }
    }

    /// Wait for the next complete envelope and decode it.
    ///
    /// A [`ChannelError::Decode`] consumes the offending frame; the next call
    /// continues with the following one.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T, ChannelError> {
        match self.frames.next().await {
            Some(Ok(body)) => {
                trace!("received frame of {} bytes", body.len());
                frame::decode(&body)
            }
            Some(Err(e)) => Err(ChannelError::Transport(e)),
            None => Err(ChannelError::Closed),
        }
    }
}

/// Sending half of a channel. Cheap to clone.
pub struct ChannelSender<W> {
    sink: Arc<Mutex<FramedWrite<W, LengthDelimitedCodec>>>,
}

impl<W> Clone for ChannelSender<W> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<W: AsyncWrite + Unpin> ChannelSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(FramedWrite::new(writer, codec()))),
        }
    }

    /// Serialize and write one envelope as a single frame.
    pub async fn send<T: Serialize>(&self, msg: &T) -> Result<(), ChannelError> {
        let body = frame::encode(msg)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(ChannelError::FrameTooLarge {
                len: body.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let mut sink = self.sink.lock().await;
        sink.send(Bytes::from(body)).await?;
        Ok(())
    }

    /// Flush and shut down the write side.
    pub async fn close(&self) -> Result<(), ChannelError> {
        let mut sink = self.sink.lock().await;
        SinkExt::<Bytes>::close(&mut *sink).await?;
        Ok(())
    }
}

/// Split a duplex stream into reader and sender halves.
pub fn split_channel<S>(stream: S) -> (ChannelReader<ReadHalf<S>>, ChannelSender<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (ChannelReader::new(read), ChannelSender::new(write))
}
