//! Frame-level wire encoding.
//!
//! Mirrors a ZeroMQ `DEALER` multipart exchange: an empty delimiter
//! frame, then a sequence of typed frames, each a self-delimited unit.
//! This crate has no ZeroMQ binding in its dependency stack, so each
//! frame is encoded directly over a `tokio::net::TcpStream` as a `u32`
//! little-endian length prefix followed by that many bytes — the same
//! "self-delimited unit" property a ZeroMQ frame gives for free.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CoreError, Result};

pub(super) async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> Result<()> {
    w.write_u32_le(payload.len() as u32).await?;
    w.write_all(payload).await?;
    Ok(())
}

pub(super) async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u32_le().await?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

pub(super) async fn write_i32<W: AsyncWrite + Unpin>(w: &mut W, value: i32) -> Result<()> {
    write_frame(w, &value.to_le_bytes()).await
}

pub(super) async fn read_i32<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32> {
    let frame = read_frame(r).await?;
    decode_i32(&frame)
}

pub(super) async fn write_i64<W: AsyncWrite + Unpin>(w: &mut W, value: i64) -> Result<()> {
    write_frame(w, &value.to_le_bytes()).await
}

pub(super) async fn read_i64<R: AsyncRead + Unpin>(r: &mut R) -> Result<i64> {
    let frame = read_frame(r).await?;
    decode_i64(&frame)
}

fn decode_i32(frame: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = frame
        .try_into()
        .map_err(|_| CoreError::TransportFailure(format!("expected 4-byte frame, got {}", frame.len())))?;
    Ok(i32::from_le_bytes(bytes))
}

fn decode_i64(frame: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = frame
        .try_into()
        .map_err(|_| CoreError::TransportFailure(format!("expected 8-byte frame, got {}", frame.len())))?;
    Ok(i64::from_le_bytes(bytes))
}

/// Decode a byte frame of packed little-endian `i64`s (the `input_header`
/// frame) into a fresh `Vec<i64>`. Unlike the session's two growable
/// socket-read buffers, this allocation is small and transient, not
/// subject to the never-shrink buffer-reuse rule.
pub(super) fn decode_i64_seq(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(8)
        .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// Message types on the outer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MessageType {
    Heartbeat = 0,
    ContainerContent = 1,
    NewContainer = 2,
}

impl MessageType {
    pub(super) fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::Heartbeat),
            1 => Some(Self::ContainerContent),
            2 => Some(Self::NewContainer),
            _ => None,
        }
    }

    pub(super) fn tag(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HeartbeatType {
    KeepAlive = 0,
    RequestContainerMetadata = 1,
}

impl HeartbeatType {
    pub(super) fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::KeepAlive),
            1 => Some(Self::RequestContainerMetadata),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RequestType {
    PredictRequest = 0,
    FeedbackRequest = 1,
}

impl RequestType {
    pub(super) fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::PredictRequest),
            1 => Some(Self::FeedbackRequest),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frame_round_trips_through_a_duplex_stream() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        let got = read_frame(&mut b).await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn i32_round_trips() {
        let (mut a, mut b) = duplex(1024);
        write_i32(&mut a, -7).await.unwrap();
        assert_eq!(read_i32(&mut b).await.unwrap(), -7);
    }

    #[test]
    fn decodes_packed_i64_sequence() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i64.to_le_bytes());
        bytes.extend_from_slice(&(-5i64).to_le_bytes());
        assert_eq!(decode_i64_seq(&bytes), vec![2, -5]);
    }

    #[test]
    fn message_type_round_trips_through_tag() {
        for ty in [MessageType::Heartbeat, MessageType::ContainerContent, MessageType::NewContainer] {
            assert_eq!(MessageType::from_tag(ty.tag()), Some(ty));
        }
    }
}
