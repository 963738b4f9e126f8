//! Client convenience wrapper.
//!
//! A thin async client for the wire protocol: one TCP connection, one
//! in-flight request at a time. Commands are encoded, written, and
//! answered by exactly one response frame read from the same stream, so
//! request-response pairing holds by construction.

use crate::core::error::{FilamentError, FilamentResult};
use crate::proto::codec::{
    decode_get_response, decode_status_response, encode_command,
};
use crate::proto::{Command, DecodeResult, Status};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// A connection to a Filament node.
pub struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    /// Connect to a node.
    pub async fn connect(addr: &str) -> FilamentResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        })
    }

    /// Store `value` under `key` for `ttl_seconds`.
    pub async fn set(
        &mut self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        ttl_seconds: i32,
    ) -> FilamentResult<()> {
        let cmd = Command::Set {
            key: key.into(),
            value: value.into(),
            ttl_seconds,
        };
        self.stream.write_all(&encode_command(&cmd)).await?;

        match self.read_status().await? {
            Status::Ok => Ok(()),
            status => Err(status_error(status)),
        }
    }

    /// Fetch the value under `key`.
    pub async fn get(&mut self, key: impl Into<Bytes>) -> FilamentResult<Bytes> {
        let cmd = Command::Get { key: key.into() };
        self.stream.write_all(&encode_command(&cmd)).await?;

        let response = self
            .read_frame(|buf| decode_get_response(buf))
            .await?;
        match response.status {
            Status::Ok => Ok(response.value),
            status => Err(status_error(status)),
        }
    }

    /// Remove the entry under `key`.
    pub async fn delete(&mut self, key: impl Into<Bytes>) -> FilamentResult<()> {
        let cmd = Command::Delete { key: key.into() };
        self.stream.write_all(&encode_command(&cmd)).await?;

        match self.read_status().await? {
            Status::Ok => Ok(()),
            status => Err(status_error(status)),
        }
    }

    /// Register this connection as a replication follower. JOIN has no
    /// response frame; after this call the stream carries the leader's
    /// propagated mutations.
    pub async fn join(&mut self) -> FilamentResult<()> {
        self.stream.write_all(&encode_command(&Command::Join)).await?;
        Ok(())
    }

    async fn read_status(&mut self) -> FilamentResult<Status> {
        self.read_frame(|buf| decode_status_response(buf)).await
    }

    /// Read bytes until `decode` yields one complete frame.
    async fn read_frame<T>(
        &mut self,
        decode: impl Fn(&mut BytesMut) -> DecodeResult<T>,
    ) -> FilamentResult<T> {
        loop {
            match decode(&mut self.buffer) {
                DecodeResult::Complete(frame) => return Ok(frame),
                DecodeResult::Incomplete => {}
                DecodeResult::Invalid(reason) => {
                    return Err(FilamentError::invalid_frame(reason))
                }
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(FilamentError::ConnectionClosed);
            }
        }
    }
}

/// Map a non-OK response status to the client-side error.
fn status_error(status: Status) -> FilamentError {
    match status {
        Status::KeyNotFound => FilamentError::KeyNotFound,
        Status::NotLeader => FilamentError::NotLeader,
        Status::Error => FilamentError::ServerError,
        status => FilamentError::UnexpectedStatus { status },
    }
}
