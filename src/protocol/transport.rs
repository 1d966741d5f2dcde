//! Framing over a TCP stream: a length-prefixed header followed by a
//! payload, read in a loop that tolerates partial reads.
//!
//! Same read-until-full-packet loop over a partial `BytesMut` buffer
//! found in most framed-protocol clients, with a plain
//! `(opcode: u16, payload_len: u32)` frame header.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::constants::Opcode;

const FRAME_HEADER_LEN: usize = 2 + 4;

/// One framed message: an opcode and its payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub opcode: u16,
    pub payload: Bytes,
}

/// A length-prefixed framing layer over `tokio::net::TcpStream`.
pub struct PacketStream {
    socket: TcpStream,
    read_buf: BytesMut,
}

impl PacketStream {
    pub fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        Ok(Self::new(socket))
    }

    pub async fn write_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        header[0..2].copy_from_slice(&(opcode as u16).to_be_bytes());
        header[2..6].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        self.socket.write_all(&header).await?;
        if !payload.is_empty() {
            self.socket.write_all(payload).await?;
        }
        self.socket.flush().await?;
        Ok(())
    }

    /// Read one full frame, looping over partial reads until the declared
    /// payload length is satisfied.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        while self.read_buf.len() < FRAME_HEADER_LEN {
            self.fill_buf().await?;
        }
        let opcode = u16::from_be_bytes(self.read_buf[0..2].try_into().unwrap());
        let payload_len = u32::from_be_bytes(self.read_buf[2..6].try_into().unwrap()) as usize;
        while self.read_buf.len() < FRAME_HEADER_LEN + payload_len {
            self.fill_buf().await?;
        }
        self.read_buf.advance(FRAME_HEADER_LEN);
        let payload = self.read_buf.split_to(payload_len).freeze();
        Ok(Frame { opcode, payload })
    }

    /// Read raw bytes directly off the socket, bypassing framing — used by
    /// the backup driver's long-lived per-volume stream (§4.8 step 4).
    pub async fn read_exact_raw(&mut self, n: usize) -> Result<Bytes> {
        while self.read_buf.len() < n {
            self.fill_buf().await?;
        }
        Ok(self.read_buf.split_to(n).freeze())
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.socket.write_all(bytes).await?;
        self.socket.flush().await?;
        Ok(())
    }

    async fn fill_buf(&mut self) -> Result<()> {
        let mut chunk = [0u8; 4096];
        let n = self.socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        self.read_buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}
