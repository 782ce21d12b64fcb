//! Inbound requests and outbound items.
//!
//! A [`Request`] is one reassembled message plus a strong reference to the
//! connection it arrived on; dropping it frees the buffer and releases that
//! reference. An [`Outbound`] is a pre-encoded message waiting in a
//! connection's send queue, with a cursor for partial writes. Outbound items
//! hold no connection reference: they live inside the connection's own queue.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use nodeio_core::{CommandHeader, NetError, Result, HEADER_SIZE};

use crate::framing::Frame;
use crate::state::NetState;

pub struct Request {
    conn: Arc<NetState>,
    header: CommandHeader,
    buf: Vec<u8>,
}

impl Request {
    pub(crate) fn new(conn: Arc<NetState>, frame: Frame) -> Self {
        Self {
            conn,
            header: frame.header,
            buf: frame.buf,
        }
    }

    pub fn conn(&self) -> &Arc<NetState> {
        &self.conn
    }

    /// Host-order header.
    pub fn header(&self) -> &CommandHeader {
        &self.header
    }

    /// Header bytes exactly as received.
    pub fn wire_header(&self) -> &[u8] {
        &self.buf[..HEADER_SIZE]
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_SIZE..]
    }

    /// Header plus payload.
    pub fn wire_len(&self) -> usize {
        self.buf.len()
    }

    pub fn has_payload(&self) -> bool {
        self.buf.len() > HEADER_SIZE
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("conn", &self.conn.token())
            .field("trans", &self.header.trans_id())
            .field("cmd", &self.header.cmd)
            .field("size", &self.header.size)
            .finish()
    }
}

/// Message queued for sending.
#[derive(Debug)]
pub struct Outbound {
    buf: Vec<u8>,
    sent: usize,
}

impl Outbound {
    /// Encode `header` (its `size` is overwritten with `payload.len()`) followed by `payload`.
    pub fn new(header: &CommandHeader, payload: &[u8]) -> Self {
        let mut header = *header;
        header.size = payload.len() as u64;
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&header.to_wire());
        buf.extend_from_slice(payload);
        Self { buf, sent: 0 }
    }

    /// Reply to `req` with `status` and `payload`.
    pub fn reply(req: &CommandHeader, status: i32, payload: &[u8]) -> Self {
        Self::new(&CommandHeader::reply_to(req, status, 0), payload)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn is_complete(&self) -> bool {
        self.sent == self.buf.len()
    }

    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.sent..]
    }

    /// One write attempt of the remaining bytes. Returns bytes written.
    pub(crate) fn write_to<W: Write>(&mut self, mut dst: W) -> Result<usize> {
        match dst.write(self.remaining()) {
            Ok(0) => Err(NetError::Io(io::ErrorKind::WriteZero.into())),
            Ok(n) => {
                self.sent += n;
                Ok(n)
            }
            Err(e) => Err(NetError::from_io(e)),
        }
    }
}
