//! Shared helpers for the engine integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nodeio_core::{CommandHeader, Disposition, IoConfig, HEADER_SIZE};
use nodeio_net::NetState;

/// Short timeouts so shutdown is quick.
pub fn test_config() -> IoConfig {
    IoConfig::default()
        .io_thread_num(2)
        .reactor_timeout(Duration::from_millis(50))
        .worker_timeout(Duration::from_millis(50))
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Processor that replies with the request payload.
pub fn echo(conn: &Arc<NetState>, hdr: &CommandHeader, payload: &[u8]) -> Disposition {
    match conn.send_reply(hdr, 0, payload) {
        Ok(()) => Disposition::OK,
        Err(err) => Disposition::status(err.errno()),
    }
}

pub fn encode(cmd: u32, trans: u64, payload: &[u8]) -> Vec<u8> {
    let hdr = CommandHeader::request(cmd, trans, payload.len() as u64);
    let mut buf = hdr.to_wire().to_vec();
    buf.extend_from_slice(payload);
    buf
}

/// Blocking read of one message.
pub fn read_message<R: Read>(mut src: R) -> (CommandHeader, Vec<u8>) {
    let mut raw = [0u8; HEADER_SIZE];
    src.read_exact(&mut raw).expect("read header");
    let hdr = CommandHeader::from_wire(&raw);
    let mut payload = vec![0u8; hdr.size as usize];
    src.read_exact(&mut payload).expect("read payload");
    (hdr, payload)
}

/// Write `bytes` in the given chunk sizes, pausing so each lands in its own read.
pub fn write_chunked<W: Write>(mut dst: W, bytes: &[u8], chunks: &[usize]) {
    let mut pos = 0;
    for &len in chunks {
        dst.write_all(&bytes[pos..pos + len]).expect("write chunk");
        dst.flush().expect("flush");
        pos += len;
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(pos, bytes.len(), "chunks must cover the message");
}
