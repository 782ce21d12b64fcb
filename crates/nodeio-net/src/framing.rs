//! Receive-side framing: header first, then exactly `header.size` payload bytes.
//!
//! ```text
//!            header complete           body complete
//!   ┌────────────────┐  (size > 0)  ┌──────────────┐
//!   │ AwaitingHeader │─────────────▶│ AwaitingBody │──▶ Frame
//!   └────────────────┘              └──────────────┘
//!          ▲   │ size == 0                  │
//!          │   └────────────────────────────┼──▶ Frame
//!          └──────────── reset ◀────────────┘
//! ```
//!
//! [`RecvState::advance`] keeps reading while the source has data, so one
//! readiness notification can carry a message across any number of partial
//! reads. The request buffer is reserved once, sized `HEADER_SIZE + size`,
//! when the header completes; the header bytes are copied to its front and
//! the payload is appended into the remaining capacity as it arrives, so a
//! header alone never commits payload-sized memory.

use std::io::Read;

use nodeio_core::{CommandHeader, NetError, Result, HEADER_SIZE};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingHeader,
    AwaitingBody,
}

/// One fully reassembled message.
#[derive(Debug)]
pub struct Frame {
    /// Host-order header.
    pub header: CommandHeader,
    /// Wire header followed by the payload; `len() == HEADER_SIZE + header.size`.
    pub buf: Vec<u8>,
}

enum Stage {
    Header,
    Body { header: CommandHeader, buf: Vec<u8> },
}

/// Per-connection framing cursor.
///
/// `offset <= end` always holds; both count bytes of the current phase
/// (header bytes, then payload bytes).
pub struct RecvState {
    stage: Stage,
    header: [u8; HEADER_SIZE],
    offset: usize,
    end: usize,
}

impl Default for RecvState {
    fn default() -> Self {
        Self::new()
    }
}

impl RecvState {
    pub fn new() -> Self {
        Self {
            stage: Stage::Header,
            header: [0u8; HEADER_SIZE],
            offset: 0,
            end: HEADER_SIZE,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.stage {
            Stage::Header => Phase::AwaitingHeader,
            Stage::Body { .. } => Phase::AwaitingBody,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// No partial message buffered.
    pub fn is_idle(&self) -> bool {
        self.phase() == Phase::AwaitingHeader && self.offset == 0
    }

    /// Drop any partial message and wait for a fresh header.
    pub fn reset(&mut self) {
        self.stage = Stage::Header;
        self.offset = 0;
        self.end = HEADER_SIZE;
    }

    /// Read from `src` until one message is complete.
    ///
    /// - `Ok(frame)`: message complete, state is back to `AwaitingHeader`.
    /// - `Err(WouldBlock)`: source drained; progress so far is kept.
    /// - `Err(ConnectionReset)`: source returned EOF.
    /// - any other error: state is reset before returning.
    pub fn advance<R: Read>(&mut self, mut src: R) -> Result<Frame> {
        let res = self.step(&mut src);
        if let Err(err) = &res {
            if !err.is_transient() {
                self.reset();
            }
        }
        res
    }

    fn step<R: Read>(&mut self, src: &mut R) -> Result<Frame> {
        loop {
            if self.offset < self.end {
                match &mut self.stage {
                    Stage::Header => match src.read(&mut self.header[self.offset..self.end]) {
                        Ok(0) => return Err(NetError::ConnectionReset),
                        Ok(n) => self.offset += n,
                        Err(e) => return Err(NetError::from_io(e)),
                    },
                    Stage::Body { buf, .. } => {
                        // Appends into the reserved capacity; pages are
                        // touched only as payload bytes arrive.
                        let want = (self.end - self.offset) as u64;
                        let res = src.by_ref().take(want).read_to_end(buf);
                        self.offset = buf.len() - HEADER_SIZE;
                        match res {
                            Ok(_) if self.offset < self.end => {
                                return Err(NetError::ConnectionReset)
                            }
                            Ok(_) => {}
                            Err(e) => return Err(NetError::from_io(e)),
                        }
                    }
                }
                trace!(offset = self.offset, end = self.end, phase = ?self.phase(), "recv");
                continue;
            }

            match std::mem::replace(&mut self.stage, Stage::Header) {
                Stage::Header => self.begin_body()?,
                Stage::Body { header, buf } => {
                    self.reset();
                    return Ok(Frame { header, buf });
                }
            }
        }
    }

    fn begin_body(&mut self) -> Result<()> {
        let header = CommandHeader::from_wire(&self.header);
        debug!(
            trans = header.trans_id(),
            reply = header.is_reply(),
            size = header.size,
            flags = header.flags,
            status = header.status,
            "received header"
        );

        let too_big = || NetError::Alloc { size: header.size };
        let size = usize::try_from(header.size).map_err(|_| too_big())?;
        let total = size.checked_add(HEADER_SIZE).ok_or_else(too_big)?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(total).map_err(|_| too_big())?;
        buf.extend_from_slice(&self.header);

        self.stage = Stage::Body { header, buf };
        self.offset = 0;
        self.end = size;
        Ok(())
    }
}
