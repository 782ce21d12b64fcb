//! Command header: the fixed-size frame in front of every payload.
//!
//! On the wire every message is `[header][payload]`, where the header
//! declares the payload length. All integers are big-endian.
//!
//! ```text
//!  0                  20      24      28      32              40              48
//!  ┌──────────────────┬───────┬───────┬───────┬───────────────┬───────────────┐
//!  │ id (opaque, 20B) │status │ cmd   │ flags │ trans         │ size          │
//!  └──────────────────┴───────┴───────┴───────┴───────────────┴───────────────┘
//! ```
//!
//! [`CommandHeader`] is always the host-order view. Conversion happens in
//! exactly two places: [`CommandHeader::from_wire`] once the header bytes
//! are fully received, and [`CommandHeader::to_wire`] once when an outbound
//! message is built.

/// Size of the opaque identifier carried in every header.
pub const ID_SIZE: usize = 20;

/// Size of the encoded header on the wire.
pub const HEADER_SIZE: usize = ID_SIZE + 4 + 4 + 4 + 8 + 8;

/// Top bit of the transaction id: set on replies.
pub const TRANS_REPLY: u64 = 1 << 63;

const OFF_STATUS: usize = ID_SIZE;
const OFF_CMD: usize = OFF_STATUS + 4;
const OFF_FLAGS: usize = OFF_CMD + 4;
const OFF_TRANS: usize = OFF_FLAGS + 4;
const OFF_SIZE: usize = OFF_TRANS + 8;

/// Host-order command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandHeader {
    /// Object identifier. Never interpreted by the engine.
    pub id: [u8; ID_SIZE],
    /// Completion status (negative errno convention).
    pub status: i32,
    /// Command number, reported to the statistics sink.
    pub cmd: u32,
    /// Command flags.
    pub flags: u32,
    /// Transaction id. Bit 63 is the reply flag.
    pub trans: u64,
    /// Number of payload bytes following the header.
    pub size: u64,
}

impl CommandHeader {
    /// Header for a request with the given command and transaction.
    pub fn request(cmd: u32, trans: u64, size: u64) -> Self {
        Self {
            cmd,
            trans: trans & !TRANS_REPLY,
            size,
            ..Self::default()
        }
    }

    /// Header answering `req`: same id, cmd and transaction, reply bit set.
    pub fn reply_to(req: &CommandHeader, status: i32, size: u64) -> Self {
        Self {
            id: req.id,
            status,
            cmd: req.cmd,
            flags: req.flags,
            trans: req.trans | TRANS_REPLY,
            size,
        }
    }

    /// Decode a header received off the wire.
    pub fn from_wire(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&raw[..ID_SIZE]);
        Self {
            id,
            status: i32::from_be_bytes(field(raw, OFF_STATUS)),
            cmd: u32::from_be_bytes(field(raw, OFF_CMD)),
            flags: u32::from_be_bytes(field(raw, OFF_FLAGS)),
            trans: u64::from_be_bytes(field(raw, OFF_TRANS)),
            size: u64::from_be_bytes(field(raw, OFF_SIZE)),
        }
    }

    /// Encode for the wire.
    pub fn to_wire(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        raw[..ID_SIZE].copy_from_slice(&self.id);
        raw[OFF_STATUS..OFF_CMD].copy_from_slice(&self.status.to_be_bytes());
        raw[OFF_CMD..OFF_FLAGS].copy_from_slice(&self.cmd.to_be_bytes());
        raw[OFF_FLAGS..OFF_TRANS].copy_from_slice(&self.flags.to_be_bytes());
        raw[OFF_TRANS..OFF_SIZE].copy_from_slice(&self.trans.to_be_bytes());
        raw[OFF_SIZE..].copy_from_slice(&self.size.to_be_bytes());
        raw
    }

    /// Whether the reply bit is set.
    #[inline]
    pub fn is_reply(&self) -> bool {
        self.trans & TRANS_REPLY != 0
    }

    /// Transaction id with the reply bit masked off.
    #[inline]
    pub fn trans_id(&self) -> u64 {
        self.trans & !TRANS_REPLY
    }
}

#[inline]
fn field<const N: usize>(raw: &[u8; HEADER_SIZE], off: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[off..off + N]);
    out
}
