//! Wire Protocol Module
//!
//! Length-prefixed, checksummed binary frames exchanged over a TCP session.
//!
//! ```text
//! Frame := Length(i32 LE) Body
//! Body  := Opcode(i32 LE) Payload(bytes) Checksum(u32 LE)
//! Length = 8 + len(Payload)
//! ```

mod checksum;
mod message;

pub use checksum::message_checksum;
pub use message::{parse_frame_length, Message};

// == Public Constants ==
/// Size of the length prefix preceding every frame body
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Smallest valid body: opcode plus checksum with an empty payload
pub const MIN_BODY_LEN: usize = 8;

/// Largest body accepted or produced
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024; // 16 MiB

/// Opcode reserved for zero-payload keepalive frames
pub const HEARTBEAT_OPCODE: i32 = 4;
