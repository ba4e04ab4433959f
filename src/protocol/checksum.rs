//! Frame checksum
//!
//! Frames carry an Adler-32 value over `opcode_LE || payload`. The
//! streaming hasher lets the opcode and payload be hashed without first
//! copying them into one buffer.

use adler2::Adler32;

/// Computes the checksum a frame must carry for `opcode` and `payload`.
pub fn message_checksum(opcode: i32, payload: &[u8]) -> u32 {
    let mut hasher = Adler32::new();
    hasher.write_slice(&opcode.to_le_bytes());
    hasher.write_slice(payload);
    hasher.checksum()
}
