//! Byte/hex formatting helpers shared by logging call sites across the workspace.

/// Renders `bytes` as a `0x`-prefixed hex string, truncated to its first and last `edge` bytes
/// with an ellipsis in between. Used for `tracing` fields where the full 32/64-byte value would
/// be unreadable noise but the value's identity still needs to be recognizable across log lines.
pub fn short_hex(bytes: &[u8], edge: usize) -> String {
    if bytes.len() <= edge * 2 {
        return format!("0x{}", hex::encode(bytes));
    }
    format!(
        "0x{}..{}",
        hex::encode(&bytes[..edge]),
        hex::encode(&bytes[bytes.len() - edge..])
    )
}
