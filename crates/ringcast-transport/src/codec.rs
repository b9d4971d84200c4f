//! Line codec: one JSON object per `\n`-terminated line.

use crate::error::RingTransportError;
use crate::frame::Frame;

/// Serialize a frame to a newline-terminated JSON line.
pub fn encode_line(frame: &Frame) -> Result<Vec<u8>, RingTransportError> {
    let mut bytes = serde_json::to_vec(frame).map_err(RingTransportError::Serialization)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize one line (trailing `\r\n` / whitespace tolerated).
pub fn decode_line(line: &[u8]) -> Result<Frame, RingTransportError> {
    serde_json::from_slice(line.trim_ascii_end()).map_err(RingTransportError::Deserialization)
}
