//! Pure, stateless wire codec: bytes ↔ `(Header, Payload)`.
//!
//! Mirrors the frame-reading shape of a length-prefixed protocol (header then
//! exactly `header.length` payload bytes) but, unlike an async reader, never
//! owns or blocks on I/O — every function here takes an already-buffered
//! slice and returns how many bytes it needed, so the connection core can
//! drive it from a plain `Accumulator` one tick at a time.

use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};
use crate::message::Message;
use crate::opcode::Opcode;
use crate::payload::Payload;

pub use crate::header::validate_hello;

/// Decodes a `Header` from exactly `HEADER_SIZE` bytes. See `Header::from_bytes`
/// for the validation it performs.
pub fn data_to_header(bytes: &[u8]) -> Result<Header> {
  Header::from_bytes(bytes)
}

/// Decodes a full frame (`Header || Payload`) from `bytes`, which must be
/// exactly `HEADER_SIZE + header.length` bytes — the caller (the connection's
/// parse step) is responsible for buffering that much before calling this.
pub fn data_to_message(bytes: &[u8], payload_max: u32) -> Result<Message> {
  if bytes.len() < HEADER_SIZE {
    return Err(Error::DataLengthTooSmallForHeader(bytes.len(), HEADER_SIZE));
  }
  let header = data_to_header(&bytes[..HEADER_SIZE])?;
  if header.length > payload_max {
    return Err(Error::ExpectedDataLengthTooBig(header.length, payload_max));
  }
  let expected = HEADER_SIZE + header.length as usize;
  if bytes.len() < expected {
    return Err(Error::DataLengthTooSmallForPayload(bytes.len(), expected));
  }

  let opcode = Opcode::from_u8(header.opcode).ok_or(Error::InvalidHeader)?;
  let payload = if header.length == 0 {
    Payload::new()
  } else {
    let raw = &bytes[HEADER_SIZE..expected];
    let value: serde_json::Value = serde_json::from_slice(raw)
      .map_err(|e| Error::PayloadParseFailed(e.to_string()))?;
    Payload::from_value(value)?
  };

  Ok(Message::new(opcode, payload))
}

/// Encodes a `Message` to `Header || Payload` bytes, failing if the
/// serialized payload would exceed `payload_max`.
pub fn message_to_data(msg: &Message, payload_max: u32) -> Result<Vec<u8>> {
  let payload_bytes = if msg.payload.is_empty() {
    Vec::new()
  } else {
    serde_json::to_vec(&msg.payload.as_value())
      .map_err(|e| Error::PayloadParseFailed(e.to_string()))?
  };

  if payload_bytes.len() as u64 > payload_max as u64 {
    return Err(Error::InvalidMessagePayloadSizeTooBig(
      payload_bytes.len(),
      payload_max,
    ));
  }

  let header = Header::new(msg.opcode, payload_bytes.len() as u32);
  let mut out = Vec::with_capacity(HEADER_SIZE + payload_bytes.len());
  out.extend_from_slice(&header.to_bytes());
  out.extend_from_slice(&payload_bytes);
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::header::HELLO;

  const PAYLOAD_MAX: u32 = 128 * 1024 - HEADER_SIZE as u32;

  #[test]
  fn roundtrips_empty_payload() {
    let msg = Message::empty(Opcode::SoftStop);
    let bytes = message_to_data(&msg, PAYLOAD_MAX).unwrap();
    assert_eq!(bytes.len(), HEADER_SIZE);
    let decoded = data_to_message(&bytes, PAYLOAD_MAX).unwrap();
    assert_eq!(decoded, msg);
  }

  #[test]
  fn roundtrips_json_payload() {
    let mut payload = Payload::new();
    payload.set_int("players", 4).set_bool("allocated", true);
    let msg = Message::new(Opcode::LiveStateResponse, payload);
    let bytes = message_to_data(&msg, PAYLOAD_MAX).unwrap();
    let decoded = data_to_message(&bytes, PAYLOAD_MAX).unwrap();
    assert_eq!(decoded, msg);
  }

  #[test]
  fn rejects_oversize_declared_length() {
    let mut bytes = Header::new(Opcode::Metadata, PAYLOAD_MAX + 1).to_bytes().to_vec();
    bytes.extend(std::iter::repeat(b'x').take((PAYLOAD_MAX + 1) as usize));
    assert!(matches!(
      data_to_message(&bytes, PAYLOAD_MAX),
      Err(Error::ExpectedDataLengthTooBig(_, _))
    ));
  }

  #[test]
  fn rejects_truncated_payload() {
    let full = message_to_data(&Message::new(Opcode::Metadata, {
      let mut p = Payload::new();
      p.set_string("k", "a reasonably sized value");
      p
    }), PAYLOAD_MAX)
    .unwrap();
    let truncated = &full[..full.len() - 1];
    assert!(matches!(
      data_to_message(truncated, PAYLOAD_MAX),
      Err(Error::DataLengthTooSmallForPayload(_, _))
    ));
  }

  #[test]
  fn rejects_payload_over_max_on_encode() {
    let mut payload = Payload::new();
    payload.set_string("blob", "x".repeat(100));
    let msg = Message::new(Opcode::Metadata, payload);
    assert!(matches!(
      message_to_data(&msg, 10),
      Err(Error::InvalidMessagePayloadSizeTooBig(_, 10))
    ));
  }

  #[test]
  fn validate_hello_delegates_to_header_module() {
    assert!(validate_hello(&HELLO).is_ok());
  }

  #[test]
  fn partial_io_yields_same_messages_as_unsplit() {
    let msgs = vec![
      Message::empty(Opcode::SoftStop),
      Message::new(Opcode::Metadata, {
        let mut p = Payload::new();
        p.set_int("n", 7);
        p
      }),
    ];
    let mut stream = Vec::new();
    for m in &msgs {
      stream.extend(message_to_data(m, PAYLOAD_MAX).unwrap());
    }

    // Decode greedily, as the connection's parse loop would, regardless of
    // how the bytes arrived in chunks.
    let mut decoded = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
      let header = data_to_header(&stream[offset..offset + HEADER_SIZE]).unwrap();
      let frame_len = HEADER_SIZE + header.length as usize;
      let frame = &stream[offset..offset + frame_len];
      decoded.push(data_to_message(frame, PAYLOAD_MAX).unwrap());
      offset += frame_len;
    }
    assert_eq!(decoded, msgs);
  }
}
