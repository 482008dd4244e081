//! In-memory `Message = (Opcode, Payload)`.

use crate::opcode::Opcode;
use crate::payload::Payload;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
  pub opcode: Opcode,
  pub payload: Payload,
}

impl Message {
  pub fn new(opcode: Opcode, payload: Payload) -> Self {
    Self { opcode, payload }
  }

  pub fn empty(opcode: Opcode) -> Self {
    Self::new(opcode, Payload::new())
  }

  pub fn health() -> Self {
    Self::empty(Opcode::Health)
  }
}
