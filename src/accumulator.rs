//! A fixed-capacity, append-and-consume byte buffer backing one direction of
//! a socket (§3). `peek` never mutates; `trim` only succeeds when `n` is no
//! more than the current size; `get` yields a contiguous view, compacting the
//! backing storage if needed.

use crate::error::{Error, Result};

pub struct Accumulator {
  capacity: usize,
  buf: Vec<u8>,
}

impl Accumulator {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      buf: Vec::with_capacity(capacity),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn size(&self) -> usize {
    self.buf.len()
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.buf.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buf.is_empty()
  }

  pub fn clear(&mut self) {
    self.buf.clear();
  }

  /// Appends `data` to the end, failing if it would exceed `capacity`.
  pub fn append(&mut self, data: &[u8]) -> Result<()> {
    if data.len() > self.remaining() {
      return Err(Error::ReadTooBigForStream(data.len(), self.remaining()));
    }
    self.buf.extend_from_slice(data);
    Ok(())
  }

  /// A read-only view of the next `n` bytes. Never mutates the buffer.
  pub fn peek(&self, n: usize) -> Result<&[u8]> {
    if n > self.buf.len() {
      return Err(Error::DataLengthTooSmallForHeader(self.buf.len(), n));
    }
    Ok(&self.buf[..n])
  }

  /// Drops the first `n` bytes, shifting the remainder to the front.
  pub fn trim(&mut self, n: usize) -> Result<()> {
    if n > self.buf.len() {
      return Err(Error::DataLengthTooSmallForHeader(self.buf.len(), n));
    }
    self.buf.drain(..n);
    Ok(())
  }

  /// Consumes and returns the next `n` bytes as an owned, contiguous `Vec`.
  pub fn get(&mut self, n: usize) -> Result<Vec<u8>> {
    let view = self.peek(n)?.to_vec();
    self.trim(n)?;
    Ok(view)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn append_and_size() {
    let mut acc = Accumulator::new(16);
    acc.append(b"hello").unwrap();
    assert_eq!(acc.size(), 5);
    assert_eq!(acc.remaining(), 11);
  }

  #[test]
  fn append_beyond_capacity_fails() {
    let mut acc = Accumulator::new(4);
    assert!(acc.append(b"hello").is_err());
    assert_eq!(acc.size(), 0);
  }

  #[test]
  fn peek_does_not_mutate() {
    let mut acc = Accumulator::new(16);
    acc.append(b"hello").unwrap();
    assert_eq!(acc.peek(3).unwrap(), b"hel");
    assert_eq!(acc.size(), 5, "peek must not consume");
  }

  #[test]
  fn trim_requires_enough_bytes() {
    let mut acc = Accumulator::new(16);
    acc.append(b"hi").unwrap();
    assert!(acc.trim(5).is_err());
    acc.trim(2).unwrap();
    assert_eq!(acc.size(), 0);
  }

  #[test]
  fn get_consumes_from_front() {
    let mut acc = Accumulator::new(16);
    acc.append(b"abcdef").unwrap();
    assert_eq!(acc.get(3).unwrap(), b"abc");
    assert_eq!(acc.peek(3).unwrap(), b"def");
  }

  #[test]
  fn invariant_size_never_exceeds_capacity() {
    let mut acc = Accumulator::new(8);
    acc.append(b"12345678").unwrap();
    assert_eq!(acc.size(), acc.capacity());
    assert!(acc.append(b"x").is_err());
  }
}
