//! Liveness heartbeat: emits outbound `health` messages on an interval and
//! detects peer silence on another (§4.5).

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::ring::Ring;

pub struct HealthChecker {
  send_interval: Duration,
  receive_interval: Duration,
  last_sent: Instant,
  last_received: Instant,
}

impl HealthChecker {
  pub fn new(send_interval: Duration, receive_interval: Duration) -> Self {
    let now = Instant::now();
    Self {
      send_interval,
      receive_interval,
      last_sent: now,
      last_received: now,
    }
  }

  /// Call whenever any byte leaves on the wire, to reset the send clock.
  pub fn note_sent(&mut self) {
    self.last_sent = Instant::now();
  }

  /// Call whenever any byte arrives from the peer, to reset the receive clock.
  pub fn note_received(&mut self) {
    self.last_received = Instant::now();
  }

  /// One tick: possibly enqueues a `health` message, possibly reports a
  /// timeout. The outgoing ring being full is non-fatal — the next tick
  /// tries again (§4.5).
  pub fn tick(&mut self, outgoing: &mut Ring<Message>) -> Result<()> {
    if self.last_sent.elapsed() >= self.send_interval {
      if outgoing.push(Message::health()).is_ok() {
        self.note_sent();
      }
    }
    if self.last_received.elapsed() >= self.receive_interval {
      return Err(Error::HealthTimeout);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn emits_health_after_send_interval() {
    let mut hc = HealthChecker::new(Duration::from_millis(0), Duration::from_secs(60));
    let mut ring: Ring<Message> = Ring::new(4);
    hc.tick(&mut ring).unwrap();
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.pop().unwrap().opcode, crate::opcode::Opcode::Health);
  }

  #[test]
  fn reports_timeout_after_receive_interval_elapses() {
    let mut hc = HealthChecker::new(Duration::from_secs(60), Duration::from_millis(0));
    let mut ring: Ring<Message> = Ring::new(4);
    assert_eq!(hc.tick(&mut ring).unwrap_err(), Error::HealthTimeout);
  }

  #[test]
  fn full_outgoing_ring_silently_drops_health_message() {
    let mut hc = HealthChecker::new(Duration::from_millis(0), Duration::from_secs(60));
    let mut ring: Ring<Message> = Ring::new(1);
    ring.push(Message::empty(crate::opcode::Opcode::SoftStop)).unwrap();
    // Ring is full; tick must not error, and the heartbeat is simply retried
    // on the next tick.
    hc.tick(&mut ring).unwrap();
    assert_eq!(ring.len(), 1);
  }
}
