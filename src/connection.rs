//! The per-socket state machine: handshake, then steady-state framing,
//! folded into a single synchronous `update` tick (§4.3/§4.4/§4.6).
//!
//! There is deliberately no task, no reactor, and no wakeup here — a caller
//! drives progress by calling `update()` as often as it likes, and every
//! operation either finishes within the tick's budget or leaves its state
//! parked for the next one. That is what makes this core embeddable in a
//! single-threaded game loop (§5).

use std::time::{Duration, Instant};

use crate::accumulator::Accumulator;
use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE, HELLO, HELLO_SIZE};
use crate::health::HealthChecker;
use crate::message::Message;
use crate::opcode::Opcode;
use crate::payload::Payload;
use crate::ring::Ring;
use crate::socket::Socket;
use crate::{codec, header};

/// Where a `Connection` sits in the handshake, per §4.3. `handshake_not_started`
/// is also the side that will *respond* to a hello it hasn't seen yet; calling
/// `initiate_handshake` is what turns a connection into the side that sends
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  HandshakeNotStarted,
  HandshakeHelloScheduled,
  HandshakeHelloReceived,
  HandshakeHelloSent,
  Ready,
  Error,
}

/// Tunables a `Connection` is built with. Defaults mirror the sizes named in
/// §3 and §4; a `Server`/`Client` façade fills these in from its own config
/// section (§4.9) rather than a caller poking at a `Connection` directly.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
  pub incoming_capacity: usize,
  pub outgoing_capacity: usize,
  pub stream_receive_buffer_size: usize,
  pub stream_send_buffer_size: usize,
  pub payload_max: u32,
  pub handshake_timeout: Duration,
  pub health_send_interval: Duration,
  pub health_receive_interval: Duration,
}

impl Default for ConnectionConfig {
  fn default() -> Self {
    const STREAM_BUFFER_SIZE: usize = 128 * 1024;
    Self {
      incoming_capacity: crate::ring::DEFAULT_CAPACITY,
      outgoing_capacity: crate::ring::DEFAULT_CAPACITY,
      stream_receive_buffer_size: STREAM_BUFFER_SIZE,
      stream_send_buffer_size: STREAM_BUFFER_SIZE,
      payload_max: (STREAM_BUFFER_SIZE - HEADER_SIZE) as u32,
      handshake_timeout: Duration::from_secs(1),
      health_send_interval: Duration::from_secs(5),
      health_receive_interval: Duration::from_secs(30),
    }
  }
}

pub struct Connection {
  config: ConnectionConfig,
  socket: Option<Socket>,
  in_stream: Accumulator,
  out_stream: Accumulator,
  incoming: Ring<Message>,
  outgoing: Ring<Message>,
  status: Status,
  handshake_started_at: Instant,
  health: HealthChecker,
}

impl Connection {
  pub fn new(config: ConnectionConfig) -> Self {
    let in_stream = Accumulator::new(config.stream_receive_buffer_size);
    let out_stream = Accumulator::new(config.stream_send_buffer_size);
    let incoming = Ring::new(config.incoming_capacity);
    let outgoing = Ring::new(config.outgoing_capacity);
    let health = HealthChecker::new(config.health_send_interval, config.health_receive_interval);
    Self {
      config,
      socket: None,
      in_stream,
      out_stream,
      incoming,
      outgoing,
      status: Status::HandshakeNotStarted,
      handshake_started_at: Instant::now(),
      health,
    }
  }

  /// Attaches a live socket and resets handshake/framing state. Invalid while
  /// a socket is already attached — call `shutdown` first (§3's lifecycle).
  pub fn init(&mut self, socket: Socket) -> Result<()> {
    if self.socket.is_some() {
      return Err(Error::InvalidStateForOperation);
    }
    self.socket = Some(socket);
    self.in_stream.clear();
    self.out_stream.clear();
    self.incoming.clear();
    self.outgoing.clear();
    self.status = Status::HandshakeNotStarted;
    self.handshake_started_at = Instant::now();
    Ok(())
  }

  /// Detaches the socket and resets all buffered state, handing the socket
  /// back to whoever called `init` rather than closing it here — closing (or
  /// reusing) it is the owner's call (§4.6).
  pub fn shutdown(&mut self) -> Option<Socket> {
    let socket = self.socket.take();
    self.in_stream.clear();
    self.out_stream.clear();
    self.incoming.clear();
    self.outgoing.clear();
    self.status = Status::HandshakeNotStarted;
    socket
  }

  pub fn status(&self) -> Status {
    self.status
  }

  pub fn is_ready(&self) -> bool {
    self.status == Status::Ready
  }

  /// Whether a socket is currently attached, regardless of handshake
  /// progress. A `Client` façade uses this to decide whether it's still
  /// waiting on `connect` to complete (§4.7).
  pub fn has_socket(&self) -> bool {
    self.socket.is_some()
  }

  /// Marks this side as the handshake initiator (§4.3's "Server" role). Only
  /// valid from `handshake_not_started`, before any bytes have been
  /// exchanged.
  pub fn initiate_handshake(&mut self) -> Result<()> {
    if self.status != Status::HandshakeNotStarted {
      return Err(Error::InvalidStateForOperation);
    }
    self.status = Status::HandshakeHelloScheduled;
    self.handshake_started_at = Instant::now();
    Ok(())
  }

  /// Queues a message for delivery, built in place to avoid a throwaway
  /// default `Message`. Declines to invoke `build` at all if the outgoing
  /// ring has no free slot (§4.6).
  pub fn add_outgoing<F>(&mut self, opcode: Opcode, build: F) -> Result<()>
  where
    F: FnOnce(&mut Payload),
  {
    if self.outgoing.is_full() {
      return Err(Error::OutgoingQueueInsufficientSpace);
    }
    let mut payload = Payload::new();
    build(&mut payload);
    self.outgoing.push(Message::new(opcode, payload))
  }

  /// Number of messages waiting in the incoming ring. Inbound `health`
  /// frames never occupy a slot here — they're consumed by the parse step.
  pub fn incoming_count(&self) -> usize {
    self.incoming.len()
  }

  /// Presents the head of the incoming ring to `reader` without removing it
  /// unless `reader` returns `Ok(())`; a failed read leaves the message in
  /// place for a retry (§4.6).
  pub fn remove_incoming<F>(&mut self, reader: F) -> Result<()>
  where
    F: FnOnce(&Message) -> Result<()>,
  {
    let outcome = reader(self.incoming.peek()?);
    if outcome.is_ok() {
      self.incoming.pop()?;
    }
    outcome
  }

  /// One tick: advances the handshake or, once `Ready`, pumps one round of
  /// receive → parse → send → health (§4.4). Any fatal error parks the
  /// connection in `Status::Error`; the caller must `shutdown` and `init` a
  /// fresh socket to recover.
  pub fn update(&mut self) -> Result<()> {
    if self.status == Status::Error {
      return Err(Error::UpdateAfterError);
    }
    if self.socket.is_none() {
      return Err(Error::UpdateReadyFail);
    }
    let result = self.tick();
    if let Err(e) = &result {
      tracing::warn!(error = %e, status = ?self.status, "connection entering error state");
      self.status = Status::Error;
    }
    result
  }

  fn tick(&mut self) -> Result<()> {
    if self.status != Status::Ready
      && self.handshake_started_at.elapsed() >= self.config.handshake_timeout
    {
      return Err(Error::HandshakeTimeout);
    }
    match self.status {
      Status::HandshakeNotStarted => self.responder_not_started_tick(),
      Status::HandshakeHelloScheduled => self.initiator_scheduled_tick(),
      Status::HandshakeHelloReceived => self.responder_hello_received_tick(),
      Status::HandshakeHelloSent => self.initiator_sent_tick(),
      Status::Ready => self.steady_state_tick(),
      Status::Error => unreachable!("handled in update()"),
    }
  }

  // --- Responder (client) side: handshake_not_started -> hello_received -> ready ---

  fn responder_not_started_tick(&mut self) -> Result<()> {
    self.receive_pump()?;
    if self.in_stream.size() < HELLO_SIZE {
      return Ok(());
    }
    let bytes = self.in_stream.get(HELLO_SIZE)?;
    header::validate_hello(&bytes)?;
    tracing::debug!("hello received, queuing reply");
    self.status = Status::HandshakeHelloReceived;
    Ok(())
  }

  fn responder_hello_received_tick(&mut self) -> Result<()> {
    if self.out_stream.is_empty() {
      self.out_stream.append(&Header::hello_reply().to_bytes())?;
    }
    if self.drain_out_stream()? {
      self.enter_ready();
    }
    Ok(())
  }

  // --- Initiator (server) side: handshake_not_started -> hello_scheduled -> hello_sent -> ready ---

  fn initiator_scheduled_tick(&mut self) -> Result<()> {
    let socket = self.socket.as_ref().expect("checked in update()");
    if socket.ready_for_read()? {
      return Err(Error::ReceiveBeforeSend);
    }
    if self.out_stream.is_empty() {
      self.out_stream.append(&HELLO)?;
    }
    if self.drain_out_stream()? {
      self.status = Status::HandshakeHelloSent;
    }
    Ok(())
  }

  fn initiator_sent_tick(&mut self) -> Result<()> {
    self.receive_pump()?;
    if self.in_stream.size() < HEADER_SIZE {
      return Ok(());
    }
    let bytes = self.in_stream.get(HEADER_SIZE)?;
    if bytes != Header::hello_reply().to_bytes() {
      return Err(Error::HelloMessageReplyInvalid);
    }
    tracing::debug!("hello reply received");
    self.enter_ready();
    Ok(())
  }

  fn enter_ready(&mut self) {
    self.status = Status::Ready;
    // The handshake may have sat idle for a while on either clock; don't let
    // that count against the freshly-started steady-state health window.
    self.health.note_sent();
    self.health.note_received();
    tracing::info!("connection ready");
  }

  // --- Steady state (§4.4) ---

  fn steady_state_tick(&mut self) -> Result<()> {
    self.receive_pump()?;
    self.parse_pump()?;
    self.send_pump()?;
    self.health.tick(&mut self.outgoing)
  }

  /// Pulls as many bytes as the socket currently has into `in_stream`,
  /// stopping at the first non-readable poll or a full buffer.
  fn receive_pump(&mut self) -> Result<()> {
    loop {
      if self.in_stream.remaining() == 0 {
        return Ok(());
      }
      let socket = self.socket.as_ref().expect("checked in update()");
      if !socket.ready_for_read()? {
        return Ok(());
      }
      let mut scratch = vec![0u8; self.in_stream.remaining()];
      let socket = self.socket.as_mut().expect("checked in update()");
      let n = socket.receive(&mut scratch)?;
      if n == 0 {
        return Ok(());
      }
      self.in_stream.append(&scratch[..n])?;
      if self.status == Status::Ready {
        self.health.note_received();
      }
    }
  }

  /// Decodes complete frames out of `in_stream`. Inbound `health` frames are
  /// dropped here and never reach `incoming`; a full incoming ring halts
  /// parsing with the undecoded bytes left buffered, which is this core's
  /// only form of back-pressure (§4.6).
  fn parse_pump(&mut self) -> Result<()> {
    loop {
      if self.in_stream.size() < HEADER_SIZE {
        return Ok(());
      }
      let header_bytes = self.in_stream.peek(HEADER_SIZE)?;
      let header = codec::data_to_header(header_bytes)?;
      if header.length > self.config.payload_max {
        return Err(Error::ExpectedDataLengthTooBig(header.length, self.config.payload_max));
      }
      let frame_len = HEADER_SIZE + header.length as usize;
      if self.in_stream.size() < frame_len {
        return Ok(());
      }
      let is_health = header.opcode == Opcode::Health.as_u8();
      if !is_health && self.incoming.is_full() {
        return Ok(());
      }
      let frame = self.in_stream.get(frame_len)?;
      let message = codec::data_to_message(&frame, self.config.payload_max)?;
      if message.opcode != Opcode::Health {
        self.incoming.push(message)?;
      }
    }
  }

  /// Drains `out_stream` to the socket, then refills it from `outgoing` and
  /// repeats, until either the socket blocks or there's nothing left to send.
  fn send_pump(&mut self) -> Result<()> {
    loop {
      if !self.drain_out_stream()? {
        return Ok(());
      }
      if self.outgoing.is_empty() {
        return Ok(());
      }
      let mut filled_any = false;
      while !self.outgoing.is_empty() && self.out_stream.remaining() > 0 {
        let message = self.outgoing.peek()?;
        let bytes = codec::message_to_data(message, self.config.payload_max)?;
        if bytes.len() > self.out_stream.capacity() {
          return Err(Error::OutMessageTooBigForStream(bytes.len(), self.out_stream.capacity()));
        }
        if bytes.len() > self.out_stream.remaining() {
          break;
        }
        self.out_stream.append(&bytes)?;
        self.outgoing.pop()?;
        filled_any = true;
      }
      if !filled_any {
        return Ok(());
      }
    }
  }

  /// Sends everything currently buffered in `out_stream`. Returns `true` if
  /// it fully drained, `false` if the socket blocked partway through.
  fn drain_out_stream(&mut self) -> Result<bool> {
    while !self.out_stream.is_empty() {
      let chunk = self.out_stream.peek(self.out_stream.size())?.to_vec();
      let socket = self.socket.as_mut().expect("checked in update()");
      let sent = socket.send(&chunk)?;
      if sent == 0 {
        return Ok(false);
      }
      self.out_stream.trim(sent)?;
      self.health.note_sent();
    }
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> ConnectionConfig {
    ConnectionConfig {
      incoming_capacity: 4,
      outgoing_capacity: 4,
      stream_receive_buffer_size: 4096,
      stream_send_buffer_size: 4096,
      payload_max: 4096 - HEADER_SIZE as u32,
      handshake_timeout: Duration::from_secs(5),
      health_send_interval: Duration::from_secs(60),
      health_receive_interval: Duration::from_secs(60),
    }
  }

  fn loopback_pair() -> (Socket, Socket) {
    let server = Socket::bind_and_listen("127.0.0.1", 0, 16).unwrap();
    let port = server.local_port().unwrap();
    let client = Socket::connect("127.0.0.1", port).unwrap();
    let mut accepted = None;
    for _ in 0..10_000 {
      if let Some((s, _, _)) = server.accept().unwrap() {
        accepted = Some(s);
        break;
      }
    }
    (accepted.expect("server should accept"), client)
  }

  fn pump_until_ready(a: &mut Connection, b: &mut Connection) {
    for _ in 0..10_000 {
      if a.is_ready() && b.is_ready() {
        return;
      }
      a.update().unwrap();
      b.update().unwrap();
    }
    panic!("handshake never completed: a={:?} b={:?}", a.status(), b.status());
  }

  #[test]
  fn handshake_completes_both_sides() {
    let (server_sock, client_sock) = loopback_pair();
    let mut server = Connection::new(config());
    let mut client = Connection::new(config());
    server.init(server_sock).unwrap();
    client.init(client_sock).unwrap();
    server.initiate_handshake().unwrap();

    pump_until_ready(&mut server, &mut client);
  }

  #[test]
  fn messages_round_trip_after_handshake() {
    let (server_sock, client_sock) = loopback_pair();
    let mut server = Connection::new(config());
    let mut client = Connection::new(config());
    server.init(server_sock).unwrap();
    client.init(client_sock).unwrap();
    server.initiate_handshake().unwrap();
    pump_until_ready(&mut server, &mut client);

    server
      .add_outgoing(Opcode::Allocated, |p| {
        p.set_bool("allocated", true);
      })
      .unwrap();

    let mut received = false;
    for _ in 0..10_000 {
      server.update().unwrap();
      client.update().unwrap();
      if client.incoming_count() > 0 {
        received = true;
        break;
      }
    }
    assert!(received, "client never saw the message");

    client
      .remove_incoming(|msg| {
        assert_eq!(msg.opcode, Opcode::Allocated);
        assert_eq!(msg.payload.get_bool("allocated").unwrap(), true);
        Ok(())
      })
      .unwrap();
    assert_eq!(client.incoming_count(), 0);
  }

  #[test]
  fn full_incoming_ring_applies_back_pressure() {
    let (server_sock, client_sock) = loopback_pair();
    let mut server = Connection::new(config());
    let mut client = Connection::new(config());
    server.init(server_sock).unwrap();
    client.init(client_sock).unwrap();
    server.initiate_handshake().unwrap();
    pump_until_ready(&mut server, &mut client);

    // incoming_capacity is 4; enqueue more than that so the parse loop must
    // eventually stall with bytes still buffered rather than erroring.
    for _ in 0..8 {
      server
        .add_outgoing(Opcode::PlayerJoinedEventResponse, |p| {
          p.set_string("player", "a");
        })
        .ok();
    }

    for _ in 0..10_000 {
      server.update().unwrap();
      client.update().unwrap();
    }
    assert!(client.incoming_count() <= 4);
  }

  #[test]
  fn remove_incoming_on_empty_ring_is_queue_empty() {
    let mut conn = Connection::new(config());
    let result = conn.remove_incoming(|_| Ok(()));
    assert_eq!(result.unwrap_err(), Error::QueueEmpty);
  }

  #[test]
  fn initiate_handshake_twice_is_invalid() {
    let mut conn = Connection::new(config());
    conn.initiate_handshake().unwrap();
    assert_eq!(
      conn.initiate_handshake().unwrap_err(),
      Error::InvalidStateForOperation
    );
  }

  #[test]
  fn init_while_already_initialized_is_invalid() {
    let (server_sock, _client_sock) = loopback_pair();
    let (server_sock_2, _c2) = loopback_pair();
    let mut conn = Connection::new(config());
    conn.init(server_sock).unwrap();
    assert_eq!(conn.init(server_sock_2).unwrap_err(), Error::InvalidStateForOperation);
  }
}
