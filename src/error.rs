//! The closed error taxonomy shared by every layer of the connection core.

use thiserror::Error;

/// A single closed error enum, grouped by origin. Every fallible operation in
/// this crate's core returns `Result<T, Error>`; the façades and FFI shim
/// narrow it to a status code or log it, never invent new variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
  // --- Socket ---
  #[error("socket system init failed: {0}")]
  SocketSystemInit(String),
  #[error("socket system cleanup failed: {0}")]
  SocketSystemCleanup(String),
  #[error("socket create failed: {0}")]
  SocketCreate(String),
  #[error("socket bind failed: {0}")]
  SocketBind(String),
  #[error("socket listen failed: {0}")]
  SocketListen(String),
  #[error("socket accept failed: {0}")]
  SocketAccept(String),
  #[error("socket connect failed: {0}")]
  SocketConnect(String),
  #[error("socket send failed: {0}")]
  SocketSend(String),
  #[error("socket receive failed: {0}")]
  SocketReceive(String),
  #[error("socket select failed: {0}")]
  SocketSelect(String),
  #[error("socket close failed: {0}")]
  SocketClose(String),
  #[error("socket options failed: {0}")]
  SocketOptions(String),

  // --- Codec ---
  #[error("header length too small: got {0} bytes, need {1}")]
  HeaderLengthTooSmall(usize, usize),
  #[error("header length too big: got {0} bytes, need {1}")]
  HeaderLengthTooBig(usize, usize),
  #[error("data length too small for header: got {0} bytes, need {1}")]
  DataLengthTooSmallForHeader(usize, usize),
  #[error("data length too small for payload: got {0} bytes, need {1}")]
  DataLengthTooSmallForPayload(usize, usize),
  #[error("expected data length too big: {0} exceeds payload_max {1}")]
  ExpectedDataLengthTooBig(u32, u32),
  #[error("invalid header")]
  InvalidHeader,
  #[error("payload parse failed: {0}")]
  PayloadParseFailed(String),
  #[error("payload size too big: {0} exceeds payload_max {1}")]
  InvalidMessagePayloadSizeTooBig(usize, u32),
  #[error("trying to encode unsupported opcode: {0}")]
  TryingToEncodeUnsupportedOpcode(u8),

  // --- Connection ---
  #[error("handshake timed out")]
  HandshakeTimeout,
  #[error("health check timed out")]
  HealthTimeout,
  #[error("hello is invalid")]
  HelloInvalid,
  #[error("hello is too big")]
  HelloTooBig,
  #[error("hello version mismatch: got {0}, expected {1}")]
  HelloVersionMismatch(u8, u8),
  #[error("hello message send failed: {0}")]
  HelloMessageSendFailed(String),
  #[error("hello message receive failed: {0}")]
  HelloMessageReceiveFailed(String),
  #[error("hello message reply invalid")]
  HelloMessageReplyInvalid,
  #[error("hello message header too big")]
  HelloMessageHeaderTooBig,
  #[error("message receive failed: {0}")]
  MessageReceiveFailed(String),
  #[error("read too big for stream: {0} exceeds capacity {1}")]
  ReadTooBigForStream(usize, usize),
  #[error("outgoing message too big for stream: {0} exceeds capacity {1}")]
  OutMessageTooBigForStream(usize, usize),
  #[error("queue is empty")]
  QueueEmpty,
  #[error("queue has insufficient space")]
  QueueInsufficientSpace,
  #[error("outgoing queue has insufficient space")]
  OutgoingQueueInsufficientSpace,
  #[error("incoming queue has insufficient space")]
  IncomingQueueInsufficientSpace,
  #[error("peer spoke before receiving hello")]
  ReceiveBeforeSend,
  #[error("operation would block")]
  TryAgain,
  #[error("unknown connection status")]
  UnknownStatus,
  #[error("update called after connection entered error state")]
  UpdateAfterError,
  #[error("update failed: socket readiness probe failed")]
  UpdateReadyFail,
  #[error("operation invalid in current connection state")]
  InvalidStateForOperation,

  // --- Payload / Object / Array ---
  #[error("key not found: {0}")]
  KeyNotFound(String),
  #[error("wrong type for key {0}: expected {1}")]
  WrongType(String, &'static str),

  // --- Validation ---
  #[error("null argument: {0}")]
  NullArgument(&'static str),
}

impl Error {
  pub fn socket_send(err: std::io::Error) -> Self {
    Self::SocketSend(err.to_string())
  }

  pub fn socket_receive(err: std::io::Error) -> Self {
    Self::SocketReceive(err.to_string())
  }

  pub fn socket_connect(err: std::io::Error) -> Self {
    Self::SocketConnect(err.to_string())
  }

  pub fn key_not_found(key: impl Into<String>) -> Self {
    Self::KeyNotFound(key.into())
  }

  pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
    Self::WrongType(key.into(), expected)
  }

  /// True for errors that the connection core treats as fatal: any of these
  /// observed during `update` moves the connection's `Status` to `error`.
  pub fn is_fatal(&self) -> bool {
    !matches!(self, Error::TryAgain)
  }
}

pub type Result<T> = std::result::Result<T, Error>;
