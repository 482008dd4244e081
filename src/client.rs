//! The orchestration-agent-side façade: dials out, retries on an interval
//! while disconnected, and is always the handshake responder (§4.3, §4.7).

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionConfig, Status as ConnectionStatus};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::opcode::Opcode;
use crate::payload::Payload;
use crate::server::ApplicationInstanceStatus;
use crate::socket::Socket;

/// How often a disconnected `Client` retries `connect` (§4.7).
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Uninitialized,
  Connecting,
  Handshake,
  Ready,
  Error,
}

#[derive(Default)]
pub struct Callbacks {
  pub allocated: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub metadata: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub live_state_response: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub host_information_response: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub application_instance_information_response: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub application_instance_get_status_response: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub application_instance_set_status_response: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub player_joined_event_response: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub player_left_response: Option<Box<dyn FnMut(&Payload) + Send>>,
}

struct State {
  host: String,
  port: u16,
  dialed: bool,
  last_connect_attempt: Option<Instant>,
  had_error: bool,
  connection: Connection,
}

pub struct Client {
  connect_retry_interval: Duration,
  state: Mutex<State>,
  callbacks: Mutex<Callbacks>,
}

impl Client {
  pub fn new(config: ClientConfig) -> Self {
    let connection_config = config.connection_config();
    Self {
      connect_retry_interval: CONNECT_RETRY_INTERVAL,
      state: Mutex::new(State {
        host: config.network.host,
        port: config.network.port,
        dialed: false,
        last_connect_attempt: None,
        had_error: false,
        connection: Connection::new(connection_config),
      }),
      callbacks: Mutex::new(Callbacks::default()),
    }
  }

  pub fn with_connection_config(host: impl Into<String>, port: u16, connection_config: ConnectionConfig) -> Self {
    Self {
      connect_retry_interval: CONNECT_RETRY_INTERVAL,
      state: Mutex::new(State {
        host: host.into(),
        port,
        dialed: false,
        last_connect_attempt: None,
        had_error: false,
        connection: Connection::new(connection_config),
      }),
      callbacks: Mutex::new(Callbacks::default()),
    }
  }

  pub fn status(&self) -> Status {
    let state = self.state.lock();
    if !state.dialed {
      return Status::Uninitialized;
    }
    if state.connection.status() == ConnectionStatus::Ready {
      return Status::Ready;
    }
    if !socket_attached(&state) {
      return if state.had_error { Status::Error } else { Status::Connecting };
    }
    Status::Handshake
  }

  /// One tick: retry `connect` on an interval while not attached, otherwise
  /// drive the `Connection` and dispatch any messages it produced (§4.7). A
  /// connection error tears down and re-enters the retry loop, matching the
  /// original `close_client`-then-reinitialize pattern.
  pub fn update(&self) -> Result<()> {
    let drained = {
      let mut state = self.state.lock();
      state.dialed = true;

      if !socket_attached(&state) {
        self.try_connect(&mut state);
        return Ok(());
      }

      if let Err(e) = state.connection.update() {
        tracing::warn!(error = %e, "client connection failed, will retry");
        if let Some(mut socket) = state.connection.shutdown() {
          socket.close();
        }
        state.last_connect_attempt = None;
        state.had_error = true;
        return Err(e);
      }

      let mut drained = Vec::new();
      while state.connection.incoming_count() > 0 {
        state.connection.remove_incoming(|msg| {
          drained.push(msg.clone());
          Ok(())
        })?;
      }
      drained
    };

    let mut callbacks = self.callbacks.lock();
    for msg in &drained {
      dispatch(&mut callbacks, msg);
    }
    Ok(())
  }

  fn try_connect(&self, state: &mut State) {
    let now = Instant::now();
    if let Some(last) = state.last_connect_attempt {
      if now.duration_since(last) < self.connect_retry_interval {
        return;
      }
    }
    state.last_connect_attempt = Some(now);
    state.had_error = false;
    match Socket::connect(&state.host, state.port) {
      Ok(socket) => {
        tracing::info!(host = %state.host, port = state.port, "dialed, connection pending");
        if let Err(e) = state.connection.init(socket) {
          tracing::warn!(error = %e, "failed to attach freshly dialed socket");
        }
      }
      Err(e) => tracing::debug!(error = %e, "connect attempt failed, will retry"),
    }
  }

  pub fn on_allocated(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().allocated = Some(Box::new(f));
  }
  pub fn on_metadata(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().metadata = Some(Box::new(f));
  }
  pub fn on_live_state_response(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().live_state_response = Some(Box::new(f));
  }
  pub fn on_host_information_response(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().host_information_response = Some(Box::new(f));
  }
  pub fn on_application_instance_information_response(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().application_instance_information_response = Some(Box::new(f));
  }
  pub fn on_application_instance_get_status_response(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().application_instance_get_status_response = Some(Box::new(f));
  }
  pub fn on_application_instance_set_status_response(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().application_instance_set_status_response = Some(Box::new(f));
  }
  pub fn on_player_joined_event_response(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().player_joined_event_response = Some(Box::new(f));
  }
  pub fn on_player_left_response(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().player_left_response = Some(Box::new(f));
  }

  pub fn send_soft_stop(&self, timeout_seconds: i64) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::SoftStop, |p| {
      p.set_int("timeout_seconds", timeout_seconds);
    })
  }

  pub fn send_live_state_request(&self) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::LiveStateRequest, |_| {})
  }

  pub fn send_host_information_request(&self) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::HostInformationRequest, |_| {})
  }

  pub fn send_application_instance_information_request(&self) -> Result<()> {
    self
      .state
      .lock()
      .connection
      .add_outgoing(Opcode::ApplicationInstanceInformationRequest, |_| {})
  }

  pub fn send_application_instance_get_status_request(&self) -> Result<()> {
    self
      .state
      .lock()
      .connection
      .add_outgoing(Opcode::ApplicationInstanceGetStatusRequest, |_| {})
  }

  pub fn send_application_instance_set_status_request(&self, status: ApplicationInstanceStatus) -> Result<()> {
    self
      .state
      .lock()
      .connection
      .add_outgoing(Opcode::ApplicationInstanceSetStatusRequest, |p| {
        p.set_int("status", status.as_i64());
      })
  }
}

fn socket_attached(state: &State) -> bool {
  state.connection.has_socket()
}

fn dispatch(callbacks: &mut Callbacks, msg: &Message) {
  let handler = match msg.opcode {
    Opcode::Allocated => &mut callbacks.allocated,
    Opcode::Metadata => &mut callbacks.metadata,
    Opcode::LiveStateResponse => &mut callbacks.live_state_response,
    Opcode::HostInformationResponse => &mut callbacks.host_information_response,
    Opcode::ApplicationInstanceInformationResponse => &mut callbacks.application_instance_information_response,
    Opcode::ApplicationInstanceGetStatusResponse => &mut callbacks.application_instance_get_status_response,
    Opcode::ApplicationInstanceSetStatusResponse => &mut callbacks.application_instance_set_status_response,
    Opcode::PlayerJoinedEventResponse => &mut callbacks.player_joined_event_response,
    Opcode::PlayerLeftResponse => &mut callbacks.player_left_response,
    other => {
      tracing::debug!(opcode = ?other, "no client callback registered, dropping");
      return;
    }
  };
  match handler {
    Some(f) => f(&msg.payload),
    None => tracing::debug!(opcode = ?msg.opcode, "message arrived with no callback set"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_starts_uninitialized() {
    let client = Client::with_connection_config("127.0.0.1", 0, ConnectionConfig::default());
    assert_eq!(client.status(), Status::Uninitialized);
  }
}
