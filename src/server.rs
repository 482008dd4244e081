//! The game-process-side façade: binds a listening socket, accepts a single
//! in-flight peer, and is always the handshake initiator (§4.3, §4.8).
//!
//! Matches the game's side of the protocol: it answers the orchestration
//! agent's questions about live state, host information and instance status,
//! and reports its own allocation/metadata state.

use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionConfig, Status as ConnectionStatus};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::opcode::Opcode;
use crate::payload::Payload;
use crate::socket::Socket;

/// Mirrors the Connection's handshake/ready states plus "no peer yet" (§4.8
/// scopes the Server façade to zero-or-one connections).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Uninitialized,
  WaitingForClient,
  Handshake,
  Ready,
  Error,
}

#[derive(Default)]
pub struct Callbacks {
  pub soft_stop: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub live_state_request: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub host_information_request: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub application_instance_information_request: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub application_instance_get_status_request: Option<Box<dyn FnMut(&Payload) + Send>>,
  pub application_instance_set_status_request: Option<Box<dyn FnMut(&Payload) + Send>>,
}

struct State {
  listener: Option<Socket>,
  connection: Connection,
}

pub struct Server {
  config: ServerConfig,
  state: Mutex<State>,
  callbacks: Mutex<Callbacks>,
}

impl Server {
  pub fn new(config: ServerConfig) -> Self {
    let connection_config = config.connection_config();
    Self {
      config,
      state: Mutex::new(State {
        listener: None,
        connection: Connection::new(connection_config),
      }),
      callbacks: Mutex::new(Callbacks::default()),
    }
  }

  pub fn with_connection_config(connection_config: ConnectionConfig) -> Self {
    Self {
      config: ServerConfig::default(),
      state: Mutex::new(State {
        listener: None,
        connection: Connection::new(connection_config),
      }),
      callbacks: Mutex::new(Callbacks::default()),
    }
  }

  /// Binds and listens on the configured host/port (§4.8).
  pub fn listen(&self) -> Result<()> {
    let mut state = self.state.lock();
    if state.listener.is_some() {
      return Err(Error::InvalidStateForOperation);
    }
    let listener = Socket::bind_and_listen(
      &self.config.network.host,
      self.config.network.port,
      self.config.network.backlog,
    )?;
    tracing::info!(host = %self.config.network.host, port = self.config.network.port, "server listening");
    state.listener = Some(listener);
    Ok(())
  }

  pub fn status(&self) -> Status {
    let state = self.state.lock();
    if state.listener.is_none() {
      return Status::Uninitialized;
    }
    match state.connection.status() {
      ConnectionStatus::Ready => Status::Ready,
      ConnectionStatus::Error => Status::Error,
      ConnectionStatus::HandshakeNotStarted => Status::WaitingForClient,
      _ => Status::Handshake,
    }
  }

  /// One tick: accept a peer if none is attached, drive the Connection, then
  /// dispatch any newly-arrived messages to registered callbacks (§4.8).
  pub fn update(&self) -> Result<()> {
    let drained = {
      let mut state = self.state.lock();
      let listener = state.listener.as_ref().ok_or(Error::InvalidStateForOperation)?;

      if !state.connection.is_ready() && state.connection.status() == ConnectionStatus::HandshakeNotStarted {
        if let Some((peer, ip, port)) = listener.accept()? {
          tracing::info!(%ip, port, "accepted connection");
          state.connection.init(peer)?;
          state.connection.initiate_handshake()?;
        }
      }

      if let Err(e) = state.connection.update() {
        tracing::warn!(error = %e, "connection failed, awaiting a new peer");
        if let Some(mut socket) = state.connection.shutdown() {
          socket.close();
        }
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

  pub fn on_soft_stop(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().soft_stop = Some(Box::new(f));
  }
  pub fn on_live_state_request(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().live_state_request = Some(Box::new(f));
  }
  pub fn on_host_information_request(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().host_information_request = Some(Box::new(f));
  }
  pub fn on_application_instance_information_request(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().application_instance_information_request = Some(Box::new(f));
  }
  pub fn on_application_instance_get_status_request(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().application_instance_get_status_request = Some(Box::new(f));
  }
  pub fn on_application_instance_set_status_request(&self, f: impl FnMut(&Payload) + Send + 'static) {
    self.callbacks.lock().application_instance_set_status_request = Some(Box::new(f));
  }

  /// Reports the game's own allocation state to the agent (§4.8).
  pub fn set_allocated(&self, allocated: bool) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::Allocated, |p| {
      p.set_bool("allocated", allocated);
    })
  }

  /// Merges `labels`/`annotations` into the game's reported metadata (§4.8).
  pub fn set_metadata(&self, labels: &[(String, String)], annotations: &[(String, String)]) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::Metadata, |p| {
      let mut label_map = serde_json::Map::new();
      for (k, v) in labels {
        label_map.insert(k.clone(), serde_json::Value::String(v.clone()));
      }
      let mut annotation_map = serde_json::Map::new();
      for (k, v) in annotations {
        annotation_map.insert(k.clone(), serde_json::Value::String(v.clone()));
      }
      p.set_object("labels", label_map);
      p.set_object("annotations", annotation_map);
    })
  }

  pub fn respond_live_state(
    &self,
    players: i64,
    max_players: i64,
    name: &str,
    map: &str,
    mode: &str,
    version: &str,
  ) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::LiveStateResponse, |p| {
      p.set_int("players", players)
        .set_int("max_players", max_players)
        .set_string("name", name)
        .set_string("map", map)
        .set_string("mode", mode)
        .set_string("version", version);
    })
  }

  pub fn respond_host_information(&self, id: &str, server_id: &str) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::HostInformationResponse, |p| {
      p.set_string("id", id).set_string("server_id", server_id);
    })
  }

  pub fn respond_application_instance_information(&self, fleet_id: &str, instance_id: &str) -> Result<()> {
    self
      .state
      .lock()
      .connection
      .add_outgoing(Opcode::ApplicationInstanceInformationResponse, |p| {
        p.set_string("fleet_id", fleet_id).set_string("instance_id", instance_id);
      })
  }

  pub fn respond_application_instance_get_status(&self, status: ApplicationInstanceStatus) -> Result<()> {
    self
      .state
      .lock()
      .connection
      .add_outgoing(Opcode::ApplicationInstanceGetStatusResponse, |p| {
        p.set_int("status", status.as_i64());
      })
  }

  pub fn respond_application_instance_set_status(&self, status: ApplicationInstanceStatus) -> Result<()> {
    self
      .state
      .lock()
      .connection
      .add_outgoing(Opcode::ApplicationInstanceSetStatusResponse, |p| {
        p.set_int("status", status.as_i64());
      })
  }

  /// Notifies the agent a player joined/left; `player_id` is embedder-defined.
  pub fn notify_player_joined(&self, player_id: &str) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::PlayerJoinedEventResponse, |p| {
      p.set_string("player_id", player_id);
    })
  }

  pub fn notify_player_left(&self, player_id: &str) -> Result<()> {
    self.state.lock().connection.add_outgoing(Opcode::PlayerLeftResponse, |p| {
      p.set_string("player_id", player_id);
    })
  }
}

/// The statuses an application instance reports, matching the closed set the
/// orchestration agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationInstanceStatus {
  Starting,
  Online,
  Allocated,
}

impl ApplicationInstanceStatus {
  pub fn as_i64(self) -> i64 {
    match self {
      Self::Starting => 3,
      Self::Online => 4,
      Self::Allocated => 5,
    }
  }
}

fn dispatch(callbacks: &mut Callbacks, msg: &Message) {
  let handler = match msg.opcode {
    Opcode::SoftStop => &mut callbacks.soft_stop,
    Opcode::LiveStateRequest => &mut callbacks.live_state_request,
    Opcode::HostInformationRequest => &mut callbacks.host_information_request,
    Opcode::ApplicationInstanceInformationRequest => &mut callbacks.application_instance_information_request,
    Opcode::ApplicationInstanceGetStatusRequest => &mut callbacks.application_instance_get_status_request,
    Opcode::ApplicationInstanceSetStatusRequest => &mut callbacks.application_instance_set_status_request,
    other => {
      tracing::debug!(opcode = ?other, "no server callback registered, dropping");
      return;
    }
  };
  match handler {
    Some(f) => f(&msg.payload),
    None => tracing::debug!(opcode = ?msg.opcode, "message arrived with no callback set"),
  }
}
