//! C ABI shim for embedding from a game engine written in C/C++ (§4.11).
//!
//! Opaque `ArcusServer`/`ArcusClient` handles cross the boundary as raw
//! pointers; callbacks cross it as a single dispatch-table struct per handle
//! (a redesign from the original SDK's per-message `(function, void*)` pairs —
//! one struct is simpler for a caller to build and free). Payloads cross as
//! NUL-terminated JSON text; nothing here ever unwinds across the boundary.

use std::ffi::{c_char, c_void, CStr, CString};
use std::os::raw::c_int;

use crate::client::Client;
use crate::error::Error;
use crate::payload::Payload;
use crate::server::{ApplicationInstanceStatus, Server};

pub struct ArcusServer(Server);
pub struct ArcusClient(Client);

/// Function-pointer table for everything the Server façade can deliver.
/// `user_data` is passed back verbatim to every callback; the payload
/// argument is a NUL-terminated JSON object, valid only for the duration of
/// the call.
#[repr(C)]
pub struct ArcusServerCallbacks {
  pub user_data: *mut c_void,
  pub soft_stop: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub live_state_request: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub host_information_request: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub application_instance_information_request: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub application_instance_get_status_request: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub application_instance_set_status_request: Option<extern "C" fn(*mut c_void, *const c_char)>,
}

#[repr(C)]
pub struct ArcusClientCallbacks {
  pub user_data: *mut c_void,
  pub allocated: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub metadata: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub live_state_response: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub host_information_response: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub application_instance_information_response: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub application_instance_get_status_response: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub application_instance_set_status_response: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub player_joined_event: Option<extern "C" fn(*mut c_void, *const c_char)>,
  pub player_left: Option<extern "C" fn(*mut c_void, *const c_char)>,
}

/// Mirrors `Error`'s discriminant for the FFI boundary. `Ok` is `0`; every
/// other code is a stable, documented constant rather than the enum's
/// (unstable) in-memory ordinal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcusStatus {
  Ok = 0,
  NullArgument = 1,
  InvalidUtf8 = 2,
  InvalidJson = 3,
  InvalidStateForOperation = 4,
  QueueEmpty = 5,
  QueueInsufficientSpace = 6,
  HandshakeTimeout = 7,
  HealthTimeout = 8,
  SocketFailure = 9,
  Other = 255,
}

fn status_of(err: &Error) -> ArcusStatus {
  match err {
    Error::NullArgument(_) => ArcusStatus::NullArgument,
    Error::InvalidStateForOperation => ArcusStatus::InvalidStateForOperation,
    Error::QueueEmpty => ArcusStatus::QueueEmpty,
    Error::OutgoingQueueInsufficientSpace | Error::IncomingQueueInsufficientSpace | Error::QueueInsufficientSpace => {
      ArcusStatus::QueueInsufficientSpace
    }
    Error::HandshakeTimeout => ArcusStatus::HandshakeTimeout,
    Error::HealthTimeout => ArcusStatus::HealthTimeout,
    Error::SocketAccept(_)
    | Error::SocketBind(_)
    | Error::SocketConnect(_)
    | Error::SocketCreate(_)
    | Error::SocketListen(_)
    | Error::SocketOptions(_)
    | Error::SocketReceive(_)
    | Error::SocketSelect(_)
    | Error::SocketSend(_)
    | Error::SocketClose(_) => ArcusStatus::SocketFailure,
    _ => ArcusStatus::Other,
  }
}

fn payload_from_c(json: *const c_char) -> Result<Payload, ArcusStatus> {
  if json.is_null() {
    return Ok(Payload::new());
  }
  let text = unsafe { CStr::from_ptr(json) }
    .to_str()
    .map_err(|_| ArcusStatus::InvalidUtf8)?;
  let value: serde_json::Value = serde_json::from_str(text).map_err(|_| ArcusStatus::InvalidJson)?;
  Payload::from_value(value).map_err(|_| ArcusStatus::InvalidJson)
}

fn payload_to_c(payload: &Payload) -> CString {
  CString::new(payload.as_value().to_string()).unwrap_or_default()
}

// --- Server ---

/// Creates a `Server` with the default connection tuning. Never null.
#[no_mangle]
pub extern "C" fn arcus_server_create() -> *mut ArcusServer {
  Box::into_raw(Box::new(ArcusServer(Server::with_connection_config(
    Default::default(),
  ))))
}

#[no_mangle]
pub unsafe extern "C" fn arcus_server_destroy(server: *mut ArcusServer) {
  if !server.is_null() {
    drop(Box::from_raw(server));
  }
}

#[no_mangle]
pub unsafe extern "C" fn arcus_server_listen(server: *mut ArcusServer) -> ArcusStatus {
  let Some(server) = server.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  server.0.listen().err().map(|e| status_of(&e)).unwrap_or(ArcusStatus::Ok)
}

#[no_mangle]
pub unsafe extern "C" fn arcus_server_update(
  server: *mut ArcusServer,
  callbacks: *const ArcusServerCallbacks,
) -> ArcusStatus {
  let Some(server) = server.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  if let Some(callbacks) = callbacks.as_ref() {
    install_server_callbacks(&server.0, callbacks);
  }
  server.0.update().err().map(|e| status_of(&e)).unwrap_or(ArcusStatus::Ok)
}

fn install_server_callbacks(server: &Server, callbacks: &ArcusServerCallbacks) {
  let user_data = AddrSend(callbacks.user_data);
  macro_rules! bridge {
    ($setter:ident, $field:expr) => {
      if let Some(cb) = $field {
        let user_data = user_data;
        server.$setter(move |payload: &Payload| {
          let json = payload_to_c(payload);
          cb(user_data.0, json.as_ptr());
        });
      }
    };
  }
  bridge!(on_soft_stop, callbacks.soft_stop);
  bridge!(on_live_state_request, callbacks.live_state_request);
  bridge!(on_host_information_request, callbacks.host_information_request);
  bridge!(
    on_application_instance_information_request,
    callbacks.application_instance_information_request
  );
  bridge!(
    on_application_instance_get_status_request,
    callbacks.application_instance_get_status_request
  );
  bridge!(
    on_application_instance_set_status_request,
    callbacks.application_instance_set_status_request
  );
}

/// The caller promises `user_data` stays valid and thread-compatible for as
/// long as the handle lives; we just carry the pointer through.
#[derive(Clone, Copy)]
struct AddrSend(*mut c_void);
unsafe impl Send for AddrSend {}

#[no_mangle]
pub unsafe extern "C" fn arcus_server_set_allocated(server: *mut ArcusServer, allocated: c_int) -> ArcusStatus {
  let Some(server) = server.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  server
    .0
    .set_allocated(allocated != 0)
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

/// Accepts `{"labels": {...}, "annotations": {...}}` as JSON text, since
/// metadata's shape is open-ended and doesn't fit a fixed argument list.
#[no_mangle]
pub unsafe extern "C" fn arcus_server_set_metadata_json(server: *mut ArcusServer, json: *const c_char) -> ArcusStatus {
  let Some(server) = server.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  let payload = match payload_from_c(json) {
    Ok(p) => p,
    Err(status) => return status,
  };
  let labels = string_pairs(&payload, "labels");
  let annotations = string_pairs(&payload, "annotations");
  server
    .0
    .set_metadata(&labels, &annotations)
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

fn string_pairs(payload: &Payload, key: &str) -> Vec<(String, String)> {
  payload
    .get_object(key)
    .map(|map| {
      map
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
    })
    .unwrap_or_default()
}

#[no_mangle]
pub unsafe extern "C" fn arcus_server_respond_live_state(
  server: *mut ArcusServer,
  players: c_int,
  max_players: c_int,
  name: *const c_char,
  map: *const c_char,
  mode: *const c_char,
  version: *const c_char,
) -> ArcusStatus {
  let Some(server) = server.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  let (name, map, mode, version) = match (c_str(name), c_str(map), c_str(mode), c_str(version)) {
    (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
    _ => return ArcusStatus::NullArgument,
  };
  server
    .0
    .respond_live_state(players as i64, max_players as i64, name, map, mode, version)
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

#[no_mangle]
pub unsafe extern "C" fn arcus_server_respond_host_information(
  server: *mut ArcusServer,
  id: *const c_char,
  server_id: *const c_char,
) -> ArcusStatus {
  let Some(server) = server.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  let (id, server_id) = match (c_str(id), c_str(server_id)) {
    (Some(a), Some(b)) => (a, b),
    _ => return ArcusStatus::NullArgument,
  };
  server
    .0
    .respond_host_information(id, server_id)
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

#[no_mangle]
pub unsafe extern "C" fn arcus_server_respond_application_instance_get_status(
  server: *mut ArcusServer,
  status: c_int,
) -> ArcusStatus {
  let Some(server) = server.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  let Some(status) = application_instance_status_from_c(status) else {
    return ArcusStatus::InvalidJson;
  };
  server
    .0
    .respond_application_instance_get_status(status)
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

fn application_instance_status_from_c(raw: c_int) -> Option<ApplicationInstanceStatus> {
  match raw {
    3 => Some(ApplicationInstanceStatus::Starting),
    4 => Some(ApplicationInstanceStatus::Online),
    5 => Some(ApplicationInstanceStatus::Allocated),
    _ => None,
  }
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
  if ptr.is_null() {
    return None;
  }
  CStr::from_ptr(ptr).to_str().ok()
}

// --- Client ---

#[no_mangle]
pub unsafe extern "C" fn arcus_client_create(host: *const c_char, port: u16) -> *mut ArcusClient {
  let Some(host) = c_str(host) else {
    return std::ptr::null_mut();
  };
  Box::into_raw(Box::new(ArcusClient(Client::with_connection_config(
    host,
    port,
    Default::default(),
  ))))
}

#[no_mangle]
pub unsafe extern "C" fn arcus_client_destroy(client: *mut ArcusClient) {
  if !client.is_null() {
    drop(Box::from_raw(client));
  }
}

#[no_mangle]
pub unsafe extern "C" fn arcus_client_update(
  client: *mut ArcusClient,
  callbacks: *const ArcusClientCallbacks,
) -> ArcusStatus {
  let Some(client) = client.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  if let Some(callbacks) = callbacks.as_ref() {
    install_client_callbacks(&client.0, callbacks);
  }
  client.0.update().err().map(|e| status_of(&e)).unwrap_or(ArcusStatus::Ok)
}

fn install_client_callbacks(client: &Client, callbacks: &ArcusClientCallbacks) {
  let user_data = AddrSend(callbacks.user_data);
  macro_rules! bridge {
    ($setter:ident, $field:expr) => {
      if let Some(cb) = $field {
        let user_data = user_data;
        client.$setter(move |payload: &Payload| {
          let json = payload_to_c(payload);
          cb(user_data.0, json.as_ptr());
        });
      }
    };
  }
  bridge!(on_allocated, callbacks.allocated);
  bridge!(on_metadata, callbacks.metadata);
  bridge!(on_live_state_response, callbacks.live_state_response);
  bridge!(on_host_information_response, callbacks.host_information_response);
  bridge!(
    on_application_instance_information_response,
    callbacks.application_instance_information_response
  );
  bridge!(
    on_application_instance_get_status_response,
    callbacks.application_instance_get_status_response
  );
  bridge!(
    on_application_instance_set_status_response,
    callbacks.application_instance_set_status_response
  );
  bridge!(on_player_joined_event_response, callbacks.player_joined_event);
  bridge!(on_player_left_response, callbacks.player_left);
}

#[no_mangle]
pub unsafe extern "C" fn arcus_client_send_soft_stop(client: *mut ArcusClient, timeout_seconds: c_int) -> ArcusStatus {
  let Some(client) = client.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  client
    .0
    .send_soft_stop(timeout_seconds as i64)
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

#[no_mangle]
pub unsafe extern "C" fn arcus_client_send_live_state_request(client: *mut ArcusClient) -> ArcusStatus {
  let Some(client) = client.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  client
    .0
    .send_live_state_request()
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

#[no_mangle]
pub unsafe extern "C" fn arcus_client_send_host_information_request(client: *mut ArcusClient) -> ArcusStatus {
  let Some(client) = client.as_ref() else {
    return ArcusStatus::NullArgument;
  };
  client
    .0
    .send_host_information_request()
    .err()
    .map(|e| status_of(&e))
    .unwrap_or(ArcusStatus::Ok)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn create_and_destroy_server_round_trips() {
    unsafe {
      let server = arcus_server_create();
      assert!(!server.is_null());
      arcus_server_destroy(server);
    }
  }

  #[test]
  fn payload_json_round_trips() {
    let mut p = Payload::new();
    p.set_int("players", 3);
    let c = payload_to_c(&p);
    let back = payload_from_c(c.as_ptr()).unwrap();
    assert_eq!(back.get_int("players").unwrap(), 3);
  }
}
