//! End-to-end tests driving the Client and Server façades over real loopback
//! TCP sockets: handshake, request/response round trips, soft-stop, and
//! reconnect-after-drop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arcus::config::{ClientConfig, ServerConfig};
use arcus::client::{Client, Status as ClientStatus};
use arcus::server::{ApplicationInstanceStatus, Server, Status as ServerStatus};

fn free_port() -> u16 {
  std::net::TcpListener::bind("127.0.0.1:0")
    .unwrap()
    .local_addr()
    .unwrap()
    .port()
}

fn pump(server: &Server, client: &Client, rounds: usize) {
  for _ in 0..rounds {
    let _ = server.update();
    let _ = client.update();
    std::thread::sleep(Duration::from_millis(2));
  }
}

fn ready_pair(port: u16) -> (Server, Client) {
  let mut server_config = ServerConfig::default();
  server_config.network.port = port;
  let server = Server::new(server_config);
  server.listen().unwrap();

  let mut client_config = ClientConfig::default();
  client_config.network.port = port;
  let client = Client::new(client_config);

  for _ in 0..2000 {
    let _ = server.update();
    let _ = client.update();
    if server.status() == ServerStatus::Ready && client.status() == ClientStatus::Ready {
      return (server, client);
    }
    std::thread::sleep(Duration::from_millis(2));
  }
  panic!("handshake never completed: server={:?} client={:?}", server.status(), client.status());
}

#[test]
fn handshake_reaches_ready_on_both_sides() {
  let (server, client) = ready_pair(free_port());
  assert_eq!(server.status(), ServerStatus::Ready);
  assert_eq!(client.status(), ClientStatus::Ready);
}

#[test]
fn client_live_state_request_gets_server_response() {
  let (server, client) = ready_pair(free_port());

  server.on_live_state_request(|_payload| {});
  let seen = Arc::new(AtomicUsize::new(0));
  let seen_writer = seen.clone();
  client.on_live_state_response(move |payload| {
    assert_eq!(payload.get_int("players").unwrap(), 7);
    assert_eq!(payload.get_string("map").unwrap(), "arena-1");
    seen_writer.fetch_add(1, Ordering::SeqCst);
  });

  client.send_live_state_request().unwrap();
  for _ in 0..500 {
    pump(&server, &client, 1);
    if seen.load(Ordering::SeqCst) == 0 {
      server
        .respond_live_state(7, 16, "arena-1", "arena-1", "deathmatch", "1.0.0")
        .ok();
    } else {
      break;
    }
  }
  assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn soft_stop_reaches_server_callback_with_payload() {
  let (server, client) = ready_pair(free_port());

  let received_timeout = Arc::new(AtomicUsize::new(0));
  let writer = received_timeout.clone();
  server.on_soft_stop(move |payload| {
    writer.store(payload.get_int("timeout_seconds").unwrap() as usize, Ordering::SeqCst);
  });

  client.send_soft_stop(30).unwrap();
  pump(&server, &client, 50);

  assert_eq!(received_timeout.load(Ordering::SeqCst), 30);
}

#[test]
fn application_instance_status_round_trips() {
  let (server, client) = ready_pair(free_port());

  let seen = Arc::new(AtomicUsize::new(0));
  let writer = seen.clone();
  client.on_application_instance_get_status_response(move |payload| {
    writer.store(payload.get_int("status").unwrap() as usize, Ordering::SeqCst);
  });

  server.on_application_instance_get_status_request(|_| {});
  client.send_application_instance_get_status_request().unwrap();

  for _ in 0..200 {
    pump(&server, &client, 1);
    server
      .respond_application_instance_get_status(ApplicationInstanceStatus::Allocated)
      .ok();
    if seen.load(Ordering::SeqCst) != 0 {
      break;
    }
  }
  assert_eq!(seen.load(Ordering::SeqCst), ApplicationInstanceStatus::Allocated.as_i64() as usize);
}

#[test]
fn client_reconnects_after_server_initiated_drop() {
  let port = free_port();
  let (server, client) = ready_pair(port);
  drop(server);

  for _ in 0..50 {
    let _ = client.update();
    std::thread::sleep(Duration::from_millis(2));
  }
  assert_eq!(client.status(), ClientStatus::Error);

  let mut server_config = ServerConfig::default();
  server_config.network.port = port;
  let server = Server::new(server_config);
  server.listen().unwrap();

  for _ in 0..4000 {
    let _ = server.update();
    let _ = client.update();
    if client.status() == ClientStatus::Ready {
      return;
    }
    std::thread::sleep(Duration::from_millis(2));
  }
  panic!("client never recovered after reconnect window");
}
