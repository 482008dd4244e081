//! A non-blocking TCP socket primitive. Every operation is non-blocking once
//! `init` has run; readiness is probed with a zero-timeout `select` rather
//! than relying on an async reactor, per §4.1 and the single-threaded,
//! cooperative core mandated by §5.

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::error::{Error, Result};

enum Inner {
  Stream(TcpStream),
  Listener(TcpListener),
}

/// A non-blocking socket. Either a connected stream (client, or a server's
/// accepted peer) or a listening socket (server only).
pub struct Socket {
  inner: Inner,
}

impl Socket {
  /// Binds and listens for incoming connections (server side, §4.1).
  pub fn bind_and_listen(host: &str, port: u16, backlog: u32) -> Result<Self> {
    let addr: SocketAddr = format!("{host}:{port}")
      .parse()
      .map_err(|e: std::net::AddrParseError| Error::SocketBind(e.to_string()))?;
    let listener = TcpListener::bind(addr).map_err(|e| Error::SocketBind(e.to_string()))?;
    listener
      .set_nonblocking(true)
      .map_err(|e| Error::SocketOptions(e.to_string()))?;
    let _ = backlog; // std::net has no explicit backlog knob; OS default applies.
    Ok(Self {
      inner: Inner::Listener(listener),
    })
  }

  /// Non-blocking accept. Returns `Ok(None)` when no connection is pending
  /// (the `TryAgain` sentinel collapses into this, per §7's propagation
  /// policy — it never reaches the caller as an `Error`).
  pub fn accept(&self) -> Result<Option<(Socket, IpAddr, u16)>> {
    let listener = match &self.inner {
      Inner::Listener(l) => l,
      Inner::Stream(_) => return Err(Error::SocketAccept("not a listening socket".into())),
    };
    match listener.accept() {
      Ok((stream, peer)) => {
        stream
          .set_nonblocking(true)
          .map_err(|e| Error::SocketOptions(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        Ok(Some((
          Socket {
            inner: Inner::Stream(stream),
          },
          peer.ip(),
          peer.port(),
        )))
      }
      Err(e) if would_block(&e) => Ok(None),
      Err(e) => Err(Error::SocketAccept(e.to_string())),
    }
  }

  /// Non-blocking connect (client side). The socket is created, set
  /// non-blocking, and `connect(2)`'d in one step; a fresh connect almost
  /// always comes back `EINPROGRESS` — the caller keeps polling
  /// `ready_for_send` and the TCP handshake completes in the background
  /// (§4.1's "may return `TryAgain` semantics").
  pub fn connect(host: &str, port: u16) -> Result<Self> {
    let addr: SocketAddr = format!("{host}:{port}")
      .parse()
      .map_err(|e: std::net::AddrParseError| Error::SocketConnect(e.to_string()))?;

    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
      return Err(Error::SocketCreate(io::Error::last_os_error().to_string()));
    }
    set_nonblocking(fd).map_err(Error::SocketOptions)?;

    let (sin, len) = sockaddr_in(addr);
    let ret = unsafe {
      libc::connect(
        fd,
        &sin as *const libc::sockaddr_in as *const libc::sockaddr,
        len,
      )
    };
    if ret < 0 {
      let err = io::Error::last_os_error();
      if err.raw_os_error() != Some(libc::EINPROGRESS) {
        unsafe { libc::close(fd) };
        return Err(Error::socket_connect(err));
      }
    }

    let stream = unsafe { <TcpStream as std::os::unix::io::FromRawFd>::from_raw_fd(fd) };
    let _ = stream.set_nodelay(true);
    Ok(Self {
      inner: Inner::Stream(stream),
    })
  }

  /// Once `ready_for_send()` reports writable, checks whether the
  /// in-progress connect actually succeeded (`SO_ERROR == 0`) versus failed
  /// (e.g. `ECONNREFUSED`) asynchronously.
  pub fn take_connect_error(&self) -> Result<()> {
    let fd = self.raw_fd();
    let mut errno: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
      libc::getsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_ERROR,
        &mut errno as *mut _ as *mut libc::c_void,
        &mut len,
      )
    };
    if ret < 0 {
      return Err(Error::SocketConnect(io::Error::last_os_error().to_string()));
    }
    if errno != 0 {
      return Err(Error::SocketConnect(io::Error::from_raw_os_error(errno).to_string()));
    }
    Ok(())
  }

  fn stream_mut(&mut self) -> Result<&mut TcpStream> {
    match &mut self.inner {
      Inner::Stream(s) => Ok(s),
      Inner::Listener(_) => Err(Error::SocketSend("socket is a listener, not a stream".into())),
    }
  }

  fn raw_fd(&self) -> RawFd {
    match &self.inner {
      Inner::Stream(s) => s.as_raw_fd(),
      Inner::Listener(l) => l.as_raw_fd(),
    }
  }

  /// Sends as much of `buf` as the socket will currently accept. A `Ok(0)` on
  /// a writable socket means back-pressure, not EOF (§4.1).
  pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
    match self.stream_mut()?.write(buf) {
      Ok(n) => Ok(n),
      Err(e) if would_block(&e) => Ok(0),
      Err(e) => Err(Error::socket_send(e)),
    }
  }

  /// Reads as many bytes as are currently available into `buf`. `Ok(0)` means
  /// "would block"; a genuine EOF is reported as `Error::SocketReceive`
  /// ("ReceiveFailed" in spec terms), since this protocol never expects the
  /// peer to half-close (§4.1).
  pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
    match self.stream_mut()?.read(buf) {
      Ok(0) if !buf.is_empty() => Err(Error::SocketReceive("peer closed connection".into())),
      Ok(n) => Ok(n),
      Err(e) if would_block(&e) => Ok(0),
      Err(e) => Err(Error::socket_receive(e)),
    }
  }

  /// Zero-timeout `select`, polling write-readiness only.
  pub fn ready_for_send(&self) -> Result<bool> {
    self.select(false, true)
  }

  /// Zero-timeout `select`, polling read-readiness only.
  pub fn ready_for_read(&self) -> Result<bool> {
    self.select(true, false)
  }

  fn select(&self, read: bool, write: bool) -> Result<bool> {
    let fd = self.raw_fd();
    let mut readfds = new_fd_set();
    let mut writefds = new_fd_set();
    unsafe {
      if read {
        libc::FD_SET(fd, &mut readfds);
      }
      if write {
        libc::FD_SET(fd, &mut writefds);
      }
    }
    let mut timeout = libc::timeval {
      tv_sec: 0,
      tv_usec: 0,
    };
    let ret = unsafe {
      libc::select(
        fd + 1,
        if read { &mut readfds } else { std::ptr::null_mut() },
        if write { &mut writefds } else { std::ptr::null_mut() },
        std::ptr::null_mut(),
        &mut timeout,
      )
    };
    if ret < 0 {
      return Err(Error::SocketSelect(io::Error::last_os_error().to_string()));
    }
    if ret == 0 {
      return Ok(false);
    }
    let set = unsafe {
      if read {
        libc::FD_ISSET(fd, &readfds)
      } else {
        libc::FD_ISSET(fd, &writefds)
      }
    };
    Ok(set)
  }

  pub fn close(&mut self) {
    // `TcpStream`/`TcpListener` close their fd on `Drop`; nothing else to do
    // here, the method exists so the connection core has an explicit,
    // spec-named operation to call (§4.1).
  }

  pub fn is_initialized(&self) -> bool {
    true
  }

  pub fn local_port(&self) -> Result<u16> {
    let addr = match &self.inner {
      Inner::Stream(s) => s.local_addr(),
      Inner::Listener(l) => l.local_addr(),
    };
    addr
      .map(|a| a.port())
      .map_err(|e| Error::SocketOptions(e.to_string()))
  }
}

fn new_fd_set() -> libc::fd_set {
  unsafe {
    let mut set: libc::fd_set = std::mem::zeroed();
    libc::FD_ZERO(&mut set);
    set
  }
}

fn set_nonblocking(fd: RawFd) -> std::result::Result<(), String> {
  unsafe {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
      return Err(io::Error::last_os_error().to_string());
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
      return Err(io::Error::last_os_error().to_string());
    }
  }
  Ok(())
}

fn sockaddr_in(addr: SocketAddr) -> (libc::sockaddr_in, libc::socklen_t) {
  let ip = match addr.ip() {
    IpAddr::V4(v4) => v4,
    IpAddr::V6(_) => panic!("Arcus sockets are IPv4-only"),
  };
  // Zero-init first so BSD-family targets' extra `sin_len` field (absent on
  // Linux) is covered without a per-platform field list.
  let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
  sin.sin_family = libc::AF_INET as libc::sa_family_t;
  sin.sin_port = addr.port().to_be();
  sin.sin_addr = libc::in_addr {
    s_addr: u32::from_ne_bytes(ip.octets()),
  };
  (
    sin,
    std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
  )
}

fn would_block(e: &io::Error) -> bool {
  matches!(
    e.kind(),
    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
  ) || e.raw_os_error() == Some(libc::EINPROGRESS)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::TcpStream as StdTcpStream;

  #[test]
  fn bind_and_accept_nonblocking_returns_none_when_idle() {
    let server = Socket::bind_and_listen("127.0.0.1", 0, 16).unwrap();
    let result = server.accept().unwrap();
    assert!(result.is_none());
  }

  #[test]
  fn full_accept_cycle() {
    let server = Socket::bind_and_listen("127.0.0.1", 0, 16).unwrap();
    let port = server.local_port().unwrap();

    let _client = StdTcpStream::connect(("127.0.0.1", port)).unwrap();

    // Give the OS a moment to queue the connection; poll a few times rather
    // than sleeping blindly.
    let mut accepted = None;
    for _ in 0..1000 {
      if let Some(triple) = server.accept().unwrap() {
        accepted = Some(triple);
        break;
      }
    }
    let (_socket, ip, _port) = accepted.expect("server should eventually accept");
    assert!(ip.is_loopback());
  }

  #[test]
  fn send_receive_roundtrip() {
    let server = Socket::bind_and_listen("127.0.0.1", 0, 16).unwrap();
    let port = server.local_port().unwrap();
    let mut client = Socket::connect("127.0.0.1", port).unwrap();

    let mut server_side = None;
    for _ in 0..1000 {
      if let Some((s, _, _)) = server.accept().unwrap() {
        server_side = Some(s);
        break;
      }
    }
    let mut server_side = server_side.expect("accept should succeed");

    // The client connect may still be in-progress; wait for write readiness.
    for _ in 0..1000 {
      if client.ready_for_send().unwrap() {
        break;
      }
    }

    let mut sent_total = 0;
    while sent_total < 5 {
      sent_total += client.send(&b"hello"[sent_total..]).unwrap();
    }

    let mut buf = [0u8; 5];
    let mut received = 0;
    for _ in 0..1000 {
      if received == 5 {
        break;
      }
      received += server_side.receive(&mut buf[received..]).unwrap();
    }
    assert_eq!(&buf, b"hello");
  }
}
