pub mod relay;
pub mod worker;

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};

/// Connections the kernel will queue ahead of `accept()` before refusing
/// new ones.
const BACKLOG: i32 = 20;

/// Binds the IPv4 wildcard address on `port` with `SO_REUSEADDR` and a
/// fixed backlog, then accepts connections forever, handing each to a
/// freshly spawned thread. Accept errors are logged and skipped; there
/// is no admission control and no graceful-shutdown signal.
pub fn run(port: u16) -> Result<()> {
    let listener = bind(port).with_context(|| format!("failed to bind 0.0.0.0:{port}"))?;
    log::info!("httproxy listening on 0.0.0.0:{port}");

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                std::thread::spawn(move || worker::handle_connection(stream, peer));
            }
            Err(err) => {
                log::error!("accept failed: {err}");
            }
        }
    }
}

/// Builds the listening socket by hand via `socket2` so the exact
/// backlog the specification calls for can be passed to `listen(2)`;
/// `std::net::TcpListener::bind` sets `SO_REUSEADDR` but hardcodes its
/// own backlog.
fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    Ok(socket.into())
}
