//! Full-duplex byte pump between two sockets.
//!
//! Each direction runs as its own half-duplex copier thread: when one
//! direction's reads stop, it half-closes its peer for writes and
//! returns, while the other direction keeps draining until it hits its
//! own EOF.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    thread,
};

use anyhow::{Context, Result};

const BUF_SIZE: usize = 8 * 1024;

/// Relays bytes between `client` and `upstream` until both directions
/// have ended (EOF or I/O error on their read side).
pub fn relay(client: &TcpStream, upstream: &TcpStream) -> Result<()> {
    thread::scope(|scope| {
        let upstream_to_client = scope.spawn(|| pump(upstream, client));
        let client_to_upstream = pump(client, upstream);

        let forward = client_to_upstream.context("client->upstream relay");
        let reverse = upstream_to_client
            .join()
            .map_err(|_| anyhow::anyhow!("upstream->client relay thread panicked"))
            .and_then(|r| r.context("upstream->client relay"));

        forward?;
        reverse?;
        Ok(())
    })
}

/// Copies bytes from `from` to `to`, 8 KiB at a time, until `from`
/// returns EOF or either side errors. Always half-closes `to` for
/// writes on the way out, win or lose.
fn pump(mut from: &TcpStream, mut to: &TcpStream) -> io::Result<u64> {
    let mut buf = [0u8; BUF_SIZE];
    let mut total = 0u64;

    let result = (|| -> io::Result<u64> {
        loop {
            let n = from.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            to.write_all(&buf[..n])?;
            total += n as u64;
        }
    })();

    let _ = to.shutdown(Shutdown::Write);
    result
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn relays_bytes_in_both_directions_until_eof() {
        let (client_a, client_b) = connected_pair();
        let (upstream_a, upstream_b) = connected_pair();

        let relay_thread = thread::spawn(move || relay(&client_b, &upstream_a));

        let mut client_side = client_a;
        let mut upstream_side = upstream_b;

        client_side.write_all(b"hello upstream").unwrap();
        let mut buf = [0u8; 32];
        let n = upstream_side.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello upstream");

        upstream_side.write_all(b"hello client").unwrap();
        let n = client_side.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello client");

        drop(client_side);
        drop(upstream_side);
        relay_thread.join().unwrap().unwrap();
    }
}
