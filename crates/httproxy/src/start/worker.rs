//! Per-connection driver: read the request head, classify it as a
//! tunnel (CONNECT) or forward request, open the upstream connection,
//! hand both sockets to the relay, and tear down.

use std::{
    io::{Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
};

use anyhow::{Context, Result};

use crate::{request, start::relay};

/// 8 KiB minus one byte, leaving room for a sentinel.
const HEAD_BUF_SIZE: usize = 8 * 1024 - 1;

/// Drives one accepted connection to completion. Never panics across
/// the thread boundary the caller spawned this on; all failures are
/// logged and simply end the session.
pub fn handle_connection(client: TcpStream, peer: SocketAddr) {
    log::info!("peer={peer} accepted connection");

    if let Err(err) = serve(&client, peer) {
        log::warn!("peer={peer} worker error: {err:#}");
    }

    let _ = client.shutdown(Shutdown::Both);
    log::info!("peer={peer} connection closed");
}

fn serve(client: &TcpStream, peer: SocketAddr) -> Result<()> {
    let buf = read_head(client).context("reading request head")?;
    if buf.is_empty() {
        log::info!("peer={peer} closed before sending any bytes");
        return Ok(());
    }

    if buf.len() >= 7 && &buf[..7] == b"CONNECT" {
        handle_connect(client, peer, &buf)
    } else {
        handle_forward(client, peer, &buf)
    }
}

/// Reads from `stream` into a growing buffer until `\r\n\r\n` appears,
/// the peer closes, or the buffer (8 KiB − 1) fills up. Returns
/// whatever bytes were accumulated, which may be an incomplete head if
/// the peer closed early or the buffer filled first, classification
/// and parsing handle that gracefully rather than this function
/// declaring failure; only a *zero*-byte read ends the session here.
fn read_head(mut stream: &TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEAD_BUF_SIZE);
    let mut tmp = [0u8; HEAD_BUF_SIZE];

    while buf.len() < HEAD_BUF_SIZE {
        let n = stream.read(&mut tmp[..HEAD_BUF_SIZE - buf.len()])?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if find_subslice(&buf, b"\r\n\r\n").is_some() {
            break;
        }
    }

    Ok(buf)
}

fn handle_connect(client: &TcpStream, peer: SocketAddr, buf: &[u8]) -> Result<()> {
    let line_end = find_subslice(buf, b"\r\n").unwrap_or(buf.len());
    let line =
        std::str::from_utf8(&buf[..line_end]).context("CONNECT request line is not UTF-8")?;
    let (host, port) =
        parse_connect_target(line).ok_or_else(|| anyhow::anyhow!("malformed CONNECT request line"))?;

    log::info!("peer={peer} CONNECT {host}:{port}");

    let upstream = match connect_first(host, port) {
        Ok(stream) => stream,
        Err(err) => {
            log::warn!("peer={peer} CONNECT upstream {host}:{port} failed: {err}");
            return Ok(());
        }
    };

    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .context("writing 200 Connection Established")?;

    let result = relay::relay(client, &upstream);
    let _ = upstream.shutdown(Shutdown::Both);
    result
}

fn handle_forward(client: &TcpStream, peer: SocketAddr, buf: &[u8]) -> Result<()> {
    let req = match request::parse(buf) {
        Ok(req) => req,
        Err(err) => {
            log::warn!("peer={peer} failed to parse request head: {err}");
            return Ok(());
        }
    };

    let port = req.port_or(80);
    log::debug!(
        "peer={peer} parsed request: method={} path={} host={} port={port}",
        req.method,
        req.path,
        req.host,
    );

    let upstream = match connect_first(req.host, port) {
        Ok(stream) => stream,
        Err(err) => {
            log::warn!("peer={peer} connect to {}:{port} failed: {err}", req.host);
            return Ok(());
        }
    };

    let head = req.to_head();
    log::trace!("peer={peer} origin-form head:\n{head}");
    upstream
        .write_all(head.as_bytes())
        .context("writing request head upstream")?;

    // Forward whatever the head reader already pulled in past
    // `\r\n\r\n` instead of dropping it.
    let head_end = find_subslice(buf, b"\r\n\r\n")
        .map(|pos| pos + 4)
        .unwrap_or(buf.len());
    if head_end < buf.len() {
        upstream
            .write_all(&buf[head_end..])
            .context("writing over-read body bytes upstream")?;
    }

    let result = relay::relay(client, &upstream);
    let _ = upstream.shutdown(Shutdown::Both);
    result
}

/// Parses `CONNECT <host>:<port> HTTP/1.x`. Port defaults to 443 when
/// absent; host is rejected if empty or longer than 255 bytes.
fn parse_connect_target(line: &str) -> Option<(&str, u16)> {
    let mut tokens = line.split_whitespace();
    let method = tokens.next()?;
    if method != "CONNECT" {
        return None;
    }
    let target = tokens.next()?;
    let _version = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }

    let (host, port) = match target.find(':') {
        Some(colon) => (&target[..colon], target[colon + 1..].parse::<u16>().ok()?),
        None => (target, 443),
    };

    if host.is_empty() || host.len() > 255 {
        return None;
    }
    Some((host, port))
}

/// Resolves `(host, port)` and connects to only the first address
/// returned, no happy-eyeballs, no fallback to later addresses.
fn connect_first(host: &str, port: u16) -> std::io::Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"))?;
    TcpStream::connect(addr)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
