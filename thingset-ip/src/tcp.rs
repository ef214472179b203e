/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! TCP request/response transport (§4.5): the server listens on port 9001, accepts connections,
//! and serves each with a thread that reads a request, dispatches it against a shared
//! [`RequestEngine`]/[`Registry`], writes the response, and loops until the peer closes.
//!
//! The base protocol assumes TCP packet boundaries line up with request boundaries (§4.5, §9):
//! one `read()` is one request. That assumption breaks under real network conditions (a request
//! split across reads, or two small requests coalesced into one), so [`Framing::LengthPrefixed`]
//! is offered as an opt-in alternative that a production deployment should prefer; the default
//! stays with the documented base-protocol behaviour rather than silently changing the wire format.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use thingset_core::engine::RequestEngine;
use thingset_core::registry::Registry;

/// Default ThingSet TCP request/response port (§6.5).
pub const DEFAULT_PORT: u16 = 9001;

const READ_BUF_LEN: usize = 4096;
const RESPONSE_BUF_LEN: usize = 4096;

/// How a connection's byte stream is split into individual requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One `read()` call delimits one request (§4.5 default assumption).
    OneReadPerRequest,
    /// Each request is prefixed with a big-endian `u16` byte count. Not part of the base
    /// protocol; an explicit opt-in for transports where requests can split or coalesce.
    LengthPrefixed,
}

/// Listens on `addr`, serving every accepted connection against `engine`/`registry` until the
/// listener errors. Blocks the calling thread; callers typically run this on its own thread or
/// the process's main thread.
#[cfg_attr(feature = "trace", func_trace::trace)]
pub fn serve(addr: SocketAddr, framing: Framing, engine: Arc<RequestEngine>, registry: Arc<Mutex<Registry>>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    log::info!("thingset-ip: TCP request/response listening on {addr}");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    if let Err(e) = serve_connection(stream, framing, &engine, &registry) {
                        log::warn!("thingset-ip: connection ended: {e}");
                    }
                });
            }
            Err(e) => log::warn!("thingset-ip: accept failed: {e}"),
        }
    }
    Ok(())
}

fn serve_connection(mut stream: TcpStream, framing: Framing, engine: &RequestEngine, registry: &Mutex<Registry>) -> std::io::Result<()> {
    let mut response = vec![0u8; RESPONSE_BUF_LEN];
    loop {
        let request = match framing {
            Framing::OneReadPerRequest => {
                let mut buf = vec![0u8; READ_BUF_LEN];
                let n = stream.read(&mut buf)?;
                if n == 0 {
                    return Ok(());
                }
                buf.truncate(n);
                buf
            }
            Framing::LengthPrefixed => {
                let mut len_buf = [0u8; 2];
                if let Err(e) = stream.read_exact(&mut len_buf) {
                    return if e.kind() == std::io::ErrorKind::UnexpectedEof { Ok(()) } else { Err(e) };
                }
                let len = u16::from_be_bytes(len_buf) as usize;
                let mut buf = vec![0u8; len];
                stream.read_exact(&mut buf)?;
                buf
            }
        };

        let len = {
            let mut reg = registry.lock().expect("registry mutex poisoned");
            engine.dispatch_binary(&mut reg, &request, &mut response)
        };

        match framing {
            Framing::OneReadPerRequest => stream.write_all(&response[..len])?,
            Framing::LengthPrefixed => {
                stream.write_all(&(len as u16).to_be_bytes())?;
                stream.write_all(&response[..len])?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as ClientStream;
    use std::time::Duration;

    fn fresh_registry() -> Arc<Mutex<Registry>> {
        Arc::new(Mutex::new(Registry::new()))
    }

    #[test]
    fn one_read_per_request_round_trips_a_get_on_unknown_id() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(addr).unwrap();
        let bound = listener.local_addr().unwrap();
        let engine = Arc::new(RequestEngine::new(thingset_core::access::RoleSet::ALL));
        let registry = fresh_registry();

        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let _ = serve_connection(stream, Framing::OneReadPerRequest, &engine, &registry);
            }
        });

        let mut client = ClientStream::connect(bound).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        // GET on node id 0xFFFF, which does not exist.
        client.write_all(&[0x01, 0x19, 0xFF, 0xFF]).unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).unwrap();
        assert!(n >= 1);
        assert_eq!(buf[0], thingset_error::Status::NotFound.code());
    }
}
