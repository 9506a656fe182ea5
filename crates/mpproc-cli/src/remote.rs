//! Blocking iproto client: one request in flight at a time.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mpproc_core::iproto::{self, Request, Response, FRAME_PREFIX_LEN, GREETING_LEN};

pub struct Connection {
    stream: TcpStream,
    next_sync: u64,
}

impl Connection {
    /// Connects to `addr` and consumes the server greeting. `timeout` bounds the
    /// connect and every later read and write.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        let mut stream = None;
        for sa in addr
            .to_socket_addrs()
            .with_context(|| format!("resolve {addr}"))?
        {
            match TcpStream::connect_timeout(&sa, timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }
        let mut stream = match (stream, last_err) {
            (Some(s), _) => s,
            (None, Some(err)) => return Err(err).with_context(|| format!("connect {addr}")),
            (None, None) => bail!("{addr} resolved to no addresses"),
        };
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let mut greeting = [0u8; GREETING_LEN];
        stream
            .read_exact(&mut greeting)
            .with_context(|| format!("read greeting from {addr}"))?;
        iproto::check_greeting(&greeting)?;
        tracing::debug!(
            addr,
            greeting = %String::from_utf8_lossy(&greeting[..64]).trim_end(),
            "connected"
        );

        Ok(Self {
            stream,
            next_sync: 1,
        })
    }

    fn round_trip(&mut self, req: &Request<'_>) -> Result<Response> {
        let sync = self.next_sync;
        self.next_sync += 1;

        let frame = req.to_frame(sync)?;
        tracing::debug!(sync, request_type = req.request_type(), len = frame.len(), "send");
        self.stream.write_all(&frame).context("send request")?;

        let mut prefix = [0u8; FRAME_PREFIX_LEN];
        self.stream
            .read_exact(&mut prefix)
            .context("read response length")?;
        let mut body = vec![0u8; iproto::frame_len(&prefix)?];
        self.stream.read_exact(&mut body).context("read response")?;
        tracing::debug!(sync, len = body.len(), "receive");

        let resp = iproto::decode_response(&body)?;
        if resp.sync != sync {
            bail!("response sync {} does not match request {sync}", resp.sync);
        }
        Ok(resp)
    }

    /// Calls `function` with the encoded argument array `tuple` and returns the
    /// encoded `IPROTO_DATA` array.
    pub fn call(&mut self, function: &str, tuple: &[u8]) -> Result<Vec<u8>> {
        let resp = self.round_trip(&Request::Call { function, tuple })?;
        Ok(resp.into_data()?)
    }

    pub fn ping(&mut self) -> Result<()> {
        self.round_trip(&Request::Ping)?.into_result()?;
        Ok(())
    }
}
