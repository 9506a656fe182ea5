//! IPROTO framing for calling procedures on a remote database.
//!
//! A request is a length-prefixed pair of MessagePack maps: a header carrying
//! the request type and a sync id, then a body. Responses come back in the same
//! framing, with the status in the header and either `IPROTO_DATA` or an error
//! in the body. Only `CALL` and `PING` are supported. Connection handling lives
//! with the caller; everything here works on byte slices.

use std::fmt;

use rmp::decode;
use rmp::encode;
use rmpv::Value;

use crate::codec;
use crate::error::CallError;

// Request types.
pub const IPROTO_OK: u32 = 0x00;
pub const IPROTO_CALL: u8 = 0x0a;
pub const IPROTO_PING: u8 = 0x40;
/// Set in the response status of every error reply; the low bits are the error code.
pub const IPROTO_TYPE_ERROR: u32 = 0x8000;

// Header keys.
pub const IPROTO_REQUEST_TYPE: u8 = 0x00;
pub const IPROTO_SYNC: u8 = 0x01;
pub const IPROTO_SCHEMA_VERSION: u8 = 0x05;

// Body keys.
pub const IPROTO_TUPLE: u8 = 0x21;
pub const IPROTO_FUNCTION_NAME: u8 = 0x22;
pub const IPROTO_DATA: u8 = 0x30;
pub const IPROTO_ERROR_24: u8 = 0x31;
pub const IPROTO_ERROR: u8 = 0x52;

// Keys inside an `IPROTO_ERROR` map.
pub const MP_ERROR_STACK: u64 = 0x00;
pub const MP_ERROR_TYPE: u64 = 0x00;
pub const MP_ERROR_MESSAGE: u64 = 0x03;
pub const MP_ERROR_ERRCODE: u64 = 0x05;

/// A frame starts with the body length as a MessagePack uint32 (`0xce` + 4 bytes).
pub const FRAME_PREFIX_LEN: usize = 5;
/// The server sends a fixed-size text greeting before the first frame.
pub const GREETING_LEN: usize = 128;

/// One request, borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Ping,
    /// `function(tuple...)`; `tuple` is an encoded MessagePack array.
    Call { function: &'a str, tuple: &'a [u8] },
}

fn encode_failed<E: fmt::Display>(err: E) -> CallError {
    CallError::malformed(format!("failed to encode request: {err}"))
}

fn bad<E: fmt::Display>(what: &'static str) -> impl FnOnce(E) -> CallError {
    move |err| CallError::malformed(format!("bad {what}: {err}"))
}

impl Request<'_> {
    pub fn request_type(&self) -> u8 {
        match self {
            Request::Ping => IPROTO_PING,
            Request::Call { .. } => IPROTO_CALL,
        }
    }

    /// Appends the header and body maps to `out`, without the length prefix.
    pub fn encode(&self, sync: u64, out: &mut Vec<u8>) -> Result<(), CallError> {
        if let Request::Call { tuple, .. } = self {
            // The server only accepts an array here; check the header before writing anything.
            let mut cur = *tuple;
            codec::decode_array_len(&mut cur)?;
        }

        encode::write_map_len(out, 2).map_err(encode_failed)?;
        encode::write_pfix(out, IPROTO_REQUEST_TYPE).map_err(encode_failed)?;
        encode::write_pfix(out, self.request_type()).map_err(encode_failed)?;
        encode::write_pfix(out, IPROTO_SYNC).map_err(encode_failed)?;
        encode::write_u64(out, sync).map_err(encode_failed)?;

        match self {
            Request::Ping => {
                encode::write_map_len(out, 0).map_err(encode_failed)?;
            }
            Request::Call { function, tuple } => {
                encode::write_map_len(out, 2).map_err(encode_failed)?;
                encode::write_pfix(out, IPROTO_FUNCTION_NAME).map_err(encode_failed)?;
                encode::write_str(out, function).map_err(encode_failed)?;
                encode::write_pfix(out, IPROTO_TUPLE).map_err(encode_failed)?;
                out.extend_from_slice(tuple);
            }
        }
        Ok(())
    }

    /// Encodes the request as one length-prefixed frame.
    pub fn to_frame(&self, sync: u64) -> Result<Vec<u8>, CallError> {
        let mut out = vec![0xce, 0, 0, 0, 0];
        self.encode(sync, &mut out)?;
        let len = u32::try_from(out.len() - FRAME_PREFIX_LEN)
            .map_err(|_| CallError::malformed("request does not fit in one frame"))?;
        out[1..FRAME_PREFIX_LEN].copy_from_slice(&len.to_be_bytes());
        Ok(out)
    }
}

/// Reads the body length from a frame prefix.
pub fn frame_len(prefix: &[u8]) -> Result<usize, CallError> {
    let mut cur = prefix;
    let len: u32 = decode::read_int(&mut cur).map_err(bad("frame length"))?;
    usize::try_from(len).map_err(|_| CallError::malformed("frame length exceeds address space"))
}

/// Checks that `greeting` is a database greeting and not some other protocol.
pub fn check_greeting(greeting: &[u8]) -> Result<(), CallError> {
    if greeting.len() == GREETING_LEN && greeting.starts_with(b"Tarantool ") {
        Ok(())
    } else {
        Err(CallError::malformed("peer did not send a database greeting"))
    }
}

/// Body of a decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Raw `IPROTO_DATA` value: an array with one element per returned value.
    Data(Vec<u8>),
    Error { code: u32, message: String },
    /// Success with no data, as for `PING`.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub sync: u64,
    pub schema_version: Option<u64>,
    pub body: Body,
}

impl Response {
    /// `Ok(Some(data))` for data, `Ok(None)` for an empty success, and the
    /// server's error as [`CallError::Remote`].
    pub fn into_result(self) -> Result<Option<Vec<u8>>, CallError> {
        match self.body {
            Body::Data(data) => Ok(Some(data)),
            Body::Empty => Ok(None),
            Body::Error { code, message } => Err(CallError::Remote { code, message }),
        }
    }

    /// The returned data of a `CALL`; a reply without data is malformed.
    pub fn into_data(self) -> Result<Vec<u8>, CallError> {
        self.into_result()?
            .ok_or_else(|| CallError::malformed("response carries no data"))
    }
}

fn read_key(cur: &mut &[u8]) -> Result<u64, CallError> {
    decode::read_int(cur).map_err(bad("map key"))
}

fn read_map_len(cur: &mut &[u8], what: &'static str) -> Result<u32, CallError> {
    decode::read_map_len(cur).map_err(bad(what))
}

fn read_value(cur: &mut &[u8], what: &'static str) -> Result<Value, CallError> {
    rmpv::decode::read_value(cur).map_err(bad(what))
}

/// Advances past one value and returns its encoded bytes.
fn raw_value<'a>(cur: &mut &'a [u8], what: &'static str) -> Result<&'a [u8], CallError> {
    let start = *cur;
    read_value(cur, what)?;
    Ok(&start[..start.len() - cur.len()])
}

fn map_get(map: &Value, key: u64) -> Option<&Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key))
        .map(|(_, v)| v)
}

/// Message and code from the first entry of an `IPROTO_ERROR` stack.
fn stack_error(extra: &Value) -> (Option<String>, Option<u32>) {
    let top = map_get(extra, MP_ERROR_STACK)
        .and_then(Value::as_array)
        .and_then(|stack| stack.first());
    let Some(top) = top else {
        return (None, None);
    };
    let message = map_get(top, MP_ERROR_MESSAGE)
        .and_then(Value::as_str)
        .map(str::to_string);
    let code = map_get(top, MP_ERROR_ERRCODE)
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok());
    (message, code)
}

/// Decodes one response frame body (everything after the length prefix).
pub fn decode_response(frame: &[u8]) -> Result<Response, CallError> {
    let mut cur = frame;

    let mut status = None;
    let mut sync: Option<u64> = None;
    let mut schema_version: Option<u64> = None;
    for _ in 0..read_map_len(&mut cur, "response header")? {
        match read_key(&mut cur)? {
            k if k == u64::from(IPROTO_REQUEST_TYPE) => {
                let code: u32 = decode::read_int(&mut cur).map_err(bad("response status"))?;
                status = Some(code);
            }
            k if k == u64::from(IPROTO_SYNC) => {
                sync = Some(decode::read_int(&mut cur).map_err(bad("sync"))?);
            }
            k if k == u64::from(IPROTO_SCHEMA_VERSION) => {
                schema_version = Some(decode::read_int(&mut cur).map_err(bad("schema version"))?);
            }
            _ => {
                read_value(&mut cur, "header value")?;
            }
        }
    }
    let status = status.ok_or_else(|| CallError::malformed("response header has no status"))?;
    let sync = sync.ok_or_else(|| CallError::malformed("response header has no sync"))?;

    let mut data = None;
    let mut message = None;
    let mut stack = (None, None);
    if !cur.is_empty() {
        for _ in 0..read_map_len(&mut cur, "response body")? {
            match read_key(&mut cur)? {
                k if k == u64::from(IPROTO_DATA) => {
                    data = Some(raw_value(&mut cur, "data")?.to_vec());
                }
                k if k == u64::from(IPROTO_ERROR_24) => {
                    let v = read_value(&mut cur, "error message")?;
                    message = v.as_str().map(str::to_string);
                }
                k if k == u64::from(IPROTO_ERROR) => {
                    stack = stack_error(&read_value(&mut cur, "error stack")?);
                }
                _ => {
                    read_value(&mut cur, "body value")?;
                }
            }
        }
    }
    if !cur.is_empty() {
        return Err(CallError::malformed(format!(
            "{} trailing bytes after response",
            cur.len()
        )));
    }

    let body = if status & IPROTO_TYPE_ERROR != 0 {
        let (stack_message, stack_code) = stack;
        let low = status & !IPROTO_TYPE_ERROR;
        Body::Error {
            code: if low != 0 { low } else { stack_code.unwrap_or(0) },
            message: message
                .or(stack_message)
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    } else if status != IPROTO_OK {
        return Err(CallError::malformed(format!(
            "unexpected response status {status:#x}"
        )));
    } else {
        data.map_or(Body::Empty, Body::Data)
    };

    Ok(Response {
        sync,
        schema_version,
        body,
    })
}

/// Splits an encoded array into the encoded bytes of each element.
pub fn split_array(data: &[u8]) -> Result<Vec<&[u8]>, CallError> {
    let mut cur = data;
    let len = codec::decode_array_len(&mut cur)?;
    let mut items = Vec::new();
    for _ in 0..len {
        items.push(raw_value(&mut cur, "array element")?);
    }
    if !cur.is_empty() {
        return Err(CallError::malformed(format!(
            "{} trailing bytes after array",
            cur.len()
        )));
    }
    Ok(items)
}
