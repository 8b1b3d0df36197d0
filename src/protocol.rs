use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use byteorder::{BigEndian, ByteOrder};
use serde_json::Value;

use crate::{
    config::{RECV_BUFFER_SIZE, REQUEST_TIMEOUT},
    error::{Error, Result},
};

#[cfg(test)]
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

const INITIAL_KEY: u8 = 0xAB;
const HEADER_LEN: usize = 4;

// XOR autokey: each cipher byte becomes the key for the next one
// see: https://www.softscheck.com/en/reverse-engineering-tp-link-hs110/
pub fn encrypt_bytes(plain: &[u8]) -> Vec<u8> {
    plain
        .iter()
        .scan(INITIAL_KEY, |key, &byte| {
            *key ^= byte;
            Some(*key)
        })
        .collect()
}

pub fn decrypt_bytes(cipher: &[u8]) -> Vec<u8> {
    cipher
        .iter()
        .scan(INITIAL_KEY, |key, &byte| {
            let plain = *key ^ byte;
            *key = byte;
            Some(plain)
        })
        .collect()
}

/// Frame a message for the wire: plaintext length as a big-endian `u32`,
/// followed by the encrypted body.
pub fn encode(plain: &str) -> Vec<u8> {
    let mut header = [0; HEADER_LEN];
    BigEndian::write_u32(&mut header, plain.len() as u32);

    let mut frame = Vec::with_capacity(HEADER_LEN + plain.len());
    frame.extend_from_slice(&header);
    frame.extend(encrypt_bytes(plain.as_bytes()));
    frame
}

/// Decrypt a payload with the length header already removed.
pub fn decode(payload: &[u8]) -> String {
    String::from_utf8_lossy(&decrypt_bytes(payload)).into_owned()
}

/// Strip the length header from a received frame.
pub fn frame_payload(frame: &[u8]) -> Result<&[u8]> {
    if frame.len() < HEADER_LEN {
        return Err(Error::Truncated(frame.len()));
    }
    Ok(&frame[HEADER_LEN..])
}

pub trait Protocol {
    fn send(&self, addr: SocketAddr, msg: &str) -> Result<String>;
}

pub struct DefaultProtocol {
    timeout: Duration,
}

impl DefaultProtocol {
    pub fn new() -> DefaultProtocol {
        DefaultProtocol::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> DefaultProtocol {
        DefaultProtocol { timeout }
    }
}

impl Default for DefaultProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for DefaultProtocol {
    fn send(&self, addr: SocketAddr, msg: &str) -> Result<String> {
        let payload = encode(msg);
        tracing::debug!(%addr, request = msg, "sending command");

        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(&payload)?;

        // A single read; replies longer than the buffer come back truncated.
        let mut buffer = [0_u8; RECV_BUFFER_SIZE];
        let read = stream.read(&mut buffer)?;

        let decrypted = decode(frame_payload(&buffer[..read])?);
        tracing::debug!(%addr, bytes = read, "received reply");

        Ok(decrypted)
    }
}

/// Send one command over the default transport and parse the reply.
pub fn request(addr: SocketAddr, command: &Value) -> Result<Value> {
    request_with(&DefaultProtocol::new(), addr, command)
}

pub fn request_with<P: Protocol + ?Sized>(
    protocol: &P,
    addr: SocketAddr,
    command: &Value,
) -> Result<Value> {
    let reply = protocol.send(addr, &command.to_string())?;
    Ok(serde_json::from_str(&reply)?)
}

#[cfg(test)]
#[derive(Clone, Default)]
pub struct ProtocolMock {
    requests: Rc<RefCell<Vec<String>>>,
    responses: Rc<RefCell<VecDeque<Result<String>>>>,
}

#[cfg(test)]
impl ProtocolMock {
    pub fn new() -> ProtocolMock {
        ProtocolMock::default()
    }

    pub fn push_response(&self, resp: Result<String>) {
        self.responses.borrow_mut().push_back(resp);
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests
            .borrow()
            .iter()
            .map(|msg| serde_json::from_str(msg).unwrap())
            .collect()
    }
}

#[cfg(test)]
impl Protocol for ProtocolMock {
    fn send(&self, _addr: SocketAddr, msg: &str) -> Result<String> {
        self.requests.borrow_mut().push(msg.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Other(String::from("no scripted response"))))
    }
}
