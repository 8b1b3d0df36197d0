use std::{
    net::{AddrParseError, IpAddr, SocketAddr},
    result,
    time::Duration,
};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    capabilities::{DeviceActions, Emeter, Led, Switch},
    config::DEFAULT_PORT,
    error::Result,
    protocol::{self, DefaultProtocol, Protocol},
};

/// A Kasa smart plug addressed by IP. Holds no connection; every call
/// connects on its own.
pub struct KasaDevice {
    addr: SocketAddr,
    protocol: Box<dyn Protocol>,
}

impl KasaDevice {
    pub fn new(ip: &str) -> result::Result<KasaDevice, AddrParseError> {
        Ok(Self::from_ip(ip.parse()?, DEFAULT_PORT))
    }

    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        Self::from_addr(SocketAddr::new(ip, port))
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            protocol: Box::new(DefaultProtocol::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.protocol = Box::new(DefaultProtocol::with_timeout(timeout));
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl DeviceActions for KasaDevice {
    fn send<T: DeserializeOwned>(&self, command: &Value) -> Result<T> {
        let reply = protocol::request_with(self.protocol.as_ref(), self.addr, command)?;
        Ok(serde_json::from_value(reply)?)
    }
}

impl Switch for KasaDevice {}
impl Led for KasaDevice {}
impl Emeter for KasaDevice {}
