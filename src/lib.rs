//! Discover and control TP-Link Kasa smart plugs over the local network.
//!
//! Devices speak JSON obfuscated with an XOR autokey cipher on port 9999,
//! over TCP for commands and UDP for discovery.
//!
//! ```no_run
//! use kasalink::{capabilities::Switch, devices::KasaDevice, discovery::discover};
//! use std::time::Duration;
//!
//! for ip in discover(Duration::from_secs(3)).unwrap() {
//!     let plug = KasaDevice::from_ip(ip, 9999);
//!     println!("{} is {:?}", ip, plug.state().map(|s| s.state));
//! }
//! ```
extern crate byteorder;

#[macro_use]
extern crate serde_derive;

pub mod capabilities;
pub mod commands;
pub mod config;
pub mod datatypes;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod interfaces;
pub mod protocol;
pub mod scan;

pub use discovery::discover;
pub use error::{Error, Result};
