//! Command shapes understood by Kasa plugs
use std::time::Duration;

use serde_json::{json, Value};

pub fn get_sysinfo() -> Value {
    json!({"system": {"get_sysinfo": {}}})
}

pub fn set_relay_state(on: bool) -> Value {
    json!({"system": {"set_relay_state": {"state": u8::from(on)}}})
}

/// The device field is inverted: `off: 1` disables the LED.
pub fn set_led_off(led_on: bool) -> Value {
    json!({"system": {"set_led_off": {"off": u8::from(!led_on)}}})
}

pub fn reboot(delay: Duration) -> Value {
    json!({"system": {"reboot": {"delay": delay.as_secs()}}})
}

pub fn emeter_realtime() -> Value {
    json!({"emeter": {"get_realtime": {}}})
}

pub fn cloud_info() -> Value {
    json!({"cnCloud": {"get_info": {}}})
}

pub fn wifi_scan() -> Value {
    json!({"netif": {"get_scaninfo": {"refresh": 1}}})
}
