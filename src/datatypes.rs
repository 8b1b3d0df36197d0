use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result, SectionError};

type ErrCode = i16;

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceData {
    pub system: System,
}

impl DeviceData {
    pub fn sysinfo(self) -> SysInfo {
        self.system.sysinfo
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct System {
    #[serde(rename = "get_sysinfo")]
    pub sysinfo: SysInfo,
}

/// A reply section is either the requested data or the device's error body.
///
/// `Err` is tried first: data sections carry `err_code` too but never `err_msg`.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum SectionResult<T> {
    Err(SectionError),
    Ok(T),
}

impl<T> SectionResult<T> {
    pub fn into_result(self) -> Result<T> {
        match self {
            SectionResult::Ok(section) => Ok(section),
            SectionResult::Err(err) => Err(Error::from(err)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct SysInfo {
    pub sw_ver: String,
    pub hw_ver: String,
    #[serde(rename = "type", alias = "mic_type")]
    pub hw_type: String,
    pub model: String,
    #[serde(alias = "mic_mac")]
    pub mac: String,
    pub alias: String,
    pub dev_name: String,
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
    #[serde(rename = "hwId")]
    pub hw_id: Option<String>,
    #[serde(rename = "oemId")]
    pub oem_id: Option<String>,
    pub err_code: ErrCode,
    pub rssi: Option<i32>,
    pub active_mode: Option<String>,
    pub feature: Option<String>,
    pub relay_state: Option<i64>,
    pub on_time: Option<i64>,
    pub led_off: Option<u8>,
    pub updating: Option<u8>,
}

impl SysInfo {
    pub fn has_emeter(&self) -> bool {
        self.feature
            .as_deref()
            .map_or(false, |f| f.split(':').any(|part| part == "ENE"))
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub fn from_raw(relay_state: i64) -> RelayState {
        if relay_state == 1 {
            RelayState::On
        } else {
            RelayState::Off
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            RelayState::On => "on",
            RelayState::Off => "off",
        })
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    pub state: RelayState,
    pub relay_state: i64,
}

impl PowerState {
    /// Only `system.get_sysinfo.relay_state` is read; the rest of the reply
    /// may carry anything.
    pub fn from_sysinfo_reply(reply: Value) -> Result<PowerState> {
        let relay_state = reply
            .pointer("/system/get_sysinfo/relay_state")
            .and_then(Value::as_i64)
            .ok_or(Error::MissingField("relay state"))?;

        Ok(PowerState {
            state: RelayState::from_raw(relay_state),
            relay_state,
        })
    }

    pub fn is_on(&self) -> bool {
        self.state == RelayState::On
    }
}

/// Outcome of an operation that changes the relay and then re-reads it.
#[derive(Debug, Serialize, Clone)]
pub struct Switched {
    pub result: Value,
    pub state: PowerState,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmeterReply {
    pub emeter: EmeterSection,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum EmeterSection {
    Err(SectionError),
    Realtime {
        get_realtime: SectionResult<EmeterRealtime>,
    },
}

impl EmeterReply {
    pub fn realtime(self) -> Result<EmeterRealtime> {
        match self.emeter {
            EmeterSection::Realtime { get_realtime } => get_realtime.into_result(),
            EmeterSection::Err(err) => Err(Error::from(err)),
        }
    }
}

/// Realtime reading; older firmware reports volts/amps/watts, newer reports
/// milli-units.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EmeterRealtime {
    #[serde(alias = "voltage_mv")]
    pub voltage: Option<f64>,
    #[serde(alias = "current_ma")]
    pub current: Option<f64>,
    #[serde(alias = "power_mw")]
    pub power: Option<f64>,
    #[serde(alias = "total_wh")]
    pub total: Option<f64>,
    pub err_code: ErrCode,
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use serde_json::json;

    pub const HS100_JSON: &str = r#"{
      "system": {
        "get_sysinfo": {
          "sw_ver": "1.5.8 Build 180815 Rel.135935",
          "hw_ver": "2.1",
          "type": "IOT.SMARTPLUGSWITCH",
          "model": "HS100(UK)",
          "mac": "00:00:00:00:00:00",
          "dev_name": "Smart Wi-Fi Plug",
          "alias": "Switch Two",
          "relay_state": 0,
          "on_time": 0,
          "active_mode": "none",
          "feature": "TIM",
          "updating": 0,
          "icon_hash": "",
          "rssi": -53,
          "led_off": 0,
          "longitude_i": 123,
          "latitude_i": 3456,
          "hwId": "00000000000000000000000000000000",
          "fwId": "00000000000000000000000000000000",
          "deviceId": "0000000000000000000000000000000000000000",
          "oemId": "FDD18403D5E8DB3613009C820963E018",
          "next_action": {
            "type": -1
          },
          "ntc_state": 0,
          "err_code": 0
        }
      }
    }"#;

    pub const HS110_JSON: &str = r#"{
      "system": {
        "get_sysinfo": {
          "err_code": 0,
          "sw_ver": "1.2.5 Build 171213 Rel.095335",
          "hw_ver": "1.0",
          "type": "IOT.SMARTPLUGSWITCH",
          "model": "HS110(UK)",
          "mac": "00:00:00:00:00:00",
          "deviceId": "0000000000000000000000000000000000000000",
          "hwId": "00000000000000000000000000000000",
          "fwId": "00000000000000000000000000000000",
          "oemId": "90AEEA7AECBF1A879FCA3C104C58C4D8",
          "alias": "Switch One",
          "dev_name": "Wi-Fi Smart Plug With Energy Monitoring",
          "icon_hash": "",
          "relay_state": 1,
          "on_time": 12521,
          "active_mode": "schedule",
          "feature": "TIM:ENE",
          "updating": 0,
          "rssi": -40,
          "led_off": 0,
          "latitude": 0.0,
          "longitude": 0.0
        }
      }
    }"#;

    #[test]
    fn deserialise_hs100() {
        let result = serde_json::from_str::<DeviceData>(HS100_JSON).unwrap();

        let sysinfo = result.sysinfo();
        assert_eq!(sysinfo.hw_ver, "2.1");
        assert_eq!(sysinfo.model, "HS100(UK)");
        assert_eq!(sysinfo.relay_state, Some(0));
        assert!(!sysinfo.has_emeter());
    }

    #[test]
    fn deserialise_hs110() {
        let result = serde_json::from_str::<DeviceData>(HS110_JSON).unwrap();

        let sysinfo = result.sysinfo();
        assert_eq!(sysinfo.alias, "Switch One");
        assert_eq!(sysinfo.model, "HS110(UK)");
        assert!(sysinfo.has_emeter());
    }

    #[test]
    fn power_state_from_relay() {
        let on = serde_json::from_str(HS110_JSON).unwrap();
        let off = serde_json::from_str(HS100_JSON).unwrap();

        assert_eq!(
            PowerState { state: RelayState::On, relay_state: 1 },
            PowerState::from_sysinfo_reply(on).unwrap()
        );
        assert_eq!(
            PowerState { state: RelayState::Off, relay_state: 0 },
            PowerState::from_sysinfo_reply(off).unwrap()
        );
    }

    #[test]
    fn power_state_serialises_like_the_cli_prints_it() {
        let state = PowerState { state: RelayState::On, relay_state: 1 };

        assert_eq!(json!({"state": "on", "relay_state": 1}), serde_json::to_value(state).unwrap());
    }

    #[test]
    fn power_state_ignores_unrelated_fields() {
        let reply = json!({"system": {"get_sysinfo": {
            "relay_state": 1,
            "rssi": "n/a",
            "type": "IOT.SMARTPLUGSWITCH",
            "mic_type": "IOT.SMARTPLUGSWITCH"
        }}});

        assert_eq!(
            PowerState { state: RelayState::On, relay_state: 1 },
            PowerState::from_sysinfo_reply(reply).unwrap()
        );
    }

    #[test]
    fn unexpected_relay_value_reads_as_off() {
        let reply = json!({"system": {"get_sysinfo": {"relay_state": -1}}});

        assert_eq!(
            PowerState { state: RelayState::Off, relay_state: -1 },
            PowerState::from_sysinfo_reply(reply).unwrap()
        );
    }

    #[test]
    fn power_state_missing_relay() {
        let reply = json!({"system": {"get_sysinfo": {"alias": "Bulb", "err_code": 0}}});

        assert!(matches!(
            PowerState::from_sysinfo_reply(reply),
            Err(Error::MissingField(_))
        ));
        assert!(matches!(
            PowerState::from_sysinfo_reply(json!({"emeter": {}})),
            Err(Error::MissingField(_))
        ));
    }

    #[test]
    fn emeter_realtime_v1_and_v2() {
        let v1: EmeterReply = serde_json::from_value(json!({"emeter": {"get_realtime": {
            "current": 0.5, "voltage": 230.1, "power": 115.0, "total": 1.2, "err_code": 0
        }}}))
        .unwrap();
        let v2: EmeterReply = serde_json::from_value(json!({"emeter": {"get_realtime": {
            "current_ma": 500, "voltage_mv": 230100, "power_mw": 115000, "total_wh": 1200, "err_code": 0
        }}}))
        .unwrap();

        assert_eq!(Some(115.0), v1.realtime().unwrap().power);
        assert_eq!(Some(115000.0), v2.realtime().unwrap().power);
    }

    #[test]
    fn emeter_not_supported() {
        let reply: EmeterReply = serde_json::from_value(json!({"emeter": {
            "err_code": -1, "err_msg": "module not support"
        }}))
        .unwrap();

        assert!(matches!(reply.realtime(), Err(Error::TPLink(_))));

        let reply: EmeterReply = serde_json::from_value(json!({"emeter": {"get_realtime": {
            "err_code": -2001, "err_msg": "Module not support"
        }}}))
        .unwrap();

        assert!(matches!(reply.realtime(), Err(Error::TPLink(_))));
    }
}
