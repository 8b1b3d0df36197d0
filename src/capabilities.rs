use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    commands,
    datatypes::{DeviceData, EmeterReply, EmeterRealtime, PowerState, Switched, SysInfo},
    error::Result,
};

pub trait DeviceActions {
    /// Send a command to a device and return its parsed response
    fn send<T: DeserializeOwned>(&self, command: &Value) -> Result<T>;

    /// Full `get_sysinfo` reply, as the device sent it
    fn info(&self) -> Result<Value> {
        self.send(&commands::get_sysinfo())
    }

    fn sysinfo(&self) -> Result<SysInfo> {
        Ok(self.send::<DeviceData>(&commands::get_sysinfo())?.sysinfo())
    }

    fn alias(&self) -> Result<String> {
        Ok(self.sysinfo()?.alias)
    }

    fn reboot(&self) -> Result<Value> {
        self.reboot_with_delay(Duration::from_secs(1))
    }

    fn reboot_with_delay(&self, delay: Duration) -> Result<Value> {
        self.send(&commands::reboot(delay))
    }

    fn cloud_info(&self) -> Result<Value> {
        self.send(&commands::cloud_info())
    }

    fn scan_wifi(&self) -> Result<Value> {
        self.send(&commands::wifi_scan())
    }
}

pub trait Switch: DeviceActions {
    fn state(&self) -> Result<PowerState> {
        PowerState::from_sysinfo_reply(self.info()?)
    }

    fn is_on(&self) -> Result<bool> {
        Ok(self.state()?.is_on())
    }

    fn switch_on(&self) -> Result<Value> {
        self.send(&commands::set_relay_state(true))
    }

    fn switch_off(&self) -> Result<Value> {
        self.send(&commands::set_relay_state(false))
    }

    /// Switch on, then read the relay back.
    fn turn_on(&self) -> Result<Switched> {
        let result = self.switch_on()?;
        Ok(Switched {
            result,
            state: self.state()?,
        })
    }

    fn turn_off(&self) -> Result<Switched> {
        let result = self.switch_off()?;
        Ok(Switched {
            result,
            state: self.state()?,
        })
    }

    fn toggle(&self) -> Result<Switched> {
        if self.is_on()? {
            self.turn_off()
        } else {
            self.turn_on()
        }
    }
}

pub trait Led: DeviceActions {
    fn set_led(&self, on: bool) -> Result<Value> {
        self.send(&commands::set_led_off(on))
    }
}

pub trait Emeter: DeviceActions {
    /// Raw realtime reply; unsupported hardware answers with an error body,
    /// which is passed through untouched.
    fn get_emeter_realtime(&self) -> Result<Value> {
        self.send(&commands::emeter_realtime())
    }

    fn emeter_reading(&self) -> Result<EmeterRealtime> {
        self.send::<EmeterReply>(&commands::emeter_realtime())?
            .realtime()
    }
}
