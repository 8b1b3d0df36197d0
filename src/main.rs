extern crate kasalink;

use std::{net::IpAddr, process, time::Duration};

use clap::{App, AppSettings, Arg, ArgMatches, ErrorKind as ClapErrorKind, SubCommand};
use serde_json::{json, Value};

use kasalink::{
    capabilities::{DeviceActions, Emeter, Led, Switch},
    config::Config,
    devices::KasaDevice,
    discovery::{Discovery, DiscoveryConfig},
    error::{Error, Result},
    interfaces,
    scan::{self, ScanConfig, ScanReport},
};

fn ip_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("ip")
        .required(true)
        .help("IP address of the device")
}

fn device_command<'a, 'b>(name: &'a str, about: &'b str) -> App<'a, 'b> {
    SubCommand::with_name(name).about(about).arg(ip_arg())
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("Kasa smart plug CLI")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Discover and control TP-Link Kasa smart plugs on the local network.")
        .setting(AppSettings::SubcommandRequired)
        .global_setting(AppSettings::ColorNever)
        .arg(Arg::with_name("port")
            .long("port")
            .takes_value(true)
            .global(true)
            .help("Device port (default 9999)")
        )
        .arg(Arg::with_name("timeout")
            .long("timeout")
            .takes_value(true)
            .global(true)
            .help("Request timeout in seconds (default 5)")
        )
        .subcommand(SubCommand::with_name("discover")
            .about("Discover devices on the local network")
            .arg(Arg::with_name("seconds").help("How long to listen for replies (default 3)"))
        )
        .subcommand(device_command("info", "Get device info"))
        .subcommand(device_command("state", "Get relay state"))
        .subcommand(device_command("on", "Turn the device on"))
        .subcommand(device_command("off", "Turn the device off"))
        .subcommand(device_command("toggle", "Toggle the relay"))
        .subcommand(device_command("emeter", "Read realtime energy meter values"))
        .subcommand(device_command("cloud", "Get cloud binding info"))
        .subcommand(device_command("wifi", "Scan for WiFi networks"))
        .subcommand(device_command("led", "Set the LED on or off")
            .arg(Arg::with_name("state")
                .required(true)
                .help("on|off")
            )
        )
        .subcommand(device_command("reboot", "Reboot the device")
            .arg(Arg::with_name("delay").help("Seconds before rebooting (default 1)"))
        )
        .subcommand(SubCommand::with_name("scan")
            .about("Probe a /24 for hosts listening on the device port")
            .arg(Arg::with_name("subnet").help("First three octets, e.g. 192.168.1"))
        )
        .subcommand(SubCommand::with_name("interfaces")
            .about("List local addresses and their broadcast addresses")
        )
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::Other(format!("Invalid {}: {}", name, value))),
        None => Ok(None),
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(port) = parse_arg(matches, "port")? {
        config.port = port;
    }
    if let Some(secs) = parse_arg(matches, "timeout")? {
        config.request_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

fn device(matches: &ArgMatches, config: &Config) -> Result<KasaDevice> {
    let ip: IpAddr = parse_arg(matches, "ip")?
        .ok_or_else(|| Error::Other(String::from("IP address required")))?;
    Ok(KasaDevice::from_ip(ip, config.port).with_timeout(config.request_timeout))
}

fn led_on(state: &str) -> bool {
    matches!(state.to_lowercase().as_str(), "on" | "1" | "true")
}

fn command_discover(matches: &ArgMatches, config: &Config) -> Result<Value> {
    let mut discovery = DiscoveryConfig::from_config(config);
    if let Some(secs) = parse_arg(matches, "seconds")? {
        discovery.timeout = Duration::from_secs(secs);
    }
    let devices = Discovery::new(discovery).run()?;
    Ok(json!({ "devices": devices }))
}

fn command_scan(matches: &ArgMatches, config: &Config) -> Result<Value> {
    let subnet = match matches.value_of("subnet") {
        Some(subnet) => scan::parse_subnet(subnet)?,
        None => scan::default_subnet(),
    };
    let hits = scan::scan_subnet(&ScanConfig::new(subnet, config))?;
    Ok(serde_json::to_value(ScanReport::from(hits))?)
}

fn command_interfaces() -> Result<Value> {
    let local = interfaces::local_interfaces();
    let recommended = interfaces::recommended(&local)
        .ok_or_else(|| Error::NotFound(String::from("No interfaces found")))?;
    Ok(json!({
        "interfaces": local,
        "recommended": recommended,
    }))
}

fn run(matches: &ArgMatches) -> Result<Value> {
    let config = load_config(matches)?;

    match matches.subcommand() {
        ("discover", Some(sub)) => command_discover(sub, &config),
        ("scan", Some(sub)) => command_scan(sub, &config),
        ("interfaces", Some(_)) => command_interfaces(),
        ("info", Some(sub)) => device(sub, &config)?.info(),
        ("state", Some(sub)) => Ok(serde_json::to_value(device(sub, &config)?.state()?)?),
        ("on", Some(sub)) => Ok(serde_json::to_value(device(sub, &config)?.turn_on()?)?),
        ("off", Some(sub)) => Ok(serde_json::to_value(device(sub, &config)?.turn_off()?)?),
        ("toggle", Some(sub)) => Ok(serde_json::to_value(device(sub, &config)?.toggle()?)?),
        ("emeter", Some(sub)) => device(sub, &config)?.get_emeter_realtime(),
        ("cloud", Some(sub)) => device(sub, &config)?.cloud_info(),
        ("wifi", Some(sub)) => device(sub, &config)?.scan_wifi(),
        ("led", Some(sub)) => {
            let on = led_on(sub.value_of("state").unwrap_or_default());
            device(sub, &config)?.set_led(on)
        }
        ("reboot", Some(sub)) => {
            let delay = parse_arg(sub, "delay")?.unwrap_or(1);
            device(sub, &config)?.reboot_with_delay(Duration::from_secs(delay))
        }
        (name, _) => Err(Error::Other(format!("Unknown command: {}", name))),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let matches = match app().get_matches_safe() {
        Ok(matches) => matches,
        Err(err) => match err.kind {
            ClapErrorKind::HelpDisplayed | ClapErrorKind::VersionDisplayed => err.exit(),
            _ => {
                println!("{}", json!({"error": clap_message(&err.message), "usage": app_usage()}));
                process::exit(1);
            }
        },
    };

    match run(&matches) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            tracing::error!("{}", err);
            println!("{}", err.to_response());
            process::exit(1);
        }
    }
}

/// The part of a clap error before its usage block, on one line.
fn clap_message(message: &str) -> String {
    let summary = message.split("\n\n").next().unwrap_or_default();
    let summary = summary.trim_start_matches("error:");
    summary.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn app_usage() -> String {
    let mut help = Vec::new();
    if app().write_help(&mut help).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&help).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_state_words() {
        assert!(led_on("on"));
        assert!(led_on("TRUE"));
        assert!(led_on("1"));
        assert!(!led_on("off"));
        assert!(!led_on("0"));
    }

    #[test]
    fn missing_ip_is_rejected() {
        let err = app().get_matches_from_safe(vec!["kasalink", "state"]).unwrap_err();
        assert_eq!(ClapErrorKind::MissingRequiredArgument, err.kind);
    }

    #[test]
    fn clap_errors_become_one_line() {
        let err = app().get_matches_from_safe(vec!["kasalink", "state"]).unwrap_err();
        let message = clap_message(&err.message);

        assert!(!message.contains('\n'));
        assert!(!message.contains('\u{1b}'));
        assert!(!message.contains("USAGE"));
        assert!(!message.starts_with("error"));
        assert!(message.contains("<ip>"));
    }

    #[test]
    fn missing_command_is_rejected() {
        assert!(app().get_matches_from_safe(vec!["kasalink"]).is_err());
    }

    #[test]
    fn invalid_ip_is_an_error() {
        let matches = app()
            .get_matches_from_safe(vec!["kasalink", "info", "not-an-ip"])
            .unwrap();
        let (_, sub) = matches.subcommand();

        assert!(device(sub.unwrap(), &Config::default()).is_err());
    }

    #[test]
    fn global_options_override_config() {
        let matches = app()
            .get_matches_from_safe(vec!["kasalink", "--port", "10001", "--timeout", "2", "info", "10.0.0.2"])
            .unwrap();
        let (_, sub) = matches.subcommand();
        let config = load_config(&matches).unwrap();

        assert_eq!(10001, config.port);
        assert_eq!(Duration::from_secs(2), config.request_timeout);
        assert_eq!(
            "10.0.0.2:10001".parse::<std::net::SocketAddr>().unwrap(),
            device(sub.unwrap(), &config).unwrap().addr()
        );
    }
}
