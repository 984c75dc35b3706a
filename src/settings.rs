use std::{
    ffi::OsString,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use clap::{Arg, Command};
use config::Config;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use thiserror::Error;
use url::Url;

use crate::{alertmanager_webhook_receiver::ReceiverSettings, log::LogSettings};

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:9094";

static DISCORD_WEBHOOK_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://discord(?:app)?\.com/api/webhooks/[0-9]{17,20}/[a-zA-Z0-9_-]+")
        .expect("invalid discord webhook regex")
});

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Environment variable 'DISCORD_WEBHOOK' or CLI parameter 'webhook.url' not found.")]
    MissingWebhookUrl,
    #[error("The Discord WebHook URL doesn't seem to be a valid URL.")]
    InvalidWebhookUrl(#[source] url::ParseError),
    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),
    #[error("can't load config")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Args(#[from] clap::Error),
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySettings {
    /// timeout of a single webhook execution
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub timeout: Duration,
}

/// settings as they come out of the config sources, before validation
#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    webhook_url: Option<String>,
    listen_address: String,
    log: LogSettings,
    delivery: DeliverySettings,
    receiver: ReceiverSettings,
}

/// Process wide configuration. Built once at startup and never modified.
#[derive(Debug, Clone)]
pub struct Settings {
    pub webhook_url: Url,
    pub listen_address: SocketAddr,
    pub log: LogSettings,
    pub delivery: DeliverySettings,
    pub receiver: ReceiverSettings,
}

impl Settings {
    /// load settings from the command line, the environment and the config file
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(std::env::args_os())
    }

    pub fn load_from<I, T>(args: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let opts = Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .args([
                Arg::new("config")
                    .help("path of config file, it's fine if it doesn't exist")
                    .takes_value(true)
                    .short('c')
                    .long("config")
                    .default_value("./config.yaml"),
                Arg::new("webhook.url")
                    .help("Discord WebHook URL.")
                    .takes_value(true)
                    .long("webhook.url")
                    .env("DISCORD_WEBHOOK"),
                Arg::new("listen.address")
                    .help("Address:Port to listen on.")
                    .takes_value(true)
                    .long("listen.address")
                    .env("LISTEN_ADDRESS"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["error", "warn", "info", "debug", "trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log")
                    .env("LOG_LEVEL"),
            ])
            .try_get_matches_from(args)?;

        // empty environment variables count as unset
        let value = |name: &str| {
            opts.value_of(name)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let conf = Config::builder()
            .set_default("listen_address", DEFAULT_LISTEN_ADDRESS)?
            .set_default("log.level", "info")?
            .set_default("delivery.timeout", 10.0)?
            .set_default("receiver.body_limit", 1024 * 1024_i64)?
            .add_source(config::File::with_name(opts.value_of("config").unwrap_or_default()).required(false))
            .set_override_option("webhook_url", value("webhook.url"))?
            .set_override_option("listen_address", value("listen.address"))?
            .set_override_option("log.level", value("level"))?
            .build()?;

        conf.try_deserialize::<RawSettings>()?.validate()
    }

    /// whether the webhook url looks like one handed out by discord. Other
    /// urls are accepted, e.g. for proxies.
    pub fn is_discord_webhook_url(&self) -> bool {
        DISCORD_WEBHOOK_URL.is_match(self.webhook_url.as_str())
    }
}

impl RawSettings {
    fn validate(self) -> Result<Settings, SettingsError> {
        let webhook_url = self
            .webhook_url
            .filter(|url| !url.is_empty())
            .ok_or(SettingsError::MissingWebhookUrl)?;
        let webhook_url = Url::parse(&webhook_url).map_err(SettingsError::InvalidWebhookUrl)?;

        let listen_address = parse_listen_address(&self.listen_address)
            .ok_or(SettingsError::InvalidListenAddress(self.listen_address))?;

        Ok(Settings {
            webhook_url,
            listen_address,
            log: self.log,
            delivery: self.delivery,
            receiver: self.receiver,
        })
    }
}

/// `ip:port`, or `:port` to listen on all interfaces
fn parse_listen_address(address: &str) -> Option<SocketAddr> {
    match address.strip_prefix(':') {
        Some(port) => Some(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port.parse().ok()?)),
        None => address.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBHOOK: &str = "https://discord.com/api/webhooks/123456789012345678/abc_DEF-123";

    fn load(args: &[&str]) -> Result<Settings, SettingsError> {
        let mut argv = vec!["alertmanager-discord", "--config", "/nonexistent/config.yaml"];
        argv.extend_from_slice(args);
        Settings::load_from(argv)
    }

    #[test]
    fn defaults() {
        let settings = load(&["--webhook.url", WEBHOOK]).unwrap();

        assert_eq!(settings.webhook_url.as_str(), WEBHOOK);
        assert_eq!(settings.listen_address, "127.0.0.1:9094".parse().unwrap());
        assert_eq!(settings.delivery.timeout, Duration::from_secs(10));
        assert_eq!(settings.receiver.body_limit, 1024 * 1024);
        assert!(settings.is_discord_webhook_url());
    }

    #[test]
    fn command_line_overrides() {
        let settings = load(&[
            "--webhook.url",
            WEBHOOK,
            "--listen.address",
            ":9095",
            "--log",
            "DEBUG",
        ])
        .unwrap();

        assert_eq!(settings.listen_address, "0.0.0.0:9095".parse().unwrap());
        assert_eq!(settings.log.level.to_lowercase(), "debug");
    }

    #[test]
    fn invalid_webhook_url() {
        assert!(matches!(
            load(&["--webhook.url", "not a url"]),
            Err(SettingsError::InvalidWebhookUrl(_))
        ));
    }

    #[test]
    fn invalid_listen_address() {
        assert!(matches!(
            load(&["--webhook.url", WEBHOOK, "--listen.address", "somewhere"]),
            Err(SettingsError::InvalidListenAddress(address)) if address == "somewhere"
        ));
    }

    #[test]
    fn webhook_url_shape() {
        assert!(DISCORD_WEBHOOK_URL.is_match(WEBHOOK));
        assert!(DISCORD_WEBHOOK_URL.is_match(
            "https://discordapp.com/api/webhooks/1234567890123456789/token"
        ));
        assert!(!DISCORD_WEBHOOK_URL.is_match("https://example.com/api/webhooks/123/token"));
    }

    #[test]
    fn listen_addresses() {
        assert_eq!(
            parse_listen_address("[::1]:9094"),
            Some("[::1]:9094".parse().unwrap())
        );
        assert_eq!(parse_listen_address(":x"), None);
        assert_eq!(parse_listen_address("localhost"), None);
    }
}
