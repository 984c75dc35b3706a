use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{
    filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn setup_logging(settings: &LogSettings) -> Result<()> {
    let filter_layer = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(settings)?,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .try_init()
        .context("a global subscriber is already installed")?;

    Ok(())
}

fn default_filter(settings: &LogSettings) -> Result<EnvFilter> {
    let level = tracing::Level::from_str(settings.level.as_str())
        .with_context(|| format!("invalid log level '{}'", settings.level))?;

    Ok(EnvFilter::default()
        .add_directive(LevelFilter::from_level(level).into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_case_insensitive() {
        for level in ["info", "DEBUG", "Warn"] {
            let settings = LogSettings { level: level.to_string() };
            assert!(default_filter(&settings).is_ok(), "{level}");
        }
    }

    #[test]
    fn unknown_level() {
        let settings = LogSettings { level: "loud".to_string() };
        assert!(default_filter(&settings).is_err());
    }
}
