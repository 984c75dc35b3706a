//! prometheus alertmanager receiver that forwards alerts to a discord webhook
//!
//! Features:
//! - one discord embed per alert status of a notification
//! - tells you in discord if prometheus posts to it instead of alertmanager

use anyhow::{Context, Result};
use settings::{Settings, SettingsError};

mod alert;
mod alertmanager_webhook_receiver;
mod discord;
mod log;
mod renderer;
mod settings;
mod webhook;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = match Settings::load() {
		Ok(settings) => settings,
		Err(SettingsError::Args(err)) => err.exit(),
		// tracing isn't setup yet, anyhow prints the error for us
		Err(err) => return Err(err).context("failed to load config and command line arguments"),
	};

	log::setup_logging(&settings.log).context("could not setup logging")?;

	if !settings.is_discord_webhook_url() {
		tracing::warn!("The Discord WebHook URL doesn't seem to be valid.");
	}

	alertmanager_webhook_receiver::run_alertmanager_receiver(&settings)
		.await
		.context("alertmanager webhook receiver failed to start or crashed")?;

	Ok(())
}
