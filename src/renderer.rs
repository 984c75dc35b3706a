//! Renders alertmanager notifications into discord messages.
//!
//! Notifications are received from [alertmanager_webhook_receiver](crate::alertmanager_webhook_receiver),
//! rendered messages are delivered by [webhook](crate::webhook).

use indexmap::IndexMap;

use crate::{
    alert::{Alert, AlertStatus, Data},
    discord::{Embed, EmbedColor, Field, Message},
};

/// maximum number of characters of an alert's error annotation we put into a field
pub const MAX_ERROR_CHARS: usize = 1500;

/// title of the embed sent when prometheus posts directly to us
pub const MISCONFIGURED_TITLE: &str = "You have misconfigured this software";

pub const MISCONFIGURED_DESCRIPTION: &str = "This program is supposed to be fed by alertmanager.\n\
It is not a replacement for alertmanager, it is a\n\
webhook target for it. Please read the README.md\n\
for guidance on how to configure it for alertmanager\n\
or https://prometheus.io/docs/alerting/latest/configuration/#webhook_config";

impl AlertStatus {
    fn color(&self) -> EmbedColor {
        match self {
            Self::Firing => EmbedColor::Red,
            Self::Resolved => EmbedColor::Green,
            Self::Other(_) => EmbedColor::Grey,
        }
    }
}

/// Renders one message per distinct alert status.
///
/// Groups keep the order in which their status first shows up in the
/// notification, alerts keep their order inside of a group.
pub fn render(data: &Data) -> Vec<(AlertStatus, Message)> {
    let mut groups: IndexMap<AlertStatus, Vec<&Alert>> = IndexMap::new();

    for alert in data.alerts.iter() {
        groups.entry(alert.status()).or_default().push(alert);
    }

    groups
        .into_iter()
        .map(|(status, alerts)| {
            let embed = Embed {
                title: format!("🚨 {}", data.common_annotations.summary),
                description: String::from("details:"),
                color: status.color(),
                fields: alerts.into_iter().map(render_field).collect(),
            };

            (status, Message::with_embed(embed))
        })
        .collect()
}

fn render_field(alert: &Alert) -> Field {
    let annotations = &alert.annotations;

    tracing::debug!(
        status = alert.status.as_str(),
        instance = alert.instance().unwrap_or_default(),
        vault = annotations.vault.as_str(),
        "rendering alert"
    );

    Field {
        name: format!(
            "[{}] {}",
            annotations.network.to_uppercase(),
            annotations.vault
        ),
        value: format!("```\n{}\n```", truncate(&annotations.error, MAX_ERROR_CHARS)),
    }
}

/// message telling the operator that prometheus is posting to us instead of alertmanager
pub fn misconfiguration_notice() -> Message {
    Message::with_embed(Embed {
        title: MISCONFIGURED_TITLE.to_string(),
        description: MISCONFIGURED_DESCRIPTION.to_string(),
        color: EmbedColor::Grey,
        fields: Vec::new(),
    })
}

/// first `max_chars` characters of `s`
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
