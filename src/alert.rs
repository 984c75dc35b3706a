//! data structures for deserializing incoming alerts
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// data from prometheus received by the alertmanager webhook receiver
///
/// `alerts` is the only mandatory key. That's what tells an alertmanager
/// notification apart from a single alert posted by prometheus itself.
pub struct Data {
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub group_key: String,
	#[serde(default)]
	pub truncated_alerts: u64,
	#[serde(default)]
	pub receiver: String,
	#[serde(default)]
	pub status: String,
	pub alerts: Vec<Alert>,
	#[serde(default)]
	pub group_labels: HashMap<String, String>,
	#[serde(default)]
	pub common_labels: HashMap<String, String>,
	#[serde(default)]
	pub common_annotations: Annotations,
	#[serde(default, rename = "externalURL")]
	pub external_url: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// a single alert inside of [Data]
pub struct Alert {
	#[serde(default)]
	pub status: String,
	#[serde(default)]
	pub labels: HashMap<String, String>,
	#[serde(default)]
	pub annotations: Annotations,
	#[serde(default, deserialize_with = "lenient_timestamp")]
	pub starts_at: Option<DateTime<Utc>>,
	#[serde(default, deserialize_with = "lenient_timestamp")]
	pub ends_at: Option<DateTime<Utc>>,
	#[serde(default, rename = "generatorURL")]
	pub generator_url: String,
	#[serde(default)]
	pub fingerprint: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
/// annotations we know how to render, everything else is ignored
pub struct Annotations {
	pub description: String,
	pub summary: String,
	pub error: String,
	pub vault: String,
	pub network: String,
}

/// Timestamps are never rendered, one we can't parse mustn't cost us the
/// whole notification.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
	D: Deserializer<'de>,
{
	let timestamp = Option::<String>::deserialize(deserializer)?;

	Ok(timestamp
		.and_then(|timestamp| DateTime::parse_from_rfc3339(&timestamp).ok())
		.map(|timestamp| timestamp.with_timezone(&Utc)))
}

impl Alert {
	/// status of the alert
	pub fn status(&self) -> AlertStatus {
		AlertStatus::from(self.status.as_str())
	}

	/// The instance the alert is about. Alerts scraped through a local
	/// exporter carry `localhost` in `instance`, the real host is in
	/// `exported_instance` then.
	pub fn instance(&self) -> Option<&str> {
		let instance = self.labels.get("instance").map(String::as_str);
		let exported = self.labels.get("exported_instance").map(String::as_str);

		match (instance, exported) {
			(Some(instance), Some(exported))
				if instance.contains("localhost") && !exported.is_empty() =>
			{
				Some(exported)
			}
			(instance, _) => instance,
		}
	}
}

/// Status of an [Alert]. Alertmanager only knows `firing` and `resolved`,
/// anything else is kept as is.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AlertStatus {
	Firing,
	Resolved,
	Other(String),
}

impl From<&str> for AlertStatus {
	fn from(status: &str) -> Self {
		match status {
			"firing" => Self::Firing,
			"resolved" => Self::Resolved,
			other => Self::Other(other.to_string()),
		}
	}
}

impl AlertStatus {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Firing => "firing",
			Self::Resolved => "resolved",
			Self::Other(status) => status.as_str(),
		}
	}
}

/// Alert in the shape prometheus sends to alertmanager's api. We only get
/// these if prometheus was configured to talk to us directly, so `labels` is
/// all we look at.
#[derive(Clone, Debug, Deserialize)]
pub struct RawAlert {
	pub labels: HashMap<String, String>,
}

/// prometheus posts lists of alerts, a single object is accepted as well
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAlerts {
	One(RawAlert),
	Many(Vec<RawAlert>),
}

impl RawAlerts {
	fn into_vec(self) -> Vec<RawAlert> {
		match self {
			Self::One(alert) => vec![alert],
			Self::Many(alerts) => alerts,
		}
	}
}

/// Error returned by [decode]
#[derive(Error, Debug)]
pub enum DecodeError {
	/// the body is one or more raw prometheus alerts instead of an
	/// alertmanager notification
	#[error("received {alerts} raw prometheus alert(s) instead of an alertmanager notification")]
	MisconfiguredSender { alerts: usize, alertnames: Vec<String> },
	/// the body is neither
	#[error("malformed alertmanager notification: {0}")]
	Malformed(#[source] serde_json::Error),
}

/// Decodes a request body into [Data].
///
/// If that fails we try again with the shape of raw prometheus alerts to
/// tell a misconfigured sender apart from garbage.
pub fn decode(body: &[u8]) -> Result<Data, DecodeError> {
	let err = match serde_json::from_slice::<Data>(body) {
		Ok(data) => return Ok(data),
		Err(err) => err,
	};

	let raw = match serde_json::from_slice::<RawAlerts>(body) {
		Ok(raw) => raw.into_vec(),
		Err(_) => return Err(DecodeError::Malformed(err)),
	};

	if raw.is_empty() {
		return Err(DecodeError::Malformed(err));
	}

	Err(DecodeError::MisconfiguredSender {
		alerts: raw.len(),
		alertnames: raw
			.into_iter()
			.filter_map(|mut alert| alert.labels.remove("alertname"))
			.collect(),
	})
}
