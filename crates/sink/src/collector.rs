//! Splunk HTTP Event Collector sink.
//!
//! Every record is POSTed on its own to `/services/collector/event`:
//!
//! ```text
//! Authorization: Splunk <token>
//! {"event": "<rendered record>", "time": 1700000000.123, "host": "...", "index": "...", ...}
//! ```
//!
//! Labels that are not configured are left out of the body. Any non-2xx status,
//! a non-zero `code` in the collector's reply, a transport error or a timeout is
//! a [`DeliveryError`].

use std::time::Duration;

use async_trait::async_trait;
use kubewatch_core::{ConfigurationError, DeliveryError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::Sink;

const NAME: &str = "collector";
const EVENT_PATH: &str = "/services/collector/event";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Metadata attached to every event sent to the collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventLabels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcetype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Full event endpoint URL.
    pub url: String,
    pub token: String,
    pub labels: EventLabels,
    /// Skip TLS certificate verification (self-signed collectors).
    pub insecure: bool,
    pub timeout: Duration,
}

impl CollectorSettings {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            labels: EventLabels::default(),
            insecure: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read settings from the process environment. `Ok(None)` when
    /// `SPLUNK_HEC_HOST` is unset, meaning no collector is configured.
    pub fn from_env() -> Result<Option<Self>, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`CollectorSettings::from_env`] with an explicit variable lookup.
    ///
    /// Once `SPLUNK_HEC_HOST` is present, `SPLUNK_HEC_PORT` and `SPLUNK_HEC_TOKEN`
    /// are required. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigurationError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let Some(host) = get("SPLUNK_HEC_HOST") else {
            return Ok(None);
        };
        let port = get("SPLUNK_HEC_PORT").ok_or(ConfigurationError::MissingEnv("SPLUNK_HEC_PORT"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigurationError::InvalidValue { name: "SPLUNK_HEC_PORT", value: port.clone() })?;
        let token = get("SPLUNK_HEC_TOKEN").ok_or(ConfigurationError::MissingEnv("SPLUNK_HEC_TOKEN"))?;
        let scheme = get("SPLUNK_HEC_SCHEME").unwrap_or_else(|| "https".to_string());
        if scheme != "https" && scheme != "http" {
            return Err(ConfigurationError::InvalidValue { name: "SPLUNK_HEC_SCHEME", value: scheme });
        }
        let insecure = match get("SPLUNK_HEC_INSECURE") {
            None => false,
            Some(v) => parse_bool(&v).ok_or(ConfigurationError::InvalidValue { name: "SPLUNK_HEC_INSECURE", value: v })?,
        };
        let timeout = match get("SPLUNK_HEC_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Some(v) => v
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigurationError::InvalidValue { name: "SPLUNK_HEC_TIMEOUT_SECS", value: v })?,
        };

        Ok(Some(Self {
            url: format!("{scheme}://{host}:{port}{EVENT_PATH}"),
            token,
            labels: EventLabels {
                host: get("SPLUNK_HOST"),
                index: get("SPLUNK_INDEX"),
                source: get("SPLUNK_SOURCE"),
                sourcetype: get("SPLUNK_SOURCETYPE"),
            },
            insecure,
            timeout,
        }))
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Serialize)]
struct HecEvent<'a> {
    event: &'a str,
    time: f64,
    #[serde(flatten)]
    labels: &'a EventLabels,
}

#[derive(Deserialize)]
struct HecReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    code: i64,
}

/// HEC client shared by all watch loops.
pub struct HecSink {
    client: Client,
    settings: CollectorSettings,
    auth: String,
}

impl HecSink {
    pub fn new(settings: CollectorSettings) -> Result<Self, ConfigurationError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .danger_accept_invalid_certs(settings.insecure)
            .build()
            .map_err(|e| ConfigurationError::Collector(format!("failed to build HTTP client: {e}")))?;
        let auth = format!("Splunk {}", settings.token);
        Ok(Self { client, settings, auth })
    }

    pub fn url(&self) -> &str {
        &self.settings.url
    }
}

#[async_trait]
impl Sink for HecSink {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn write(&self, line: &str) -> Result<(), DeliveryError> {
        let body = HecEvent {
            event: line,
            time: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            labels: &self.settings.labels,
        };
        let url = self.settings.url.as_str();

        let response = match self.client.post(url).header("Authorization", &self.auth).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(url, error = %e, "collector unreachable");
                return Err(DeliveryError::Transport { sink: NAME, message: e.to_string() });
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(url, status = %status, body = %text, "collector rejected event");
            return Err(DeliveryError::Rejected { sink: NAME, status: status.as_u16(), body: text });
        }
        // A 2xx without a parseable reply is taken as accepted.
        if let Ok(reply) = serde_json::from_str::<HecReply>(&text) {
            if reply.code != 0 {
                error!(url, code = reply.code, text = %reply.text, "collector refused event");
                return Err(DeliveryError::Refused { sink: NAME, code: reply.code, text: reply.text });
            }
        }
        debug!(url, status = %status, "event delivered to collector");
        Ok(())
    }
}
