use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::patterns::Direction;
use crate::store::PatternRecord;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

static CLIENT: OnceCell<Client> = OnceCell::new();

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync request failed: {0}")]
    Http(String),
    #[error("sync backend refused the payload: {0}")]
    Rejected(String),
    #[error("serialize failed: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// One flush attempt either went out or was skipped because another flush
/// was already in flight (a periodic timer firing mid-flush is a no-op).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Sent { stored: u64 },
    Skipped,
}

#[derive(Debug, Serialize)]
struct MissPayload<'a> {
    #[serde(rename = "warningRules")]
    warning_rules: &'a HashMap<String, PatternRecord>,
}

#[derive(Debug, Serialize)]
struct HitPayload<'a> {
    #[serde(rename = "successRules")]
    success_rules: &'a HashMap<String, PatternRecord>,
}

#[derive(Debug, Deserialize)]
struct SyncAck {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    stored_patterns: u64,
}

/// Remote snapshot of both pattern directions, as served by
/// `/fetch-patterns-db`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteSnapshot {
    #[serde(rename = "warningRules", default)]
    pub warning_rules: HashMap<String, PatternRecord>,
    #[serde(rename = "successRules", default)]
    pub success_rules: HashMap<String, PatternRecord>,
}

/// Serializes pattern snapshots to the remote backend and to downloadable
/// JSON. Failures never touch local state; retry is the scheduler's
/// concern, not ours.
pub struct SyncBridge {
    config: SyncConfig,
    in_flight: AtomicBool,
}

impl SyncBridge {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Pushes one direction's pattern map. Returns `Skipped` without
    /// sending anything when a flush is already running.
    pub fn flush(
        &self,
        direction: Direction,
        patterns: &HashMap<String, PatternRecord>,
    ) -> Result<FlushOutcome, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(FlushOutcome::Skipped);
        }
        let result = self.flush_inner(direction, patterns);
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn flush_inner(
        &self,
        direction: Direction,
        patterns: &HashMap<String, PatternRecord>,
    ) -> Result<FlushOutcome, SyncError> {
        let client = self.client()?;
        let (path, body) = match direction {
            Direction::Miss => (
                "/sync-patterns-db",
                serde_json::to_value(MissPayload {
                    warning_rules: patterns,
                }),
            ),
            Direction::Hit => (
                "/sync-success-db",
                serde_json::to_value(HitPayload {
                    success_rules: patterns,
                }),
            ),
        };
        let body = body.map_err(|err| SyncError::Serialize(err.to_string()))?;
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let resp = client
            .post(&url)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .map_err(|err| SyncError::Http(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(SyncError::Rejected(format!("http {status}: {text}")));
        }
        let ack = resp
            .json::<SyncAck>()
            .map_err(|err| SyncError::Http(err.to_string()))?;
        if !ack.ok {
            return Err(SyncError::Rejected("backend reported not ok".to_string()));
        }
        info!(
            direction = direction.label(),
            stored = ack.stored_patterns,
            "pattern sync flushed"
        );
        Ok(FlushOutcome::Sent {
            stored: ack.stored_patterns,
        })
    }

    /// Pulls both pattern maps from the backend for merge-on-load.
    pub fn fetch_remote(&self) -> Result<RemoteSnapshot, SyncError> {
        let client = self.client()?;
        let url = format!(
            "{}/fetch-patterns-db",
            self.config.base_url.trim_end_matches('/')
        );
        let resp = client
            .get(&url)
            .timeout(self.config.timeout)
            .send()
            .map_err(|err| SyncError::Http(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Rejected(format!("http {status}")));
        }
        resp.json::<RemoteSnapshot>()
            .map_err(|err| SyncError::Http(err.to_string()))
    }

    fn client(&self) -> Result<&'static Client, SyncError> {
        CLIENT.get_or_try_init(|| {
            Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .map_err(|err| {
                    warn!(%err, "http client build failed");
                    SyncError::Http(err.to_string())
                })
        })
    }
}

/// Pretty-printed export of one direction's pattern map, with a
/// deterministic timestamped filename.
pub fn export_pretty(
    direction: Direction,
    patterns: &HashMap<String, PatternRecord>,
) -> Result<(String, String), SyncError> {
    let body = serde_json::to_string_pretty(patterns)
        .map_err(|err| SyncError::Serialize(err.to_string()))?;
    let prefix = match direction {
        Direction::Miss => "miss",
        Direction::Hit => "hit",
    };
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    Ok((format!("{prefix}_patterns_{stamp}.json"), body))
}
