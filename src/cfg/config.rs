// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{TlsSetting, TransportKind, WritePolicy};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Nodes the client may connect to, tried in pool order (or a random
    /// start index, per `pool.random_start`).
    pub pool: PoolConfig,
    /// Username/password (or token) presented during authentication.
    pub auth: AuthConfig,
    /// Connect/read/write/request timeouts.
    pub timeouts: TimeoutConfig,
    /// Reconnect backoff schedule.
    pub backoff: BackoffConfig,
    /// Runtime behavior knobs that do not affect the wire.
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PoolConfig {
    /// Candidate nodes, tried in order on (re)connect.
    pub nodes: Vec<NodeConfig>,
    /// Start from a random index in `nodes` instead of always index 0.
    #[serde(default)]
    pub random_start: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NodeConfig {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Transport", default = "default_transport")]
    pub transport: TransportKind,
    #[serde(rename = "Tls", default = "default_tls")]
    pub tls: TlsSetting,
}

fn default_transport() -> TransportKind {
    TransportKind::Tcp
}
fn default_tls() -> TlsSetting {
    TlsSetting::None
}

/// Either a token string, or a (username, password) pair (§3 "Auth
/// credential"). Exactly one of the two shapes must be present; enforced
/// by [`Config::validate_and_normalize`].
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AuthConfig {
    #[serde(default, rename = "Token")]
    pub token: Option<String>,
    #[serde(default, rename = "Username")]
    pub username: Option<String>,
    #[serde(default, rename = "Password")]
    pub password: Option<String>,
    /// Scope to select by default when none is given to `query`/`run`.
    #[serde(default, rename = "DefaultScope")]
    pub default_scope: Option<String>,
}

/// The resolved shape of an [`AuthConfig`], ready to be packed into an
/// `AUTH` request body (§6: "AUTH: token-string OR [username,
/// password]").
#[derive(Debug, Clone)]
pub enum AuthCredential {
    Token(String),
    UserPass { username: String, password: String },
}

impl AuthConfig {
    pub fn credential(&self) -> AuthCredential {
        match &self.token {
            Some(token) => AuthCredential::Token(token.clone()),
            None => AuthCredential::UserPass {
                username: self.username.clone().unwrap_or_default(),
                password: self.password.clone().unwrap_or_default(),
            },
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimeoutConfig {
    #[serde(rename = "Connect", with = "serde_secs", default = "default_connect_timeout")]
    pub connect: Duration,
    #[serde(rename = "Io", with = "serde_secs")]
    pub io: Duration,
    /// Per-attempt timeout for the AUTH request during (re)connect.
    #[serde(rename = "Auth", with = "serde_secs", default = "default_auth_timeout")]
    pub auth: Duration,
    /// Default per-request timeout applied when a caller does not supply
    /// one of their own; `None` means wait indefinitely.
    #[serde(default, rename = "Request", with = "serde_secs_opt")]
    pub request: Option<Duration>,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_auth_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BackoffConfig {
    #[serde(rename = "InitialWait", with = "serde_secs")]
    pub initial_wait: Duration,
    #[serde(rename = "MaxWait", with = "serde_secs")]
    pub max_wait: Duration,
    #[serde(rename = "InitialTimeout", with = "serde_secs")]
    pub initial_timeout: Duration,
    #[serde(rename = "MaxTimeout", with = "serde_secs")]
    pub max_timeout: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(60),
            initial_timeout: Duration::from_secs(2),
            max_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Reconnect automatically on unsolicited disconnects and on a
    /// `NODE_STATUS` push announcing the node is shutting down.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Policy applied to write-style requests issued while not `Ready`.
    #[serde(default)]
    pub write_policy: WritePolicy,
    /// Directory to dump payloads that failed to decode, for later
    /// inspection. `None` disables dumping.
    #[serde(default)]
    pub payload_dump_dir: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.pool.nodes.is_empty(), "pool.nodes must not be empty");
        for node in &self.pool.nodes {
            ensure!(!node.host.is_empty(), "pool node Host must not be empty");
        }
        match &self.auth.token {
            Some(token) => ensure!(!token.is_empty(), "auth.Token must not be empty"),
            None => {
                ensure!(
                    self.auth.username.as_deref().is_some_and(|u| !u.is_empty()),
                    "auth.Username must not be empty when auth.Token is absent"
                );
            },
        }

        if self.backoff.max_wait < self.backoff.initial_wait {
            self.backoff.max_wait = self.backoff.initial_wait;
        }
        if self.backoff.max_timeout < self.backoff.initial_timeout {
            self.backoff.max_timeout = self.backoff.initial_timeout;
        }

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// As [`serde_secs`], but for an optional field (absent/`null` means
/// "no timeout").
mod serde_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}
