// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TLS mode selection for the raw-TCP transport. Building a custom trust
//! store from scratch is left to the caller -- this module only resolves
//! a mode into a ready `rustls` config; callers who need non-default
//! trust roots build their own `rustls::ClientConfig` and pass it in as
//! `TlsMode::Custom`.

use std::sync::Arc;

use rustls::ClientConfig as RustlsClientConfig;

use crate::error::{ProtocolError, Result};

/// How (or whether) the raw-TCP transport should wrap its socket in TLS.
#[derive(Clone)]
pub enum TlsMode {
    /// Plain TCP, no TLS.
    None,
    /// Build a default context from the platform's native trust roots.
    Default,
    /// Use a caller-supplied `rustls::ClientConfig`.
    Custom(Arc<RustlsClientConfig>),
}

impl std::fmt::Debug for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsMode::None => f.write_str("TlsMode::None"),
            TlsMode::Default => f.write_str("TlsMode::Default"),
            TlsMode::Custom(_) => f.write_str("TlsMode::Custom(..)"),
        }
    }
}

impl TlsMode {
    /// Resolve this mode into a `rustls::ClientConfig`, or `None` for
    /// plain TCP.
    pub fn resolve(&self) -> Result<Option<Arc<RustlsClientConfig>>> {
        match self {
            TlsMode::None => Ok(None),
            TlsMode::Custom(cfg) => Ok(Some(cfg.clone())),
            TlsMode::Default => {
                let mut roots = rustls::RootCertStore::empty();
                let native = rustls_native_certs::load_native_certs();
                for err in &native.errors {
                    tracing::warn!("failed to load a native cert: {err}");
                }
                for cert in native.certs {
                    roots.add(cert).map_err(|e| {
                        ProtocolError::Internal(format!(
                            "invalid native root certificate: {e}"
                        ))
                    })?;
                }
                let cfg = RustlsClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                Ok(Some(Arc::new(cfg)))
            },
        }
    }
}
