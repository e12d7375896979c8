//! Host major-version detection.
//!
//! The major version is the second dot-separated component of the host's
//! version string (`10.11.2` -> `11`). Detection polls the host until a
//! version is reported or the poll window closes; a detected version is
//! cached for the life of the resolver and never queried again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;

/// What the host reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentity {
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    pub server_version: Option<String>,
}

/// Source of host identity information.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostInfo: Send + Sync {
    /// Current identity. Fields may be `None` while the host is starting.
    async fn identity(&self) -> Result<HostIdentity>;
}

/// A host whose identity never changes.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    identity: HostIdentity,
}

impl StaticHost {
    pub fn new(identity: HostIdentity) -> Self {
        Self { identity }
    }

    /// Host reporting only a server version.
    pub fn server(version: impl Into<String>) -> Self {
        Self::new(HostIdentity {
            server_version: Some(version.into()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl HostInfo for StaticHost {
    async fn identity(&self) -> Result<HostIdentity> {
        Ok(self.identity.clone())
    }
}

/// Extract the major version (second numeric segment) from a version string.
pub fn parse_major_version(version: &str) -> Option<u32> {
    let segment = version.trim().split('.').nth(1)?;
    let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Cached, polling major-version resolver.
pub struct VersionResolver {
    host: Arc<dyn HostInfo>,
    web_client_app_name: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    cached: OnceCell<u32>,
}

impl VersionResolver {
    pub fn new(host: Arc<dyn HostInfo>, config: &EngineConfig) -> Self {
        Self {
            host,
            web_client_app_name: config.web_client_app_name.clone(),
            poll_interval: config.version_poll_interval(),
            poll_timeout: config.version_poll_timeout(),
            cached: OnceCell::new(),
        }
    }

    /// Cached value without polling.
    pub fn cached(&self) -> Option<u32> {
        self.cached.get().copied()
    }

    /// Resolve the major version, polling the host if needed.
    ///
    /// Returns `None` if nothing usable was reported within the poll window.
    /// A `None` result is not cached, so a later call polls again.
    pub async fn major_version(&self) -> Option<u32> {
        if let Some(major) = self.cached() {
            return Some(major);
        }

        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            if let Some(major) = self.probe().await {
                let major = *self.cached.get_or_init(|| major);
                info!(major_version = major, "Detected host major version");
                return Some(major);
            }
            if tokio::time::Instant::now() + self.poll_interval > deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        warn!(
            timeout_ms = self.poll_timeout.as_millis() as u64,
            "Host version unavailable, version gating disabled"
        );
        None
    }

    async fn probe(&self) -> Option<u32> {
        let identity = match self.host.identity().await {
            Ok(identity) => identity,
            Err(e) => {
                debug!(error = %e, "Host identity not available yet");
                return None;
            }
        };

        let is_web_client = identity.app_name.as_deref() == Some(self.web_client_app_name.as_str());
        let version = if is_web_client {
            identity.app_version
        } else {
            identity.server_version
        }?;
        parse_major_version(&version)
    }
}
