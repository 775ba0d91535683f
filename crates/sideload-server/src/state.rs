//! Application state for the Sideload server.

use std::net::SocketAddr;
use std::sync::Arc;

use sideload_core::config::SideloadConfig;
use sideload_core::crypto::CredentialCipher;
use sideload_core::pipeline::{ProcessRunner, SigningPipeline, ToolRunner};
use sideload_core::vault::CredentialVault;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:3003";

/// Server configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind: SocketAddr,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// `bind_override` (from the command line) wins over `SIDELOAD_BIND`.
    pub fn from_env(bind_override: Option<SocketAddr>) -> Result<Self, String> {
        let bind = match bind_override {
            Some(addr) => addr,
            None => {
                let raw = std::env::var("SIDELOAD_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
                raw.parse()
                    .map_err(|e| format!("Invalid SIDELOAD_BIND '{}': {}", raw, e))?
            }
        };

        Ok(Self { bind })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Core configuration.
    pub config: Arc<SideloadConfig>,
    /// Encrypted per-identity credential storage.
    pub vault: Arc<CredentialVault>,
    /// Runs the modification and signing tools.
    pub runner: Arc<dyn ToolRunner>,
}

impl AppState {
    /// Creates a new application state that launches real tool processes.
    pub fn new(config: SideloadConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new()))
    }

    /// Creates a new application state with a custom tool runner.
    pub fn with_runner(config: SideloadConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let cipher = CredentialCipher::new(config.encryption_key.clone());
        let vault = CredentialVault::new(config.work_dirs.users(), cipher);
        Self {
            config: Arc::new(config),
            vault: Arc::new(vault),
            runner,
        }
    }

    /// Borrows a signing pipeline over this state.
    pub fn pipeline(&self) -> SigningPipeline<'_> {
        SigningPipeline::new(&self.config, &self.vault, self.runner.as_ref())
    }
}
