//! Server options.
//!
//! Options are read from the environment with in-cluster defaults:
//! - `WEBHOOK_BIND_ADDRESS` (default `0.0.0.0:9443`)
//! - `WEBHOOK_TLS_CERT_FILE` (default `/etc/webhook/certs/tls.crt`)
//! - `WEBHOOK_TLS_KEY_FILE` (default `/etc/webhook/certs/tls.key`)

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default webhook bind address
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9443";
/// Default path to webhook TLS certificate
pub const DEFAULT_CERT_FILE: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const DEFAULT_KEY_FILE: &str = "/etc/webhook/certs/tls.key";

pub const BIND_ADDRESS_ENV: &str = "WEBHOOK_BIND_ADDRESS";
pub const CERT_FILE_ENV: &str = "WEBHOOK_TLS_CERT_FILE";
pub const KEY_FILE_ENV: &str = "WEBHOOK_TLS_KEY_FILE";

/// Listener and TLS options for the webhook server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeOptions {
    /// `host:port` or `:port` for all interfaces
    pub bind_address: String,
    /// PEM certificate chain
    pub cert_file: PathBuf,
    /// PEM private key
    pub key_file: PathBuf,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            cert_file: PathBuf::from(DEFAULT_CERT_FILE),
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
        }
    }
}

impl ServeOptions {
    /// Read options from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through `lookup`, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            bind_address: lookup(BIND_ADDRESS_ENV).unwrap_or(defaults.bind_address),
            cert_file: lookup(CERT_FILE_ENV).map(PathBuf::from).unwrap_or(defaults.cert_file),
            key_file: lookup(KEY_FILE_ENV).map(PathBuf::from).unwrap_or(defaults.key_file),
        }
    }

    /// Reject options the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.trim().is_empty() {
            return Err(Error::Config("no bind address was specified".to_string()));
        }
        if self.cert_file.as_os_str().is_empty() {
            return Err(Error::Config("no certificate file was specified".to_string()));
        }
        if self.key_file.as_os_str().is_empty() {
            return Err(Error::Config("no key file was specified".to_string()));
        }
        Ok(())
    }

    /// Resolve the bind address to a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let address = self.bind_address.trim();
        let address = match address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => address.to_string(),
        };

        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(addr);
        }
        address
            .to_socket_addrs()
            .map_err(|e| Error::Config(format!("invalid bind address {address:?}: {e}")))?
            .next()
            .ok_or_else(|| Error::Config(format!("bind address {address:?} did not resolve")))
    }
}
