//! Connection management for a single service host
//!
//! [`ConnectionManager`] owns at most one [`ConnectionHandle`]. With keep-alive
//! enabled the handle is reused across requests until it is discarded or
//! replaced; without keep-alive every request gets a fresh one.

pub mod connection;
pub(crate) mod probe;
pub mod tls;

pub use connection::ConnectionHandle;

use crate::config::{ServiceConfig, Transport};
use crate::constants::transport::{DEFAULT_PLAIN_PORT, DEFAULT_TLS_PORT};
use crate::error::ServiceError;
use rustls::ClientConfig;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Where and how to connect.
#[derive(Clone)]
pub(crate) struct Endpoint {
    /// Host as configured, used for the `Host` header and in errors
    pub(crate) authority: String,
    pub(crate) hostname: String,
    pub(crate) port: u16,
    pub(crate) timeout: Duration,
    pub(crate) tls: Option<Arc<ClientConfig>>,
    /// Keep a socket probe on each connection for stale checks
    pub(crate) managed_runtime: bool,
}

impl Endpoint {
    fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let (tls, default_port) = match config.transport {
            Transport::Tls => (Some(tls::client_config()?), DEFAULT_TLS_PORT),
            Transport::Plain => (None, DEFAULT_PLAIN_PORT),
        };
        let (hostname, port) = split_host_port(&config.host, default_port);

        Ok(Endpoint {
            authority: config.host.clone(),
            hostname,
            port,
            timeout: config.timeout(),
            tls,
            managed_runtime: config.managed_runtime,
        })
    }
}

/// Splits `host[:port]`, accepting bracketed IPv6 literals.
pub(crate) fn split_host_port(host: &str, default_port: u16) -> (String, u16) {
    if let Some(rest) = host.strip_prefix('[')
        && let Some((address, tail)) = rest.split_once(']')
    {
        let port = tail
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_port);
        return (address.to_string(), port);
    }

    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => match port.parse() {
            Ok(port) => (name.to_string(), port),
            Err(_) => (host.to_string(), default_port),
        },
        _ => (host.to_string(), default_port),
    }
}

/// Owns the connection slot of one service client.
pub struct ConnectionManager {
    endpoint: Endpoint,
    keep_alive: bool,
    slot: Option<ConnectionHandle>,
    opened: u64,
}

impl ConnectionManager {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        Ok(ConnectionManager {
            endpoint: Endpoint::from_config(config)?,
            keep_alive: config.keep_alive,
            slot: None,
            opened: 0,
        })
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Host as configured, including any explicit port
    pub fn authority(&self) -> &str {
        &self.endpoint.authority
    }

    pub fn timeout(&self) -> Duration {
        self.endpoint.timeout
    }

    pub fn has_connection(&self) -> bool {
        self.slot.is_some()
    }

    /// Number of connections opened over the manager's lifetime
    pub fn connections_opened(&self) -> u64 {
        self.opened
    }

    /// Returns the stored connection when keep-alive is on, otherwise opens a new one.
    /// Does not check the stored connection for staleness.
    pub async fn ensure_connection(&mut self) -> Result<&mut ConnectionHandle, ServiceError> {
        let handle = match self.slot.take() {
            Some(handle) if self.keep_alive => handle,
            previous => {
                if let Some(old) = previous {
                    old.close();
                }
                self.open().await?
            }
        };
        Ok(self.slot.insert(handle))
    }

    /// Reports whether the stored connection is unusable: missing, shut down,
    /// or half-closed by the peer. `Err` means the socket state is unknown,
    /// which is always the case outside the managed runtime.
    pub fn is_stale(&self) -> io::Result<bool> {
        match &self.slot {
            Some(handle) => handle.peer_closed(),
            None => Ok(true),
        }
    }

    /// Closes the stored connection, if any.
    pub fn discard(&mut self) {
        if let Some(handle) = self.slot.take() {
            debug!("Discarding connection {}", handle.id());
            handle.close();
        }
    }

    /// Discards the stored connection and opens a fresh one.
    pub async fn replace(&mut self) -> Result<&mut ConnectionHandle, ServiceError> {
        self.discard();
        let handle = self.open().await?;
        Ok(self.slot.insert(handle))
    }

    /// Moves the stored connection out of the slot.
    pub fn take(&mut self) -> Option<ConnectionHandle> {
        self.slot.take()
    }

    #[cfg(test)]
    pub(crate) fn connection_mut(&mut self) -> Option<&mut ConnectionHandle> {
        self.slot.as_mut()
    }

    async fn open(&mut self) -> Result<ConnectionHandle, ServiceError> {
        self.opened += 1;
        ConnectionHandle::open(&self.endpoint, self.opened).await
    }
}
