//! Role health probes gating the creation of dependent roles.
//!
//! A probe error is a negative health signal, never a failure of the tick.

use std::time::Duration;

use async_trait::async_trait;
use keel_model::TaskRecord;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::Config;
use crate::error::CoreError;

/// TCP connect timeout of the datastore probe.
pub const DATASTORE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Connect and read timeout of the control-plane probe.
pub const SERVER_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Healthy if any of the `running` datastore records accepts a connection.
    async fn datastore(&self, running: &[TaskRecord]) -> bool;

    /// Healthy if the control-plane API answers at all.
    async fn server(&self, cfg: &Config) -> bool;
}

/// Probes over the network.
pub struct NetProbe {
    http: reqwest::Client,
}

impl NetProbe {
    pub fn new(cfg: &Config) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .connect_timeout(SERVER_PROBE_TIMEOUT)
            .read_timeout(SERVER_PROBE_TIMEOUT)
            .timeout(SERVER_PROBE_TIMEOUT * 2)
            .tls_danger_accept_invalid_certs(cfg.bootstrap.skip_ssl)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HealthProbe for NetProbe {
    async fn datastore(&self, running: &[TaskRecord]) -> bool {
        for rec in running {
            let (Some(host), Some(port)) = (rec.agent_hostname.as_deref(), rec.first_host_port())
            else {
                continue;
            };
            match timeout(DATASTORE_PROBE_TIMEOUT, TcpStream::connect((host, port as u16))).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => debug!(id = %rec.id, %host, port, error = %e, "datastore probe failed"),
                Err(_) => debug!(id = %rec.id, %host, port, "datastore probe timed out"),
            }
        }
        false
    }

    async fn server(&self, cfg: &Config) -> bool {
        let url = format!("https://{}:{}/", cfg.server_hostname(), cfg.server.host_port);
        let mut req = self.http.get(&url);
        if !cfg.bootstrap.username.is_empty() {
            req = req.basic_auth(&cfg.bootstrap.username, Some(&cfg.bootstrap.password));
        }
        match req.send().await {
            Ok(resp) => {
                debug!(%url, status = resp.status().as_u16(), "server probe answered");
                true
            }
            Err(e) => {
                debug!(%url, error = %e, "server probe failed");
                false
            }
        }
    }
}
