use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::DaemonError;
use crate::types::{
    fs_name, Capacity, DirEntry, FsRequest, ListEntriesResponse, ListRemotesResponse, NameRequest,
    VersionInfo,
};
use crate::Daemon;

pub const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:5572";

/// Independent time box for each kind of call.
#[derive(Debug, Clone, Copy)]
pub struct CallTimeouts {
    pub list_remotes: Duration,
    pub about: Duration,
    pub reconnect: Duration,
    pub version: Duration,
    pub list_entries: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        CallTimeouts {
            list_remotes: Duration::from_secs(5),
            about: Duration::from_secs(10),
            reconnect: Duration::from_secs(30),
            version: Duration::from_secs(5),
            list_entries: Duration::from_secs(15),
        }
    }
}

/// HTTP RPC client for the local storage daemon.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    base_url: String,
    http: Client,
    credentials: Option<(String, String)>,
    timeouts: CallTimeouts,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        DaemonClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
            credentials: None,
            timeouts: CallTimeouts::default(),
        }
    }

    /// Basic credentials the daemon was started with, if any.
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), pass.into()));
        self
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, R>(&self, call: &'static str, body: &B, timeout: Duration) -> Result<R, DaemonError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, call);
        let mut req = self.http.post(url).timeout(timeout).json(body);
        if let Some((user, pass)) = &self.credentials {
            req = req.basic_auth(user, Some(pass));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DaemonError::transport(call, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .map_err(|e| DaemonError::transport(call, e))?;
            let err = DaemonError::from_status(call, status.as_u16(), &text);
            debug!("{} failed ({:?}): {}", call, err.kind(), err.message());
            return Err(err);
        }

        resp.json::<R>()
            .await
            .map_err(|e| DaemonError::transport(call, e))
    }
}

#[async_trait]
impl Daemon for DaemonClient {
    async fn list_remotes(&self) -> Result<Vec<String>, DaemonError> {
        let resp: ListRemotesResponse = self
            .call("config/listremotes", &serde_json::json!({}), self.timeouts.list_remotes)
            .await?;
        Ok(resp.remotes.unwrap_or_default())
    }

    async fn about(&self, remote: &str) -> Result<Capacity, DaemonError> {
        let body = FsRequest {
            fs: fs_name(remote),
            remote: None,
        };
        self.call("operations/about", &body, self.timeouts.about)
            .await
    }

    async fn reconnect(&self, remote: &str) -> Result<(), DaemonError> {
        let body = NameRequest {
            name: remote.trim_end_matches(':'),
        };
        let _: IgnoredAny = self
            .call("config/reconnect", &body, self.timeouts.reconnect)
            .await?;
        Ok(())
    }

    async fn version(&self) -> Result<VersionInfo, DaemonError> {
        self.call("core/version", &serde_json::json!({}), self.timeouts.version)
            .await
    }

    async fn list_entries(&self, remote: &str, path: &str) -> Result<Vec<DirEntry>, DaemonError> {
        let body = FsRequest {
            fs: fs_name(remote),
            remote: Some(path.trim_start_matches('/')),
        };
        let resp: ListEntriesResponse = self
            .call("operations/list", &body, self.timeouts.list_entries)
            .await?;
        Ok(resp.list)
    }
}
