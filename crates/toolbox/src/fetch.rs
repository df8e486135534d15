//! HTTP implementation of the module fetch interface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use toolbox_modules::{Error as FetchError, RemoteFetch};
use tracing::debug;

use crate::error::Result;

const TIMEOUT: Duration = Duration::from_secs(30);

/// GETs JSON with reqwest, optionally with a bearer token.
pub struct HttpFetch {
    client: Client,
    token: Option<String>,
}

impl HttpFetch {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .user_agent(concat!("ntr-toolbox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl RemoteFetch for HttpFetch {
    async fn get_json(&self, url: &str, use_auth: bool) -> toolbox_modules::Result<Value> {
        let fail = |message: String| FetchError::Fetch {
            url: url.to_string(),
            message,
        };
        let mut request = self.client.get(url);
        if use_auth && let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        debug!(url, auth = use_auth && self.token.is_some(), "fetch");
        let response = request.send().await.map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(status.to_string()));
        }
        response.json().await.map_err(|e| fail(e.to_string()))
    }
}
