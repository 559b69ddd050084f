use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use std::time::Duration;

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| EtlError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult> {
        let transport = |e: reqwest::Error| EtlError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let resp = self.client.get(url).send().await.map_err(transport)?;
        let status = resp.status().as_u16();
        let content_length: Option<u64> = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        // Don't pull error bodies; the status alone fails the fetch.
        let bytes = if resp.status().is_success() {
            resp.bytes().await.map_err(transport)?.to_vec()
        } else {
            Vec::new()
        };
        Ok(HttpGetResult { status, bytes, content_length })
    }
}
