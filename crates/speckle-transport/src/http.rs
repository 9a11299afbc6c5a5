// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speckle server remote
//!
//! REST endpoints used per stream:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | has | `POST /api/diff/{stream}` with `{"objects": "<json id array>"}` |
//! | upload | `POST /objects/{stream}` multipart, one JSON array part per batch |
//! | download | `POST /api/getobjects/{stream}`, answered with `id\tjson` lines |
//! | single | `GET /objects/{stream}/{id}/single` |
//!
//! Connection failures, timeouts, 429 and 5xx responses are retried with
//! exponential backoff and jitter; anything else is returned immediately.

use crate::config::{RetryPolicy, TransportConfig};
use crate::error::{is_retryable_status, Result, TransportError};
use crate::remote::RemoteStore;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Longest error body kept in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct ObjectsRequest {
    /// The server expects the id list as a JSON-encoded string.
    objects: String,
}

/// HTTP remote for one stream of a Speckle server.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    server: String,
    stream_id: String,
    token: Option<String>,
    retry: RetryPolicy,
    client: Client,
}

impl HttpRemote {
    /// Create a remote for `stream_id` on `server` (e.g. "https://speckle.xyz").
    pub fn new(
        server: impl Into<String>,
        stream_id: impl Into<String>,
        config: &TransportConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            server: server.into().trim_end_matches('/').to_string(),
            stream_id: stream_id.into(),
            token: None,
            retry: config.retry,
            client,
        })
    }

    /// Authenticate every request with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send the request built by `build`, retrying transient failures.
    ///
    /// Returns the first non-retryable response, successful or not.
    async fn execute<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let last = attempt >= self.retry.max_attempts;
            match self.authorize(build()?).send().await {
                Ok(response) if is_retryable_status(response.status().as_u16()) && !last => {
                    warn!(url, status = %response.status(), attempt, "transient HTTP status, retrying");
                }
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || e.is_timeout()) && !last => {
                    warn!(url, error = %e, attempt, "HTTP request failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
            attempt += 1;
        }
    }

    fn objects_request(ids: &[String]) -> Result<ObjectsRequest> {
        Ok(ObjectsRequest {
            objects: serde_json::to_string(ids)?,
        })
    }
}

/// Turn a non-success response into [`TransportError::Status`].
async fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    Err(TransportError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

/// Join record JSON texts into one JSON array without re-parsing them.
pub(crate) fn json_array<'a>(objects: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::from("[");
    for (i, json) in objects.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(json);
    }
    out.push(']');
    out
}

/// Parse a `getobjects` response: one `id\tjson` record per line.
pub(crate) fn parse_object_lines(body: &str) -> Result<Vec<(String, String)>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (id, json) = line.split_once('\t').ok_or_else(|| {
                TransportError::Protocol(format!(
                    "expected 'id<TAB>json', got {} bytes without a tab",
                    line.len()
                ))
            })?;
            if id.is_empty() {
                return Err(TransportError::Protocol("empty object id".into()));
            }
            Ok((id.to_string(), json.to_string()))
        })
        .collect()
}

impl RemoteStore for HttpRemote {
    async fn has_objects(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = self.url(&format!("/api/diff/{}", self.stream_id));
        let body = Self::objects_request(ids)?;

        let response = self
            .execute(&url, || Ok(self.client.post(&url).json(&body)))
            .await?;
        let response = check_status(&url, response).await?;
        let present: HashMap<String, bool> = response.json().await?;

        debug!(requested = ids.len(), present = present.values().filter(|v| **v).count(), "diff");
        Ok(present)
    }

    async fn upload_objects(&self, objects: &[(String, String)]) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        let url = self.url(&format!("/objects/{}", self.stream_id));
        let payload = json_array(objects.iter().map(|(_, json)| json.as_str()));
        let bytes = payload.len();

        let response = self
            .execute(&url, || {
                let part = Part::text(payload.clone())
                    .file_name("batch-1")
                    .mime_str("application/json")?;
                Ok(self.client.post(&url).multipart(Form::new().part("batch-1", part)))
            })
            .await?;
        check_status(&url, response).await?;

        debug!(objects = objects.len(), bytes, "uploaded batch");
        Ok(())
    }

    async fn download_objects(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(&format!("/api/getobjects/{}", self.stream_id));
        let body = Self::objects_request(ids)?;

        let response = self
            .execute(&url, || {
                Ok(self
                    .client
                    .post(&url)
                    .header(reqwest::header::ACCEPT, "text/plain")
                    .json(&body))
            })
            .await?;
        let text = check_status(&url, response).await?.text().await?;
        let objects = parse_object_lines(&text)?;

        debug!(requested = ids.len(), received = objects.len(), "downloaded batch");
        Ok(objects)
    }

    async fn download_single_object(&self, id: &str) -> Result<Option<String>> {
        let url = self.url(&format!("/objects/{}/{}/single", self.stream_id, id));

        let response = self.execute(&url, || Ok(self.client.get(&url))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = check_status(&url, response).await?.text().await?;
        Ok(Some(text))
    }
}
