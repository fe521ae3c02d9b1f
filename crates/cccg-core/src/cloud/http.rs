//! Realtime Database REST client.
//!
//! Every document is addressed as `<base>/<escaped path>.json`. Reads of an
//! empty location answer `null`; listings use `?shallow=true` so only child
//! names come back.

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use super::{CloudPath, CloudStore};
use crate::error::{PersistError, PersistResult};

/// Escape one path segment so a name can never leave its collection.
///
/// `.` and `..` have their dots replaced by `%2E` first; the result is then
/// percent-encoded like `encodeURIComponent`, so `..` ends up as
/// `%252E%252E` and `Ash/Alt` as `Ash%2FAlt`.
pub fn escape_segment(segment: &str) -> String {
    let dotted = if segment == "." || segment == ".." {
        segment.replace('.', "%2E")
    } else {
        segment.to_string()
    };
    encode_component(&dotted)
}

/// `encodeURIComponent` leaves `!*'()` alone; `urlencoding` does not.
fn encode_component(input: &str) -> String {
    urlencoding::encode(input)
        .replace("%21", "!")
        .replace("%2A", "*")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
}

/// Cloud store backed by the Realtime Database REST API
#[derive(Debug, Clone)]
pub struct HttpCloud {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpCloud {
    /// Create a client for a database root such as
    /// `https://example-default-rtdb.firebaseio.com`.
    ///
    /// No request timeout is configured; a hung call lasts until the
    /// transport gives up.
    pub fn new(base_url: &str) -> PersistResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        reqwest::Url::parse(trimmed)
            .map_err(|e| PersistError::Config(format!("invalid cloud url '{}': {}", base_url, e)))?;
        let client = Client::builder()
            .build()
            .map_err(|e| PersistError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: trimmed.to_string(),
            auth_token: None,
        })
    }

    /// Attach a database auth token, sent as the `auth` query parameter
    pub fn with_auth(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Database root this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full document URL for a path (without query parameters)
    pub fn url_for(&self, path: &CloudPath) -> String {
        let escaped: Vec<String> = path.segments().iter().map(|s| escape_segment(s)).collect();
        format!("{}/{}.json", self.base_url, escaped.join("/"))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }

    /// Send a request and return the body text of a 2xx response.
    async fn send(&self, request: RequestBuilder) -> PersistResult<String> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| PersistError::NetworkUnreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PersistError::NetworkUnreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(PersistError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn parse_body(body: &str) -> PersistResult<Value> {
        serde_json::from_str(body).map_err(|e| PersistError::MalformedResponse(e.to_string()))
    }
}

impl CloudStore for HttpCloud {
    async fn put(&self, path: &CloudPath, body: &Value) -> PersistResult<()> {
        let url = self.url_for(path);
        debug!(%url, "PUT cloud document");
        self.send(self.client.put(&url).json(body)).await?;
        Ok(())
    }

    async fn get(&self, path: &CloudPath) -> PersistResult<Option<Value>> {
        let url = self.url_for(path);
        debug!(%url, "GET cloud document");
        let body = self.send(self.client.get(&url)).await?;
        match Self::parse_body(&body)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    async fn delete(&self, path: &CloudPath) -> PersistResult<()> {
        let url = self.url_for(path);
        debug!(%url, "DELETE cloud document");
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn list_children(&self, path: &CloudPath) -> PersistResult<Vec<String>> {
        let url = self.url_for(path);
        debug!(%url, "GET shallow cloud listing");
        let body = self
            .send(self.client.get(&url).query(&[("shallow", "true")]))
            .await?;
        match Self::parse_body(&body)? {
            Value::Null => Ok(Vec::new()),
            Value::Object(children) => Ok(children.keys().cloned().collect()),
            other => Err(PersistError::MalformedResponse(format!(
                "expected an object listing at {}, got {}",
                path, other
            ))),
        }
    }
}
