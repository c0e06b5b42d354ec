use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{Identity, Method, StatusCode};
use serde_json::Value;

use crate::config::{AuthMaterial, SessionConfig};
use crate::LxdError;

/// Thin JSON-over-HTTP(S) wrapper around one control-plane endpoint.
#[derive(Debug)]
pub(crate) struct ApiClient {
    http: Client,
    base_url: String,
    api_version: String,
}

impl ApiClient {
    pub(crate) fn new(config: &SessionConfig, material: &AuthMaterial) -> Result<Self, LxdError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .danger_accept_invalid_certs(!config.verify_tls);
        if let AuthMaterial::Certificate {
            cert_file,
            key_file,
        } = material
        {
            builder = builder.identity(load_identity(cert_file, key_file)?);
        }
        let http = builder
            .build()
            .map_err(|error| LxdError::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            api_version: config.api_version.trim().trim_matches('/').to_string(),
        })
    }

    /// `/<version>/<suffix>`, or `/<version>` for an empty suffix.
    pub(crate) fn api_path(&self, suffix: &str) -> String {
        let suffix = suffix.trim_start_matches('/');
        if suffix.is_empty() {
            return format!("/{}", self.api_version);
        }
        format!("/{}/{suffix}", self.api_version)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response, LxdError> {
        tracing::debug!(method = %method, path = path, "lxd api request");
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().map_err(|source| LxdError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            source,
        })
    }

    /// Sends a request and returns only the response status.
    pub(crate) fn status_of(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<StatusCode, LxdError> {
        Ok(self.send(method, path, body)?.status())
    }

    pub(crate) fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, LxdError> {
        let response = self.send(method.clone(), path, body)?;
        let status = response.status();
        let raw = response.text().map_err(|source| LxdError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(LxdError::HttpStatus {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                detail: error_detail(&raw),
            });
        }
        serde_json::from_str(&raw).map_err(|error| LxdError::Protocol {
            method: method.to_string(),
            path: path.to_string(),
            detail: format!("response is not valid JSON: {error}"),
        })
    }

    /// Fetches a raw text artifact such as a recorded exec output file.
    pub(crate) fn get_text(&self, path: &str) -> Result<String, LxdError> {
        let response = self.send(Method::GET, path, None)?;
        let status = response.status();
        let text = response.text().map_err(|source| LxdError::Transport {
            method: Method::GET.to_string(),
            path: path.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(LxdError::HttpStatus {
                method: Method::GET.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                detail: error_detail(&text),
            });
        }
        Ok(text)
    }
}

fn load_identity(cert_file: &Path, key_file: &Path) -> Result<Identity, LxdError> {
    let mut pem = std::fs::read(cert_file).map_err(|error| {
        LxdError::Config(format!(
            "failed to read client certificate {}: {error}",
            cert_file.display()
        ))
    })?;
    let key = std::fs::read(key_file).map_err(|error| {
        LxdError::Config(format!(
            "failed to read client key {}: {error}",
            key_file.display()
        ))
    })?;
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend_from_slice(&key);
    Identity::from_pem(&pem)
        .map_err(|error| LxdError::Config(format!("invalid client certificate pair: {error}")))
}

/// Extracts the `error` string from an LXD error envelope.
fn error_detail(raw: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(raw).ok()?;
    value
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|detail| !detail.is_empty())
        .map(str::to_string)
}
