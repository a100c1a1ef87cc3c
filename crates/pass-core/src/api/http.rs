//! reqwest-backed API client.

use std::fmt;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{ApiClient, ApiRequest, Method};
use crate::config::PassConfig;
use crate::error::{Error, Result};
use crate::util::{compact_text, normalize_base_url};

const APP_VERSION_HEADER: &str = "x-pm-appversion";
const SESSION_UID_HEADER: &str = "x-pm-uid";

/// Authenticated API session
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSession {
    pub uid: String,
    pub access_token: String,
}

impl fmt::Debug for ApiSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ApiSession")
            .field("uid", &self.uid)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ReqwestApiClient {
    base_url: String,
    app_version: Option<String>,
    session: Option<ApiSession>,
    client: Client,
}

impl ReqwestApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url).ok_or_else(|| {
            Error::Config("API base URL must include http:// or https://".to_string())
        })?;
        Ok(Self {
            base_url,
            app_version: None,
            session: None,
            client: Client::builder()
                .build()
                .map_err(|error| Error::Network(error.to_string()))?,
        })
    }

    pub fn from_config(config: &PassConfig) -> Result<Self> {
        let mut client = Self::new(&config.api_base_url)?;
        client.app_version.clone_from(&config.app_version);
        Ok(client)
    }

    #[must_use]
    pub fn with_session(mut self, uid: impl Into<String>, access_token: impl Into<String>) -> Self {
        self.session = Some(ApiSession {
            uid: uid.into(),
            access_token: access_token.into(),
        });
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl ApiClient for ReqwestApiClient {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let url = self.endpoint(&request.url);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        }
        .header("Accept", "application/json");

        if let Some(version) = &self.app_version {
            builder = builder.header(APP_VERSION_HEADER, version);
        }
        if let Some(session) = &self.session {
            builder = builder
                .header(SESSION_UID_HEADER, &session.uid)
                .bearer_auth(&session.access_token);
        }
        if let Some(data) = &request.data {
            builder = builder.json(data);
        }

        tracing::debug!("API {:?} {}", request.method, request.url);
        let response = builder
            .send()
            .await
            .map_err(|error| Error::Network(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| Error::Network(error.to_string()))?;

        if !status.is_success() {
            return Err(parse_api_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Code")]
    code: Option<i64>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> Error {
    let code = status.as_u16();
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error {
            let message = match payload.code {
                Some(api_code) => format!("{} [{api_code}]", message.trim()),
                None => message.trim().to_string(),
            };
            return Error::Api { code, message };
        }
    }

    let trimmed = compact_text(body);
    Error::Api {
        code,
        message: if trimmed.is_empty() {
            format!("HTTP {code}")
        } else {
            trimmed
        },
    }
}
