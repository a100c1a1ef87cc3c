//! API collaborator.
//!
//! The core only needs "send this request, give me the JSON back".
//! [`ReqwestApiClient`] is the production implementation; tests plug in
//! in-process fakes.

mod http;
pub mod requests;

use serde_json::Value;

use crate::error::Result;

pub use http::ReqwestApiClient;

/// HTTP verb of an [`ApiRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A request relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub url: String,
    pub method: Method,
    pub data: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            data: None,
        }
    }

    pub fn post(url: impl Into<String>, data: Value) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            data: Some(data),
        }
    }

    pub fn put(url: impl Into<String>, data: Value) -> Self {
        Self {
            url: url.into(),
            method: Method::Put,
            data: Some(data),
        }
    }

    pub fn delete(url: impl Into<String>, data: Value) -> Self {
        Self {
            url: url.into(),
            method: Method::Delete,
            data: Some(data),
        }
    }
}

/// Generic request executor.
///
/// Implementations surface failures as [`crate::Error::Api`] or
/// [`crate::Error::Network`] and never retry.
#[allow(async_fn_in_trait)]
pub trait ApiClient {
    async fn send(&self, request: ApiRequest) -> Result<Value>;
}
