// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP transfer of CMP messages (RFC 6712).
//!
//! One POST per request, no retries. The response body is returned whatever
//! the HTTP status, since CAs commonly send `error` PKIMessages with 4xx/5xx
//! codes.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::config::CmpClientConfig;
use crate::error::{CmpError, Result};
use crate::tls;
use crate::types::content_types;

/// Sends a DER-encoded PKIMessage and returns the raw response bytes.
#[async_trait]
pub trait CmpTransport: Send + Sync {
    /// POST `body` to `url`. `ca_name` identifies the CA in errors.
    async fn post(&self, url: &Url, ca_name: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// [`CmpTransport`] over HTTP(S) using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport from the client configuration.
    pub fn new(config: &CmpClientConfig) -> Result<Self> {
        Ok(Self {
            http: tls::build_http_client(config)?,
        })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CmpTransport for HttpTransport {
    async fn post(&self, url: &Url, ca_name: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        tracing::debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, content_types::PKIXCMP)
            .body(body)
            .send()
            .await
            .map_err(|e| CmpError::transport(ca_name, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("CA '{}' answered with HTTP {}", ca_name, status);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CmpError::transport(ca_name, e))?;
        tracing::debug!("Received {} bytes from '{}'", bytes.len(), ca_name);
        Ok(bytes.to_vec())
    }
}
