// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Immutable descriptors for BitMEX REST requests.
//!
//! A [`BitmexRequest`] serializes its query and body exactly once, when it is built.
//! The signature is computed over those same bytes, so what is signed is always what
//! is sent.

use reqwest::{
    Method,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::{
    common::consts::BITMEX_USER_AGENT,
    http::{
        auth::BitmexSigner,
        error::{BitmexHttpError, RequestContext},
    },
};

/// A fully serialized request ready to be signed and dispatched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitmexRequest {
    method: Method,
    endpoint: String,
    query: Option<String>,
    body: Option<String>,
    authenticate: bool,
}

/// Everything the transport needs to send one attempt of a [`BitmexRequest`].
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl BitmexRequest {
    /// Starts building a request for `endpoint` (relative to the API base, e.g. `/order`).
    #[must_use]
    pub fn builder(method: Method, endpoint: impl Into<String>) -> BitmexRequestBuilder {
        BitmexRequestBuilder {
            method,
            endpoint: endpoint.into(),
            query: None,
            body: None,
            authenticate: false,
            error: None,
        }
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticate
    }

    /// Parses the serialized body back into JSON, if there is one.
    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }

    /// Returns the full URL of the request against `base_url`.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match &self.query {
            Some(query) => format!("{base}{}?{query}", self.endpoint),
            None => format!("{base}{}", self.endpoint),
        }
    }

    /// Returns a description of the request for error reporting.
    #[must_use]
    pub fn context(&self) -> RequestContext {
        RequestContext {
            method: self.method.clone(),
            endpoint: self.endpoint.clone(),
            payload: self
                .body
                .as_deref()
                .or(self.query.as_deref())
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Produces the URL, headers and body for one dispatch attempt.
    ///
    /// Private requests are signed afresh on every call so each retry carries a
    /// current expiry or nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is private and no signer is available, or the
    /// URL cannot be parsed.
    pub fn prepare(
        &self,
        base_url: &str,
        signer: Option<&BitmexSigner>,
    ) -> Result<PreparedRequest, BitmexHttpError> {
        let url = self.url(base_url);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BITMEX_USER_AGENT));

        if self.authenticate {
            let signer = signer.ok_or(BitmexHttpError::MissingCredentials)?;
            let path = signing_path(&url)?;
            let body = self.body.as_deref().unwrap_or_default();

            tracing::trace!("Signing {} {path}", self.method);
            signer
                .sign(self.method.as_str(), &path, body)
                .apply(&mut headers)?;
        }

        Ok(PreparedRequest {
            method: self.method.clone(),
            url,
            headers,
            body: self.body.clone(),
        })
    }
}

/// Returns the path and query of `url` as BitMEX expects them in the signature.
///
/// # Errors
///
/// Returns an error if `url` is not a valid absolute URL.
pub fn signing_path(url: &str) -> Result<String, BitmexHttpError> {
    let parsed = Url::parse(url)
        .map_err(|e| BitmexHttpError::NetworkError(format!("Invalid URL {url}: {e}")))?;

    Ok(match parsed.query() {
        Some(query) => format!("{}?{query}", parsed.path()),
        None => parsed.path().to_string(),
    })
}

/// Consuming builder for [`BitmexRequest`].
#[derive(Debug)]
pub struct BitmexRequestBuilder {
    method: Method,
    endpoint: String,
    query: Option<String>,
    body: Option<String>,
    authenticate: bool,
    error: Option<BitmexHttpError>,
}

impl BitmexRequestBuilder {
    /// Url-encodes `params` into the query string.
    #[must_use]
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        match serde_urlencoded::to_string(params) {
            Ok(query) if query.is_empty() => self.query = None,
            Ok(query) => self.query = Some(query),
            Err(e) => self.record_error(e.into()),
        }
        self
    }

    /// Serializes `body` as compact JSON.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => self.body = Some(body),
            Err(e) => self.record_error(e.into()),
        }
        self
    }

    /// Places `params` where BitMEX expects them for the verb: the query string for
    /// GET and DELETE, the JSON body otherwise.
    #[must_use]
    pub fn params<T: Serialize + ?Sized>(self, params: &T) -> Self {
        if self.method == Method::GET || self.method == Method::DELETE {
            self.query(params)
        } else {
            self.json(params)
        }
    }

    #[must_use]
    pub const fn authenticate(mut self, authenticate: bool) -> Self {
        self.authenticate = authenticate;
        self
    }

    /// Finalizes the request.
    ///
    /// # Errors
    ///
    /// Returns the first serialization error recorded while building.
    pub fn build(self) -> Result<BitmexRequest, BitmexHttpError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        Ok(BitmexRequest {
            method: self.method,
            endpoint: self.endpoint,
            query: self.query,
            body: self.body,
            authenticate: self.authenticate,
        })
    }

    fn record_error(&mut self, error: BitmexHttpError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
