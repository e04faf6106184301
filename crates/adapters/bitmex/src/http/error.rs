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

//! Error structures and enumerations for the BitMEX REST client.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Build error for query parameter validation.
#[derive(Debug, Clone, Error)]
pub enum BitmexBuildError {
    /// Both orderID and clOrdID specified.
    #[error("Cannot specify both 'orderID' and 'clOrdID'")]
    BothOrderIds,
    /// Missing required order identifier.
    #[error("Missing required order identifier (orderID or clOrdID)")]
    MissingOrderId,
    /// Missing a required field.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

impl From<derive_builder::UninitializedFieldError> for BitmexBuildError {
    fn from(error: derive_builder::UninitializedFieldError) -> Self {
        Self::MissingField(error.field_name())
    }
}

/// Represents the JSON structure of an error response returned by the BitMEX API.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BitmexErrorResponse {
    /// The top-level error object included in the BitMEX error response.
    pub error: BitmexErrorMessage,
}

/// Contains the specific error details provided by the BitMEX API.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BitmexErrorMessage {
    /// A human-readable explanation of the error condition.
    pub message: String,
    /// A short identifier or category for the error, as returned by BitMEX.
    #[serde(default)]
    pub name: String,
}

impl BitmexErrorResponse {
    /// Extracts the error message from a response body, falling back to the raw text.
    #[must_use]
    pub fn message_from_body(body: &str) -> String {
        serde_json::from_str::<Self>(body)
            .map_or_else(|_| body.to_string(), |response| response.error.message)
    }
}

/// Context describing the request that produced an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub method: Method,
    pub endpoint: String,
    /// Serialized query string or JSON body, empty when the request had none.
    pub payload: String,
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{} {}", self.method, self.endpoint)
        } else {
            write!(f, "{} {} {}", self.method, self.endpoint, self.payload)
        }
    }
}

/// A typed error enumeration for the BitMEX HTTP client.
#[derive(Debug, Clone, Error)]
pub enum BitmexHttpError {
    /// Error variant when credentials are missing but the request is authenticated.
    #[error("Missing credentials for authenticated request")]
    MissingCredentials,
    /// BitMEX rejected the API key or signature (HTTP 401).
    #[error("Authentication failed for {context}: {body}")]
    AuthenticationFailed { context: RequestContext, body: String },
    /// The endpoint or resource does not exist (HTTP 404 on a non-DELETE call).
    #[error("Not found {context}: {body}")]
    NotFound { context: RequestContext, body: String },
    /// The account does not hold enough margin for the request.
    #[error("Insufficient available balance for {context}: {message}")]
    InsufficientBalance {
        context: RequestContext,
        message: String,
    },
    /// An order already exists under the submitted clOrdID but its terms differ.
    #[error("Duplicate clOrdID with mismatched order for {context}: {details}")]
    DuplicateOrderMismatch {
        context: RequestContext,
        details: String,
    },
    /// The retry budget ran out while the failure was still classified as retryable.
    #[error("Max retries ({max_retries}) exceeded for {context}: {last_error}")]
    MaxRetriesExceeded {
        context: RequestContext,
        max_retries: u32,
        last_error: String,
    },
    /// Order parameters rejected locally before dispatch.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    /// A signed header value could not be encoded.
    #[error("Invalid value for header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },
    /// Failure during JSON serialization/deserialization.
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Build error for query parameters.
    #[error("Build error: {0}")]
    BuildError(#[from] BitmexBuildError),
    /// Generic network error.
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Any unknown HTTP status or unexpected response from BitMEX.
    #[error("Unexpected HTTP status code {status} for {context}: {body}")]
    UnexpectedStatus {
        context: RequestContext,
        status: StatusCode,
        body: String,
    },
    /// An unrecoverable failure; the caller is expected to terminate the run.
    #[error("Fatal: {0}")]
    Fatal(Box<BitmexHttpError>),
}

impl BitmexHttpError {
    /// Returns whether the error demands that the caller stop trading.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Returns the underlying error, unwrapping a [`BitmexHttpError::Fatal`] wrapper.
    #[must_use]
    pub fn inner(&self) -> &Self {
        match self {
            Self::Fatal(inner) => inner.inner(),
            other => other,
        }
    }

    /// Wraps the error as fatal unless the caller asked for errors to be returned as-is.
    #[must_use]
    pub fn fatal_or_rethrow(self, rethrow: bool) -> Self {
        if rethrow || self.is_fatal() {
            self
        } else {
            Self::Fatal(Box::new(self))
        }
    }
}

impl From<reqwest::Error> for BitmexHttpError {
    fn from(error: reqwest::Error) -> Self {
        Self::NetworkError(error.to_string())
    }
}

impl From<serde_json::Error> for BitmexHttpError {
    fn from(error: serde_json::Error) -> Self {
        Self::JsonError(error.to_string())
    }
}

impl From<serde_urlencoded::ser::Error> for BitmexHttpError {
    fn from(error: serde_urlencoded::ser::Error) -> Self {
        Self::JsonError(error.to_string())
    }
}
