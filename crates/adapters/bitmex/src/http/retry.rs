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

//! Response classification and per-call retry bookkeeping for the BitMEX dispatcher.

use std::time::Duration;

use reqwest::{Method, StatusCode, header::HeaderMap};

use crate::{
    common::consts::{
        DEFAULT_CONNECTION_ERROR_DELAY, DEFAULT_IDEMPOTENT_MAX_RETRIES,
        DEFAULT_NON_IDEMPOTENT_MAX_RETRIES, DEFAULT_RATE_LIMIT_FALLBACK_DELAY,
        DEFAULT_SERVICE_UNAVAILABLE_DELAY, DUPLICATE_CL_ORD_ID_MESSAGE, HEADER_RATELIMIT_RESET,
        INSUFFICIENT_BALANCE_MESSAGE,
    },
    http::error::BitmexErrorResponse,
};

/// Retry budgets and back-off delays applied by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed for GET and DELETE when the caller does not override them.
    pub idempotent_max_retries: u32,
    /// Retries allowed for POST and PUT when the caller does not override them.
    pub non_idempotent_max_retries: u32,
    /// Pause after a connection error.
    pub connection_error_delay: Duration,
    /// Pause after a 503.
    pub service_unavailable_delay: Duration,
    /// Pause after a 429 without reset information.
    pub rate_limit_fallback_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            idempotent_max_retries: DEFAULT_IDEMPOTENT_MAX_RETRIES,
            non_idempotent_max_retries: DEFAULT_NON_IDEMPOTENT_MAX_RETRIES,
            connection_error_delay: DEFAULT_CONNECTION_ERROR_DELAY,
            service_unavailable_delay: DEFAULT_SERVICE_UNAVAILABLE_DELAY,
            rate_limit_fallback_delay: DEFAULT_RATE_LIMIT_FALLBACK_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Returns the default retry budget for `method`.
    ///
    /// POST and PUT are not idempotent on BitMEX and are never retried by default.
    #[must_use]
    pub fn default_max_retries(&self, method: &Method) -> u32 {
        if *method == Method::POST || *method == Method::PUT {
            self.non_idempotent_max_retries
        } else {
            self.idempotent_max_retries
        }
    }
}

/// Retry counter scoped to a single logical call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_retries: u32,
}

impl RetryState {
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
        }
    }

    /// Retries consumed so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Consumes one retry, returning `false` once the budget is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.attempt >= self.max_retries {
            return false;
        }
        self.attempt += 1;
        true
    }
}

/// How the dispatcher must react to a non-2xx response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusAction {
    /// Authentication failed; never recoverable.
    AuthenticationFailed,
    /// The order to delete is already gone; resolves to an empty result.
    DeleteNotFound,
    /// Non-DELETE 404.
    NotFound,
    /// Rate limited; wait this long (after optional order cancellation) then retry.
    RateLimited { wait: Duration },
    /// Retry after the given pause.
    Retry { delay: Duration },
    /// The clOrdID already exists; reconcile against the existing orders.
    DuplicateClOrdId,
    /// The account lacks margin.
    InsufficientBalance { message: String },
    /// Anything else.
    Unexpected,
}

/// How the dispatcher must react to a transport failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportAction {
    /// Timed out; retry immediately.
    RetryNow,
    /// Could not connect; retry after the given pause.
    RetryAfter(Duration),
    /// Not retryable.
    Fail,
}

/// Classifies a transport error by its kind.
#[must_use]
pub fn classify_transport_error(
    policy: &RetryPolicy,
    is_timeout: bool,
    is_connect: bool,
) -> TransportAction {
    if is_timeout {
        TransportAction::RetryNow
    } else if is_connect {
        TransportAction::RetryAfter(policy.connection_error_delay)
    } else {
        TransportAction::Fail
    }
}

/// Classifies a non-success HTTP response.
///
/// `now_secs` is the current UNIX time in seconds, used to turn a rate-limit reset
/// timestamp into a wait.
#[must_use]
pub fn classify_status(
    policy: &RetryPolicy,
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now_secs: i64,
) -> StatusAction {
    match status {
        StatusCode::UNAUTHORIZED => StatusAction::AuthenticationFailed,
        StatusCode::NOT_FOUND if *method == Method::DELETE => StatusAction::DeleteNotFound,
        StatusCode::NOT_FOUND => StatusAction::NotFound,
        StatusCode::TOO_MANY_REQUESTS => StatusAction::RateLimited {
            wait: rate_limit_wait(headers, now_secs, policy.rate_limit_fallback_delay),
        },
        StatusCode::SERVICE_UNAVAILABLE => StatusAction::Retry {
            delay: policy.service_unavailable_delay,
        },
        StatusCode::BAD_REQUEST => {
            let message = BitmexErrorResponse::message_from_body(body);
            let lowered = message.to_lowercase();
            if lowered.contains(DUPLICATE_CL_ORD_ID_MESSAGE) {
                StatusAction::DuplicateClOrdId
            } else if lowered.contains(INSUFFICIENT_BALANCE_MESSAGE) {
                StatusAction::InsufficientBalance { message }
            } else {
                StatusAction::Unexpected
            }
        }
        _ => StatusAction::Unexpected,
    }
}

/// Computes how long to wait after a 429.
///
/// Prefers `X-Ratelimit-Reset` (UNIX seconds), then `Retry-After` (seconds), then
/// `fallback`. A reset already in the past yields no wait.
#[must_use]
pub fn rate_limit_wait(headers: &HeaderMap, now_secs: i64, fallback: Duration) -> Duration {
    let header_i64 = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
    };

    if let Some(reset) = header_i64(HEADER_RATELIMIT_RESET) {
        return Duration::from_secs(u64::try_from(reset - now_secs).unwrap_or_default());
    }

    if let Some(retry_after) = header_i64(reqwest::header::RETRY_AFTER.as_str()) {
        return Duration::from_secs(u64::try_from(retry_after).unwrap_or_default());
    }

    fallback
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
