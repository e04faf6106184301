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

//! Signed header generation for private BitMEX REST requests.
//!
//! BitMEX accepts two replay-protection strategies: an `api-expires` timestamp a few
//! seconds in the future, or a strictly increasing `api-nonce`. They are mutually
//! exclusive on a single request.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::error::BitmexHttpError;
use crate::common::{
    consts::{
        DEFAULT_EXPIRY_GRACE, HEADER_API_EXPIRES, HEADER_API_KEY, HEADER_API_NONCE,
        HEADER_API_SIGNATURE,
    },
    credential::Credential,
};

/// Replay-protection strategy used when signing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// Sign with a strictly increasing nonce at 10^-4 second resolution.
    Nonce,
    /// Sign with an expiry of `now + grace` in whole seconds.
    Expiry { grace: Duration },
}

impl Default for AuthScheme {
    fn default() -> Self {
        Self::Expiry {
            grace: DEFAULT_EXPIRY_GRACE,
        }
    }
}

/// Shared source of strictly increasing nonces.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    last: AtomicU64,
}

impl NonceGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the next nonce derived from `now`.
    ///
    /// Concurrent callers always observe distinct, increasing values even when the
    /// clock does not advance between calls.
    pub fn next_at(&self, now: DateTime<Utc>) -> u64 {
        let candidate = clock_ticks(now);
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn next_nonce(&self) -> u64 {
        self.next_at(Utc::now())
    }
}

// 10^-4 second ticks since the epoch
fn clock_ticks(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp_micros() / 100).unwrap_or_default()
}

/// Headers authenticating one private request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub signature: String,
    pub scheme_header: &'static str,
    pub scheme_value: u64,
}

impl SignedHeaders {
    /// Inserts the signed headers into `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`BitmexHttpError::InvalidHeader`] if the API key is not a valid header value.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), BitmexHttpError> {
        let pairs = [
            (HEADER_API_KEY, self.api_key.clone()),
            (HEADER_API_SIGNATURE, self.signature.clone()),
            (self.scheme_header, self.scheme_value.to_string()),
        ];
        for (name, value) in pairs {
            let value =
                HeaderValue::from_str(&value).map_err(|e| BitmexHttpError::InvalidHeader {
                    name,
                    reason: e.to_string(),
                })?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(())
    }
}

/// Signs private requests with a fixed credential and [`AuthScheme`].
#[derive(Debug)]
pub struct BitmexSigner {
    credential: Credential,
    scheme: AuthScheme,
    nonce: NonceGenerator,
}

impl BitmexSigner {
    #[must_use]
    pub const fn new(credential: Credential, scheme: AuthScheme) -> Self {
        Self {
            credential,
            scheme,
            nonce: NonceGenerator::new(),
        }
    }

    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Signs `verb` + `path` + nonce/expiry + `body` using the current time.
    #[must_use]
    pub fn sign(&self, verb: &str, path: &str, body: &str) -> SignedHeaders {
        self.sign_at(verb, path, body, Utc::now())
    }

    /// Signs using `now` as the clock reading.
    #[must_use]
    pub fn sign_at(
        &self,
        verb: &str,
        path: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> SignedHeaders {
        let (scheme_header, scheme_value) = match self.scheme {
            AuthScheme::Nonce => (HEADER_API_NONCE, self.nonce.next_at(now)),
            AuthScheme::Expiry { grace } => {
                let expires = now.timestamp().max(0) as u64 + grace.as_secs();
                (HEADER_API_EXPIRES, expires)
            }
        };

        SignedHeaders {
            api_key: self.credential.api_key().to_string(),
            signature: self.credential.sign(verb, path, scheme_value, body),
            scheme_header,
            scheme_value,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
