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

//! BitMEX API credential storage and request signing.

#![allow(unused_assignments)] // Fields are used in methods, false positive from nightly

use std::fmt::Debug;

use aws_lc_rs::hmac;
use ustr::Ustr;
use zeroize::ZeroizeOnDrop;

/// API credentials required for signing BitMEX REST requests.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Credential {
    #[zeroize(skip)]
    api_key: Ustr,
    api_secret: Box<[u8]>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Credential))
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credential {
    /// Creates a new [`Credential`] instance from the API key and secret.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let api_secret_bytes = api_secret.into().into_bytes();

        Self {
            api_key: Ustr::from(api_key.as_str()),
            api_secret: api_secret_bytes.into_boxed_slice(),
        }
    }

    /// Returns the public API key.
    #[must_use]
    pub fn api_key(&self) -> &Ustr {
        &self.api_key
    }

    /// Signs a request as `HEX(HMAC_SHA256(secret, verb + path + nonce + body))`.
    ///
    /// `path` is the URL path relative to the host, including the `/api/v1` prefix and
    /// any query string. `body` must be the exact text transmitted (empty when there is none).
    #[must_use]
    pub fn sign(&self, verb: &str, path: &str, nonce_or_expiry: u64, body: &str) -> String {
        generate_signature(&self.api_secret, verb, path, nonce_or_expiry, body)
    }
}

/// Computes a BitMEX request signature.
///
/// The verb is upper-cased before signing.
#[must_use]
pub fn generate_signature(
    secret: &[u8],
    verb: &str,
    path: &str,
    nonce_or_expiry: u64,
    body: &str,
) -> String {
    let verb = verb.to_ascii_uppercase();
    let nonce = nonce_or_expiry.to_string();

    let mut message = String::with_capacity(verb.len() + path.len() + nonce.len() + body.len());
    message.push_str(&verb);
    message.push_str(path);
    message.push_str(&nonce);
    message.push_str(body);

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, message.as_bytes());
    hex::encode(tag.as_ref())
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
