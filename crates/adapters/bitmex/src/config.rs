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

//! Configuration structures for the BitMEX REST client.

use std::time::Duration;

use crate::{
    common::consts::{
        BITMEX_DEFAULT_CL_ORD_ID_PREFIX, BITMEX_DEFAULT_SYMBOL, BITMEX_HTTP_TESTNET_URL,
        BITMEX_HTTP_URL, DEFAULT_REQUEST_TIMEOUT,
    },
    http::{auth::AuthScheme, retry::RetryPolicy},
};

/// Longest clOrdID prefix that still leaves room for a unique suffix.
pub const MAX_CL_ORD_ID_PREFIX_LEN: usize = 13;

/// Configuration for the BitMEX HTTP client.
#[derive(Clone, Debug)]
pub struct BitmexHttpConfig {
    /// Optional API key for authenticated endpoints.
    pub api_key: Option<String>,
    /// Optional API secret for authenticated endpoints.
    pub api_secret: Option<String>,
    /// Override for the HTTP base URL (including `/api/v1`).
    pub base_url: Option<String>,
    /// When true the client will use BitMEX testnet endpoints.
    pub testnet: bool,
    /// Per-request timeout when the caller does not supply one.
    pub timeout: Duration,
    /// Replay-protection strategy for signed requests.
    pub auth_scheme: AuthScheme,
    /// Retry budgets and delays.
    pub retry_policy: RetryPolicy,
    /// Prefix for generated client order IDs.
    pub cl_ord_id_prefix: String,
    /// Instrument used by bulk order creation and active order queries.
    pub symbol: String,
}

impl Default for BitmexHttpConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            base_url: None,
            testnet: false,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_scheme: AuthScheme::default(),
            retry_policy: RetryPolicy::default(),
            cl_ord_id_prefix: BITMEX_DEFAULT_CL_ORD_ID_PREFIX.to_string(),
            symbol: BITMEX_DEFAULT_SYMBOL.to_string(),
        }
    }
}

impl BitmexHttpConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from `BITMEX_*` environment variables.
    ///
    /// Reads `BITMEX_API_KEY`, `BITMEX_API_SECRET`, `BITMEX_TESTNET`,
    /// `BITMEX_BASE_URL` and `BITMEX_SYMBOL`; anything unset keeps its default.
    ///
    /// # Errors
    ///
    /// Returns an error if only one of key and secret is set, or a value is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a configuration reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if only one of key and secret is set, or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let testnet = match var("BITMEX_TESTNET") {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| anyhow::anyhow!("Invalid BITMEX_TESTNET value '{value}'"))?,
            None => false,
        };

        let mut config = Self {
            api_key: var("BITMEX_API_KEY"),
            api_secret: var("BITMEX_API_SECRET"),
            base_url: var("BITMEX_BASE_URL"),
            testnet,
            ..Self::default()
        };
        if let Some(symbol) = var("BITMEX_SYMBOL") {
            config.symbol = symbol;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns an error if only one credential is set or the clOrdID prefix is too long.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() && self.api_secret.is_none() {
            anyhow::bail!("BITMEX_API_SECRET is required when BITMEX_API_KEY is provided");
        }
        if self.api_key.is_none() && self.api_secret.is_some() {
            anyhow::bail!("BITMEX_API_KEY is required when BITMEX_API_SECRET is provided");
        }
        if self.cl_ord_id_prefix.len() > MAX_CL_ORD_ID_PREFIX_LEN {
            anyhow::bail!(
                "clOrdID prefix '{}' exceeds {MAX_CL_ORD_ID_PREFIX_LEN} characters",
                self.cl_ord_id_prefix
            );
        }
        if self.symbol.is_empty() {
            anyhow::bail!("Symbol must not be empty");
        }
        Ok(())
    }

    /// Returns `true` when both API key and secret are populated.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }

    /// Returns the HTTP base URL, respecting the testnet flag and overrides.
    #[must_use]
    pub fn http_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            if self.testnet {
                BITMEX_HTTP_TESTNET_URL.to_string()
            } else {
                BITMEX_HTTP_URL.to_string()
            }
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
