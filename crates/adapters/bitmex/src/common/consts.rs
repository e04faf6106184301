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

//! Constants shared across the BitMEX connector.

use std::time::Duration;

pub const BITMEX_HTTP_URL: &str = "https://www.bitmex.com/api/v1";
pub const BITMEX_HTTP_TESTNET_URL: &str = "https://testnet.bitmex.com/api/v1";

/// Fixed user agent sent on every request.
pub const BITMEX_USER_AGENT: &str = concat!("liquidbot/", env!("CARGO_PKG_VERSION"));

/// Default instrument traded by the connector.
pub const BITMEX_DEFAULT_SYMBOL: &str = "XBTUSD";

/// Default settlement currency for margin and withdrawal endpoints (satoshis).
pub const BITMEX_SETTLEMENT_CURRENCY: &str = "XBt";

/// Satoshis per XBT.
pub const SATOSHIS_PER_XBT: f64 = 100_000_000.0;

/// Default prefix for client order IDs so orders placed by this connector can be identified.
pub const BITMEX_DEFAULT_CL_ORD_ID_PREFIX: &str = "mm_bitmex_";

/// BitMEX rejects client order IDs longer than this.
pub const BITMEX_MAX_CL_ORD_ID_LEN: usize = 36;

/// Maximum number of rows BitMEX returns for a single query.
pub const BITMEX_MAX_COUNT: u32 = 500;

pub const HEADER_API_KEY: &str = "api-key";
pub const HEADER_API_SIGNATURE: &str = "api-signature";
pub const HEADER_API_EXPIRES: &str = "api-expires";
pub const HEADER_API_NONCE: &str = "api-nonce";
pub const HEADER_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Grace period added to the clock when signing with an expiry.
pub const DEFAULT_EXPIRY_GRACE: Duration = Duration::from_secs(5);

/// Per-request timeout when the caller does not supply one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(7);

/// Retry budget for idempotent verbs (GET, DELETE).
pub const DEFAULT_IDEMPOTENT_MAX_RETRIES: u32 = 3;

/// Retry budget for non-idempotent verbs (POST, PUT).
pub const DEFAULT_NON_IDEMPOTENT_MAX_RETRIES: u32 = 0;

pub const DEFAULT_CONNECTION_ERROR_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_SERVICE_UNAVAILABLE_DELAY: Duration = Duration::from_secs(3);

/// Used when a 429 response carries neither `X-Ratelimit-Reset` nor `Retry-After`.
pub const DEFAULT_RATE_LIMIT_FALLBACK_DELAY: Duration = Duration::from_secs(1);

/// Lower-cased fragment of the 400 message BitMEX returns for a reused clOrdID.
pub const DUPLICATE_CL_ORD_ID_MESSAGE: &str = "duplicate clordid";

/// Lower-cased fragment of the 400 message BitMEX returns when the account is out of funds.
pub const INSUFFICIENT_BALANCE_MESSAGE: &str = "insufficient available balance";
