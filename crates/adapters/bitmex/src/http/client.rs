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

//! Provides an ergonomic wrapper around the **BitMEX REST API**.
//!
//! The [`BitmexHttpInnerClient`] owns request dispatch: it signs private requests,
//! classifies every response and decides whether to return, retry, recover or fail.
//! The [`BitmexHttpClient`] is the public façade mapping market data and order
//! lifecycle operations onto endpoints.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use chrono::Utc;
use reqwest::{Method, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use ustr::Ustr;
use uuid::Uuid;

use super::{
    auth::BitmexSigner,
    error::{BitmexHttpError, RequestContext},
    models::{
        BitmexDailyStats, BitmexExecution, BitmexInstrument, BitmexMargin, BitmexOrder,
        BitmexOrderBookL2, BitmexPosition, BitmexTicker, BitmexTrade, BitmexTransaction,
    },
    query::{
        DeleteOrderParams, GetInstrumentParams, GetOrderBookParams, GetOrderParams,
        GetPositionParams, GetTradeParams, PostBulkOrdersParams, PostClosePositionParams,
        PostOrderParams, PostPositionLeverageParams, PostWithdrawalParams, PutBulkOrdersParams,
        PutOrderParams,
    },
    request::{BitmexRequest, PreparedRequest},
    retry::{
        RetryPolicy, RetryState, StatusAction, TransportAction, classify_status,
        classify_transport_error,
    },
};
use crate::{
    common::{
        consts::{BITMEX_MAX_CL_ORD_ID_LEN, BITMEX_MAX_COUNT, BITMEX_SETTLEMENT_CURRENCY},
        credential::Credential,
        enums::{BitmexOrderType, BitmexSide},
        parse::{OrderStatusReport, read_order_status},
    },
    config::BitmexHttpConfig,
};

type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, BitmexHttpError>> + Send + 'a>>;

/// Per-call dispatch options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides the client timeout for each attempt.
    pub timeout: Option<Duration>,
    /// Return classified errors as-is instead of wrapping them in [`BitmexHttpError::Fatal`].
    pub rethrow_errors: bool,
    /// Overrides the verb-dependent retry budget.
    pub max_retries: Option<u32>,
    /// Cancel open orders while waiting out a rate limit (authenticated clients only).
    pub cancel_orders_on_rate_limit: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            rethrow_errors: false,
            max_retries: None,
            cancel_orders_on_rate_limit: true,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_rethrow(mut self, rethrow_errors: bool) -> Self {
        self.rethrow_errors = rethrow_errors;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    // Calls made while recovering from another failure must not recover again
    const fn recovery() -> Self {
        Self {
            timeout: None,
            rethrow_errors: true,
            max_retries: Some(0),
            cancel_orders_on_rate_limit: false,
        }
    }
}

/// Generates a client order ID of at most 36 characters from `prefix` and a random UUID.
#[must_use]
pub fn generate_cl_ord_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let take = BITMEX_MAX_CL_ORD_ID_LEN
        .saturating_sub(prefix.len())
        .min(suffix.len());
    format!("{prefix}{}", &suffix[..take])
}

/// Provides a lower-level HTTP client for connecting to the [BitMEX](https://bitmex.com) REST API.
///
/// This client handles request signing (for authenticated endpoints), dispatch,
/// response classification, retries and recovery.
#[derive(Debug)]
pub struct BitmexHttpInnerClient {
    base_url: String,
    client: reqwest::Client,
    signer: Option<BitmexSigner>,
    retry_policy: RetryPolicy,
    timeout: Duration,
}

impl BitmexHttpInnerClient {
    /// Creates a new [`BitmexHttpInnerClient`] from `config`.
    ///
    /// The client only signs requests when both API key and secret are configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &BitmexHttpConfig) -> Result<Self, BitmexHttpError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BitmexHttpError::NetworkError(format!("Failed to build client: {e}")))?;

        let signer = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => Some(BitmexSigner::new(
                Credential::new(key.clone(), secret.clone()),
                config.auth_scheme,
            )),
            _ => None,
        };

        Ok(Self {
            base_url: config.http_url().trim_end_matches('/').to_string(),
            client,
            signer,
            retry_policy: config.retry_policy,
            timeout: config.timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.signer.is_some()
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.signer
            .as_ref()
            .map(|signer| signer.credential().api_key().as_str())
    }

    /// Executes `request` until it succeeds, fails fatally or exhausts its retry budget.
    ///
    /// Each call starts with a fresh retry budget. Timeouts are retried at once;
    /// connection errors and 503s after a pause; 429s after the rate limit resets,
    /// cancelling open orders in the meantime when authenticated. A 404 on DELETE
    /// resolves to an empty array, and a duplicate clOrdID resolves to the existing
    /// orders when they match the submitted ones.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be completed. Unless
    /// `options.rethrow_errors` is set the error is wrapped in
    /// [`BitmexHttpError::Fatal`]; authentication failures are always fatal.
    pub async fn execute(
        &self,
        request: &BitmexRequest,
        options: RequestOptions,
    ) -> Result<Value, BitmexHttpError> {
        let rethrow = options.rethrow_errors;
        let timeout = options.timeout.unwrap_or(self.timeout);
        let mut state = RetryState::new(
            options
                .max_retries
                .unwrap_or_else(|| self.retry_policy.default_max_retries(request.method())),
        );

        loop {
            let prepared = request.prepare(&self.base_url, self.signer.as_ref())?;
            tracing::info!(
                "Sending {} {}: {}",
                prepared.method,
                prepared.url,
                prepared.body.as_deref().unwrap_or_default()
            );

            let (delay, last_error) = match self.dispatch(prepared, timeout).await {
                Ok((status, _, body)) if status.is_success() => {
                    return parse_body(&body).map_err(|e| e.fatal_or_rethrow(rethrow));
                }
                Ok((status, headers, body)) => {
                    let action = classify_status(
                        &self.retry_policy,
                        request.method(),
                        status,
                        &headers,
                        &body,
                        Utc::now().timestamp(),
                    );
                    match self
                        .handle_status(request, action, status, body, options)
                        .await
                    {
                        Outcome::Done(result) => return result,
                        Outcome::Retry { delay, last_error } => (delay, last_error),
                    }
                }
                Err(e) => match classify_transport_error(
                    &self.retry_policy,
                    e.is_timeout(),
                    e.is_connect() || e.is_request(),
                ) {
                    TransportAction::RetryNow => {
                        tracing::warn!(
                            "Timed out on request {}, retrying",
                            request.context()
                        );
                        (Duration::ZERO, e.to_string())
                    }
                    TransportAction::RetryAfter(delay) => {
                        tracing::warn!(
                            "Unable to contact the BitMEX API ({e}), retrying request {}",
                            request.context()
                        );
                        (delay, e.to_string())
                    }
                    TransportAction::Fail => {
                        tracing::error!("Request {} failed: {e}", request.context());
                        return Err(BitmexHttpError::from(e).fatal_or_rethrow(rethrow));
                    }
                },
            };

            if !state.try_consume() {
                tracing::error!(
                    "Max retries ({}) hit on {}, giving up",
                    state.max_retries(),
                    request.context()
                );
                return Err(BitmexHttpError::MaxRetriesExceeded {
                    context: request.context(),
                    max_retries: state.max_retries(),
                    last_error,
                }
                .fatal_or_rethrow(rethrow));
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            tracing::debug!(
                "Retry {}/{} for {}",
                state.attempt(),
                state.max_retries(),
                request.context()
            );
        }
    }

    fn execute_boxed<'a>(
        &'a self,
        request: &'a BitmexRequest,
        options: RequestOptions,
    ) -> ExecuteFuture<'a> {
        Box::pin(self.execute(request, options))
    }

    async fn dispatch(
        &self,
        prepared: PreparedRequest,
        timeout: Duration,
    ) -> Result<(StatusCode, HeaderMap, String), reqwest::Error> {
        let mut builder = self
            .client
            .request(prepared.method, prepared.url)
            .headers(prepared.headers)
            .timeout(timeout);
        if let Some(body) = prepared.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok((status, headers, body))
    }

    async fn handle_status(
        &self,
        request: &BitmexRequest,
        action: StatusAction,
        status: StatusCode,
        body: String,
        options: RequestOptions,
    ) -> Outcome {
        let rethrow = options.rethrow_errors;
        let context = request.context();

        match action {
            StatusAction::AuthenticationFailed => {
                tracing::error!(
                    "API key or secret incorrect, check credentials and restart: {body} ({context})"
                );
                Outcome::Done(Err(BitmexHttpError::Fatal(Box::new(
                    BitmexHttpError::AuthenticationFailed { context, body },
                ))))
            }
            StatusAction::DeleteNotFound => {
                tracing::warn!("Order not found for {context}");
                Outcome::Done(Ok(Value::Array(Vec::new())))
            }
            StatusAction::NotFound => {
                tracing::error!("Unable to contact the BitMEX API (404) for {context}");
                Outcome::Done(Err(
                    BitmexHttpError::NotFound { context, body }.fatal_or_rethrow(rethrow)
                ))
            }
            StatusAction::RateLimited { wait } => {
                tracing::error!(
                    "Rate limited on {context}, sleeping {}s before retrying",
                    wait.as_secs()
                );
                // Market data calls never touch orders, even on an authenticated client
                if options.cancel_orders_on_rate_limit
                    && request.is_authenticated()
                    && self.is_authenticated()
                {
                    tracing::warn!("Canceling all open orders while rate limited");
                    match self.cancel_open_orders().await {
                        Ok(count) => tracing::info!("Canceled {count} open orders"),
                        Err(e) if is_authentication_failure(&e) => {
                            tracing::error!("Authentication failed while canceling open orders");
                            return Outcome::Done(Err(e));
                        }
                        Err(e) => tracing::warn!("Failed to cancel open orders: {e}"),
                    }
                }
                Outcome::Retry {
                    delay: wait,
                    last_error: format!("HTTP {status}: {body}"),
                }
            }
            StatusAction::Retry { delay } => {
                tracing::warn!("Unable to contact the BitMEX API ({status}), retrying {context}");
                Outcome::Retry {
                    delay,
                    last_error: format!("HTTP {status}: {body}"),
                }
            }
            StatusAction::DuplicateClOrdId => {
                tracing::warn!("Duplicate clOrdID on {context}, fetching existing orders");
                Outcome::Done(
                    self.reconcile_duplicate(request)
                        .await
                        .map_err(|e| e.fatal_or_rethrow(rethrow)),
                )
            }
            StatusAction::InsufficientBalance { message } => {
                tracing::error!("Account out of funds: {message}");
                Outcome::Done(Err(BitmexHttpError::InsufficientBalance { context, message }
                    .fatal_or_rethrow(rethrow)))
            }
            StatusAction::Unexpected => {
                tracing::error!("Unhandled error {status} for {context}: {body}");
                Outcome::Done(Err(BitmexHttpError::UnexpectedStatus {
                    context,
                    status,
                    body,
                }
                .fatal_or_rethrow(rethrow)))
            }
        }
    }

    /// Cancels every open order on the account, returning how many were canceled.
    async fn cancel_open_orders(&self) -> Result<usize, BitmexHttpError> {
        let params = GetOrderParams {
            filter: Some(json!({"open": true})),
            count: Some(BITMEX_MAX_COUNT),
            ..Default::default()
        };
        let request = BitmexRequest::builder(Method::GET, "/order")
            .query(&params)
            .authenticate(true)
            .build()?;
        let orders = self
            .execute_boxed(&request, RequestOptions::recovery())
            .await?;

        let order_ids: Vec<String> = orders.as_array().map_or_else(Vec::new, |orders| {
            orders
                .iter()
                .filter_map(|order| order.get("orderID").and_then(Value::as_str))
                .map(String::from)
                .collect()
        });
        if order_ids.is_empty() {
            return Ok(0);
        }

        let count = order_ids.len();
        let params = DeleteOrderParams {
            order_id: Some(order_ids),
            ..Default::default()
        };
        let request = BitmexRequest::builder(Method::DELETE, "/order")
            .query(&params)
            .authenticate(true)
            .build()?;
        self.execute_boxed(&request, RequestOptions::recovery())
            .await?;

        Ok(count)
    }

    /// Fetches the orders behind a duplicate clOrdID and checks they match what was sent.
    async fn reconcile_duplicate(&self, request: &BitmexRequest) -> Result<Value, BitmexHttpError> {
        let submitted = submitted_orders(request.body_json());
        let cl_ord_ids: Vec<&str> = submitted
            .iter()
            .filter_map(|order| order.get("clOrdID").and_then(Value::as_str))
            .collect();
        if cl_ord_ids.is_empty() {
            return Err(BitmexHttpError::DuplicateOrderMismatch {
                context: request.context(),
                details: "submitted order carries no clOrdID".to_string(),
            });
        }

        let params = GetOrderParams {
            filter: Some(json!({ "clOrdID": cl_ord_ids })),
            ..Default::default()
        };
        let lookup = BitmexRequest::builder(Method::GET, "/order")
            .query(&params)
            .authenticate(true)
            .build()?;
        let options = RequestOptions {
            rethrow_errors: true,
            cancel_orders_on_rate_limit: false,
            ..Default::default()
        };
        let fetched = self.execute_boxed(&lookup, options).await?;

        let fetched_orders = fetched.as_array().map_or(&[][..], Vec::as_slice);
        if let Some(details) = duplicate_mismatch(&submitted, fetched_orders) {
            tracing::error!(
                "Attempted to recover from duplicate clOrdID but orders did not match: {details}"
            );
            return Err(BitmexHttpError::DuplicateOrderMismatch {
                context: request.context(),
                details,
            });
        }

        tracing::info!("Recovered {} orders by clOrdID", fetched_orders.len());
        Ok(fetched)
    }
}

enum Outcome {
    Done(Result<Value, BitmexHttpError>),
    Retry { delay: Duration, last_error: String },
}

fn is_authentication_failure(error: &BitmexHttpError) -> bool {
    error.is_fatal() && matches!(error.inner(), BitmexHttpError::AuthenticationFailed { .. })
}

fn parse_body(body: &str) -> Result<Value, BitmexHttpError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(Into::into)
}

fn submitted_orders(body: Option<Value>) -> Vec<Value> {
    match body {
        Some(Value::Object(mut map)) => match map.remove("orders") {
            Some(Value::Array(orders)) => orders,
            Some(other) => {
                map.insert("orders".to_string(), other);
                vec![Value::Object(map)]
            }
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

/// Compares submitted orders against the orders BitMEX holds under the same clOrdIDs.
///
/// Returns a description of the first difference in quantity, side, price (when one
/// was submitted) or symbol, or of a submitted order with no counterpart.
fn duplicate_mismatch(submitted: &[Value], fetched: &[Value]) -> Option<String> {
    for order in submitted {
        let Some(cl_ord_id) = order.get("clOrdID").and_then(Value::as_str) else {
            continue;
        };
        let Some(existing) = fetched
            .iter()
            .find(|o| o.get("clOrdID").and_then(Value::as_str) == Some(cl_ord_id))
        else {
            return Some(format!("no order returned for clOrdID {cl_ord_id}"));
        };

        let qty_matches = order
            .get("orderQty")
            .and_then(Value::as_f64)
            .is_none_or(|qty| {
                let side = if qty > 0.0 { "Buy" } else { "Sell" };
                existing.get("orderQty").and_then(Value::as_f64) == Some(qty.abs())
                    && existing.get("side").and_then(Value::as_str) == Some(side)
            });
        let price_matches = order.get("price").is_none_or(|price| {
            existing.get("price").and_then(Value::as_f64) == price.as_f64()
        });
        let symbol_matches = order
            .get("symbol")
            .is_none_or(|symbol| existing.get("symbol") == Some(symbol));

        if !(qty_matches && price_matches && symbol_matches) {
            return Some(format!("submitted {order}, returned {existing}"));
        }
    }
    None
}

/// Provides a HTTP client for connecting to the [BitMEX](https://bitmex.com) REST API.
///
/// This is the high-level client exposing market data and order lifecycle
/// operations. Clones share the same connection pool and signing state.
#[derive(Clone, Debug)]
pub struct BitmexHttpClient {
    inner: Arc<BitmexHttpInnerClient>,
    symbol: Ustr,
    cl_ord_id_prefix: String,
}

impl BitmexHttpClient {
    /// Creates a new [`BitmexHttpClient`] from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: &BitmexHttpConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let inner = BitmexHttpInnerClient::new(config)?;

        Ok(Self {
            inner: Arc::new(inner),
            symbol: Ustr::from(config.symbol.as_str()),
            cl_ord_id_prefix: config.cl_ord_id_prefix.clone(),
        })
    }

    /// Creates a new [`BitmexHttpClient`] configured from `BITMEX_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds an invalid configuration.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(&BitmexHttpConfig::from_env()?)
    }

    /// Returns the base url being used by the client.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    /// Returns the public API key being used by the client.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.inner.api_key()
    }

    /// Returns the default symbol of the client.
    #[must_use]
    pub const fn symbol(&self) -> Ustr {
        self.symbol
    }

    /// Executes an arbitrary request through the dispatcher.
    ///
    /// # Errors
    ///
    /// See [`BitmexHttpInnerClient::execute`].
    pub async fn execute(
        &self,
        request: &BitmexRequest,
        options: RequestOptions,
    ) -> Result<Value, BitmexHttpError> {
        self.inner.execute(request, options).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: &BitmexRequest,
        options: RequestOptions,
    ) -> Result<T, BitmexHttpError> {
        let value = self.inner.execute(request, options).await?;
        serde_json::from_value(value).map_err(Into::into)
    }

    fn public(
        method: Method,
        endpoint: &str,
        params: &impl serde::Serialize,
    ) -> Result<BitmexRequest, BitmexHttpError> {
        BitmexRequest::builder(method, endpoint)
            .params(params)
            .build()
    }

    fn private(
        &self,
        method: Method,
        endpoint: &str,
        params: &impl serde::Serialize,
    ) -> Result<BitmexRequest, BitmexHttpError> {
        if !self.inner.is_authenticated() {
            return Err(BitmexHttpError::MissingCredentials);
        }
        BitmexRequest::builder(method, endpoint)
            .params(params)
            .authenticate(true)
            .build()
    }

    // ========================================================================
    // Market data
    // ========================================================================

    /// Returns the symbols of all active instruments.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn symbols(&self) -> Result<Vec<Ustr>, BitmexHttpError> {
        let request = Self::public(Method::GET, "/instrument/active", &())?;
        let instruments: Vec<BitmexInstrument> =
            self.send(&request, RequestOptions::default()).await?;
        Ok(instruments.into_iter().map(|i| i.symbol).collect())
    }

    /// Returns the details of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no instrument is returned.
    pub async fn instrument(&self, symbol: &str) -> Result<BitmexInstrument, BitmexHttpError> {
        let params = GetInstrumentParams {
            symbol: Some(symbol.to_string()),
            ..Default::default()
        };
        let request = Self::public(Method::GET, "/instrument", &params)?;
        let context = request.context();
        let instruments: Vec<BitmexInstrument> =
            self.send(&request, RequestOptions::default()).await?;

        instruments
            .into_iter()
            .next()
            .ok_or_else(|| BitmexHttpError::NotFound {
                context,
                body: format!("no instrument returned for {symbol}"),
            })
    }

    /// Returns the best prices for `symbol`, or the client symbol when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the instrument cannot be fetched.
    pub async fn ticker(&self, symbol: Option<&str>) -> Result<BitmexTicker, BitmexHttpError> {
        let symbol = symbol.unwrap_or(self.symbol.as_str());
        let instrument = self.instrument(symbol).await?;
        Ok(BitmexTicker::from(&instrument))
    }

    /// Returns the session low, high and volume for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns an error if the instrument cannot be fetched.
    pub async fn today(&self, symbol: &str) -> Result<BitmexDailyStats, BitmexHttpError> {
        let instrument = self.instrument(symbol).await?;
        Ok(BitmexDailyStats::from(&instrument))
    }

    /// Returns up to `depth` L2 levels per side for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn order_book(
        &self,
        symbol: &str,
        depth: u32,
    ) -> Result<Vec<BitmexOrderBookL2>, BitmexHttpError> {
        let params = GetOrderBookParams {
            symbol: symbol.to_string(),
            depth,
        };
        let request = Self::public(Method::GET, "/orderBook/L2", &params)?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Returns the most recent public trades for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn recent_trades(&self, symbol: &str) -> Result<Vec<BitmexTrade>, BitmexHttpError> {
        let params = GetTradeParams {
            symbol: Some(symbol.to_string()),
            ..Default::default()
        };
        let request = Self::public(Method::GET, "/trade", &params)?;
        self.send(&request, RequestOptions::default()).await
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// Returns the margin balance of the account in the settlement currency.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn balances(&self) -> Result<BitmexMargin, BitmexHttpError> {
        let request = self.private(
            Method::GET,
            "/user/margin",
            &json!({ "currency": BITMEX_SETTLEMENT_CURRENCY }),
        )?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Returns all positions.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn positions(&self) -> Result<Vec<BitmexPosition>, BitmexHttpError> {
        let request = self.private(Method::GET, "/position", &())?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Returns the home notional of the position in the client symbol, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn delta(&self) -> Result<Option<f64>, BitmexHttpError> {
        let params = GetPositionParams {
            filter: Some(json!({ "symbol": self.symbol.as_str() })),
            ..Default::default()
        };
        let request = self.private(Method::GET, "/position", &params)?;
        let positions: Vec<BitmexPosition> = self.send(&request, RequestOptions::default()).await?;
        Ok(positions
            .into_iter()
            .find(|position| position.symbol == self.symbol)
            .and_then(|position| position.home_notional))
    }

    /// Closes the position in `symbol` at `price`, or at market when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn close_position(
        &self,
        symbol: &str,
        price: Option<f64>,
    ) -> Result<BitmexOrder, BitmexHttpError> {
        let params = PostClosePositionParams {
            symbol: symbol.to_string(),
            price,
        };
        let request = self.private(Method::POST, "/order/closePosition", &params)?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Sets the leverage of an isolated margin position.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn isolate_margin(
        &self,
        symbol: &str,
        leverage: f64,
        rethrow_errors: bool,
    ) -> Result<BitmexPosition, BitmexHttpError> {
        let params = PostPositionLeverageParams {
            symbol: symbol.to_string(),
            leverage,
        };
        let request = self.private(Method::POST, "/position/leverage", &params)?;
        self.send(&request, RequestOptions::default().with_rethrow(rethrow_errors))
            .await
    }

    /// Returns the trade history, optionally restricted to `symbol`.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn history(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<BitmexExecution>, BitmexHttpError> {
        let params = GetTradeParams {
            symbol: symbol.map(String::from),
            ..Default::default()
        };
        let request = self.private(Method::GET, "/execution/tradeHistory", &params)?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Requests a withdrawal of `amount` satoshis to `address`.
    ///
    /// Never retried.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn withdraw(
        &self,
        amount: i64,
        fee: Option<i64>,
        address: &str,
    ) -> Result<BitmexTransaction, BitmexHttpError> {
        let params = PostWithdrawalParams {
            currency: BITMEX_SETTLEMENT_CURRENCY.to_string(),
            amount,
            fee,
            address: address.to_string(),
        };
        let request = self.private(Method::POST, "/user/requestWithdrawal", &params)?;
        self.send(&request, RequestOptions::default().with_max_retries(0))
            .await
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Places a buy order for `quantity` contracts.
    ///
    /// # Errors
    ///
    /// See [`Self::place_order`].
    pub async fn buy(
        &self,
        symbol: &str,
        quantity: i64,
        order_type: BitmexOrderType,
        price: Option<f64>,
        stop_px: Option<f64>,
    ) -> Result<BitmexOrder, BitmexHttpError> {
        let quantity = BitmexSide::Buy.signed_qty(quantity);
        self.place_order(symbol, quantity, order_type, price, stop_px)
            .await
    }

    /// Places a sell order for `quantity` contracts.
    ///
    /// # Errors
    ///
    /// See [`Self::place_order`].
    pub async fn sell(
        &self,
        symbol: &str,
        quantity: i64,
        order_type: BitmexOrderType,
        price: Option<f64>,
        stop_px: Option<f64>,
    ) -> Result<BitmexOrder, BitmexHttpError> {
        let quantity = BitmexSide::Sell.signed_qty(quantity);
        self.place_order(symbol, quantity, order_type, price, stop_px)
            .await
    }

    /// Places an order; `quantity` is signed, negative sells.
    ///
    /// A fresh clOrdID is attached so a resubmission can be reconciled.
    ///
    /// # Errors
    ///
    /// Returns [`BitmexHttpError::InvalidOrder`] before dispatch when a priced order
    /// type has no positive price, a triggered type has no positive stop price, or the
    /// quantity is zero. Otherwise returns an error if the request fails.
    pub async fn place_order(
        &self,
        symbol: &str,
        quantity: i64,
        order_type: BitmexOrderType,
        price: Option<f64>,
        stop_px: Option<f64>,
    ) -> Result<BitmexOrder, BitmexHttpError> {
        let params = PostOrderParams {
            symbol: symbol.to_string(),
            order_qty: quantity,
            price: price.filter(|_| order_type.requires_price()),
            stop_px: stop_px.filter(|_| order_type.requires_stop_px()),
            ord_type: Some(order_type),
            cl_ord_id: Some(generate_cl_ord_id(&self.cl_ord_id_prefix)),
            ..Default::default()
        };
        validate_order(&params, price, stop_px)?;

        let request = self.private(Method::POST, "/order", &params)?;
        let value = self.inner.execute(&request, RequestOptions::default()).await?;
        single_order(value)
    }

    /// Creates several orders in the client symbol in one request.
    ///
    /// Orders without a clOrdID receive a generated one.
    ///
    /// # Errors
    ///
    /// Returns [`BitmexHttpError::InvalidOrder`] before dispatch if any order is invalid,
    /// otherwise an error if the request fails.
    pub async fn create_bulk_orders(
        &self,
        mut orders: Vec<PostOrderParams>,
    ) -> Result<Vec<BitmexOrder>, BitmexHttpError> {
        for order in &mut orders {
            order.symbol = self.symbol.to_string();
            if order.cl_ord_id.is_none() {
                order.cl_ord_id = Some(generate_cl_ord_id(&self.cl_ord_id_prefix));
            }
            validate_order(order, order.price, order.stop_px)?;
        }

        let request = self.private(Method::POST, "/order/bulk", &PostBulkOrdersParams { orders })?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Amends several orders in one request.
    ///
    /// Errors are always returned to the caller rather than treated as fatal, so a
    /// failed amend can be retried on the next cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if any order lacks a unique identifier or the request fails.
    pub async fn amend_bulk_orders(
        &self,
        orders: Vec<PutOrderParams>,
    ) -> Result<Vec<BitmexOrder>, BitmexHttpError> {
        for order in &orders {
            order.validate()?;
        }

        let request = self.private(Method::PUT, "/order/bulk", &PutBulkOrdersParams { orders })?;
        self.send(&request, RequestOptions::default().with_rethrow(true))
            .await
    }

    /// Returns the open orders in the client symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn active_orders(&self) -> Result<Vec<BitmexOrder>, BitmexHttpError> {
        let params = GetOrderParams {
            filter: Some(json!({ "open": true, "symbol": self.symbol.as_str() })),
            count: Some(BITMEX_MAX_COUNT),
            ..Default::default()
        };
        let request = self.private(Method::GET, "/order", &params)?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Cancels the orders with the given IDs.
    ///
    /// Orders already gone resolve to an empty result.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn cancel<S: AsRef<str>>(
        &self,
        order_ids: &[S],
    ) -> Result<Vec<BitmexOrder>, BitmexHttpError> {
        let params = DeleteOrderParams {
            order_id: Some(order_ids.iter().map(|id| id.as_ref().to_string()).collect()),
            ..Default::default()
        };
        let request = self.private(Method::DELETE, "/order", &params)?;
        self.send(&request, RequestOptions::default()).await
    }

    /// Cancels every open order in the client symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the open orders cannot be listed or canceled.
    pub async fn cancel_all_orders(&self) -> Result<Vec<BitmexOrder>, BitmexHttpError> {
        let orders = self.active_orders().await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<String> = orders
            .iter()
            .map(|order| order.order_id.to_string())
            .collect();
        tracing::info!("Canceling {} open orders", order_ids.len());
        self.cancel(&order_ids).await
    }

    /// Returns the local status of an order, or `None` when BitMEX does not know it.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing, the request fails, or the API returns an error.
    pub async fn order_status(
        &self,
        order_id: Uuid,
    ) -> Result<Option<OrderStatusReport>, BitmexHttpError> {
        let params = GetOrderParams {
            filter: Some(json!({ "orderID": order_id })),
            ..Default::default()
        };
        let request = self.private(Method::GET, "/order", &params)?;
        let orders: Vec<BitmexOrder> = self.send(&request, RequestOptions::default()).await?;
        Ok(orders.first().map(read_order_status))
    }
}

fn validate_order(
    params: &PostOrderParams,
    price: Option<f64>,
    stop_px: Option<f64>,
) -> Result<(), BitmexHttpError> {
    if params.order_qty == 0 {
        return Err(BitmexHttpError::InvalidOrder(
            "Order quantity must be non-zero".to_string(),
        ));
    }

    let order_type = params.ord_type.unwrap_or(BitmexOrderType::Limit);
    if order_type.requires_price() && !price.is_some_and(|price| price > 0.0) {
        return Err(BitmexHttpError::InvalidOrder(format!(
            "Price must be positive for {order_type} orders, was {price:?}"
        )));
    }
    if order_type.requires_stop_px() && !stop_px.is_some_and(|stop_px| stop_px > 0.0) {
        return Err(BitmexHttpError::InvalidOrder(format!(
            "Stop price must be positive for {order_type} orders, was {stop_px:?}"
        )));
    }
    Ok(())
}

// A recovered duplicate arrives as the array of fetched orders
fn single_order(value: Value) -> Result<BitmexOrder, BitmexHttpError> {
    let value = match value {
        Value::Array(orders) => orders.into_iter().next().ok_or_else(|| {
            BitmexHttpError::JsonError("Expected an order, received an empty array".to_string())
        })?,
        other => other,
    };
    serde_json::from_value(value).map_err(Into::into)
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
