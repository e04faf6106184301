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

//! Integration tests for the BitMEX HTTP client using a scripted mock server.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use liquidbot_bitmex::{
    common::{credential::generate_signature, enums::BitmexOrderType},
    config::BitmexHttpConfig,
    http::{
        auth::AuthScheme,
        client::{BitmexHttpClient, RequestOptions},
        error::BitmexHttpError,
        query::{PostOrderParams, PutOrderParams},
        request::BitmexRequest,
        retry::RetryPolicy,
    },
};
use rstest::rstest;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use ustr::Ustr;

const API_KEY: &str = "test_api_key";
const API_SECRET: &str = "test_api_secret";
const API_PREFIX: &str = "/api/v1";

type Responder = Arc<dyn Fn(&[RecordedRequest]) -> Value + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Json(StatusCode, Value),
    RateLimited { reset_in_secs: i64 },
    Delayed(Duration, Value),
    Dynamic(Responder),
}

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: String,
    signature_valid: Option<bool>,
}

impl RecordedRequest {
    fn query_param(&self, key: &str) -> Option<String> {
        let params: HashMap<String, String> =
            serde_urlencoded::from_str(self.query.as_deref().unwrap_or_default()).ok()?;
        params.get(key).cloned()
    }
}

#[derive(Clone, Default)]
struct TestServerState {
    replies: Arc<Mutex<HashMap<(Method, String), VecDeque<Reply>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServerState {
    async fn enqueue(&self, method: Method, path: &str, reply: Reply) {
        self.replies
            .lock()
            .await
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    async fn count(&self, method: &Method, path: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.method == *method && r.path == path)
            .count()
    }
}

fn error_body(message: &str) -> Value {
    json!({ "error": { "message": message, "name": "HTTPError" } })
}

fn load_test_data(filename: &str) -> Value {
    let path = format!("test_data/{filename}");
    let content = std::fs::read_to_string(path).expect("Failed to read test data");
    serde_json::from_str(&content).expect("Failed to parse test data")
}

fn verify_signature(method: &Method, uri: &Uri, headers: &HeaderMap, body: &str) -> Option<bool> {
    let signature = headers.get("api-signature")?.to_str().ok()?;
    let nonce = headers
        .get("api-expires")
        .or_else(|| headers.get("api-nonce"))?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()?;
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);

    let expected = generate_signature(API_SECRET.as_bytes(), method.as_str(), &path, nonce, body);
    Some(expected == signature)
}

async fn handle_any(
    State(state): State<TestServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri
        .path()
        .strip_prefix(API_PREFIX)
        .unwrap_or(uri.path())
        .to_string();
    let recorded = RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        query: uri.query().map(String::from),
        signature_valid: verify_signature(&method, &uri, &headers, &body),
        headers,
        body,
    };

    if recorded.signature_valid == Some(false) {
        state.requests.lock().await.push(recorded);
        return (StatusCode::UNAUTHORIZED, axum::Json(error_body("Signature not valid.")))
            .into_response();
    }

    let history = {
        let mut requests = state.requests.lock().await;
        requests.push(recorded);
        requests.clone()
    };

    let reply = state
        .replies
        .lock()
        .await
        .get_mut(&(method, path))
        .and_then(VecDeque::pop_front);

    match reply {
        Some(Reply::Json(status, value)) => (status, axum::Json(value)).into_response(),
        Some(Reply::RateLimited { reset_in_secs }) => Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("content-type", "application/json")
            .header(
                "x-ratelimit-reset",
                (Utc::now().timestamp() + reset_in_secs).to_string(),
            )
            .body(Body::from(
                error_body("Rate limit exceeded, retry in 1 seconds.").to_string(),
            ))
            .unwrap(),
        Some(Reply::Delayed(delay, value)) => {
            tokio::time::sleep(delay).await;
            axum::Json(value).into_response()
        }
        Some(Reply::Dynamic(responder)) => axum::Json(responder(&history)).into_response(),
        None => axum::Json(json!([])).into_response(),
    }
}

async fn start_test_server() -> (SocketAddr, TestServerState) {
    // Bind to port 0 to let the OS assign an available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = TestServerState::default();
    let router = Router::new().fallback(handle_any).with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, state)
}

fn test_config(addr: SocketAddr, authenticated: bool) -> BitmexHttpConfig {
    BitmexHttpConfig {
        api_key: authenticated.then(|| API_KEY.to_string()),
        api_secret: authenticated.then(|| API_SECRET.to_string()),
        base_url: Some(format!("http://{addr}{API_PREFIX}")),
        retry_policy: RetryPolicy {
            connection_error_delay: Duration::from_millis(10),
            service_unavailable_delay: Duration::from_millis(10),
            rate_limit_fallback_delay: Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn instrument_request() -> BitmexRequest {
    BitmexRequest::builder(Method::GET, "/instrument")
        .query(&json!({ "symbol": "XBTUSD" }))
        .build()
        .unwrap()
}

// Echoes the orders of the last submission to `path` back as BitMEX would store them
fn orders_from_submission(history: &[RecordedRequest], path: &str, price_offset: f64) -> Value {
    let post = history
        .iter()
        .rev()
        .find(|r| r.method == Method::POST && r.path == path)
        .expect("no order submission recorded");
    let body: Value = serde_json::from_str(&post.body).unwrap();
    let submitted = match body.get("orders") {
        Some(Value::Array(orders)) => orders.clone(),
        _ => vec![body],
    };

    Value::Array(
        submitted
            .iter()
            .enumerate()
            .map(|(i, order)| {
                let qty = order["orderQty"].as_i64().unwrap();
                json!({
                    "orderID": format!("6d2b1a0e-3e59-4f1c-8a7b-3c1f1f3c9a0{i}"),
                    "clOrdID": order["clOrdID"],
                    "symbol": order["symbol"],
                    "side": if qty > 0 { "Buy" } else { "Sell" },
                    "orderQty": qty.abs(),
                    "price": order["price"].as_f64().unwrap() + price_offset,
                    "ordType": "Limit",
                    "ordStatus": "New",
                    "workingIndicator": true,
                    "leavesQty": qty.abs(),
                    "cumQty": 0,
                })
            })
            .collect(),
    )
}

fn order_from_post(history: &[RecordedRequest], price_offset: f64) -> Value {
    orders_from_submission(history, "/order", price_offset)
}

#[rstest]
#[tokio::test]
async fn test_public_request_sends_fixed_headers_without_auth() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/instrument/active",
            Reply::Json(StatusCode::OK, load_test_data("http_get_instrument_xbtusd.json")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let symbols = client.symbols().await.unwrap();

    assert_eq!(symbols, vec![Ustr::from("XBTUSD")]);
    let request = &state.requests().await[0];
    assert_eq!(request.headers["content-type"], "application/json");
    assert_eq!(request.headers["accept"], "application/json");
    assert!(
        request.headers["user-agent"]
            .to_str()
            .unwrap()
            .starts_with("liquidbot/")
    );
    assert!(!request.headers.contains_key("api-key"));
    assert!(!request.headers.contains_key("api-signature"));
}

#[rstest]
#[tokio::test]
async fn test_ticker_and_today() {
    let (addr, state) = start_test_server().await;
    for _ in 0..2 {
        state
            .enqueue(
                Method::GET,
                "/instrument",
                Reply::Json(StatusCode::OK, load_test_data("http_get_instrument_xbtusd.json")),
            )
            .await;
    }
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let ticker = client.ticker(None).await.unwrap();
    let today = client.today("XBTUSD").await.unwrap();

    assert_eq!(ticker.mid, Some(95_000.25));
    assert_eq!(today.high, Some(96_250.0));
    assert_eq!(
        state.requests().await[0].query_param("symbol").as_deref(),
        Some("XBTUSD")
    );
}

#[rstest]
#[tokio::test]
async fn test_private_request_is_signed_over_exact_path_and_body() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/user/margin",
            Reply::Json(StatusCode::OK, load_test_data("http_get_margin.json")),
        )
        .await;
    state
        .enqueue(
            Method::POST,
            "/order/closePosition",
            Reply::Json(
                StatusCode::OK,
                json!({"orderID": "9a4f2c7d-1b8e-4d3a-9f6c-5e2d7b8a0c02", "ordStatus": "Filled"}),
            ),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let margin = client.balances().await.unwrap();
    client.close_position("XBTUSD", Some(95_000.0)).await.unwrap();

    assert_eq!(margin.margin_balance, Some(4_193_712_700));
    let requests = state.requests().await;
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.signature_valid, Some(true));
        assert_eq!(request.headers["api-key"], API_KEY);
        assert!(request.headers.contains_key("api-expires"));
        assert!(!request.headers.contains_key("api-nonce"));
    }
    assert_eq!(requests[0].query.as_deref(), Some("currency=XBt"));
    assert_eq!(requests[1].body, r#"{"symbol":"XBTUSD","price":95000.0}"#);
}

#[rstest]
#[tokio::test]
async fn test_nonce_scheme_sends_increasing_nonces() {
    let (addr, state) = start_test_server().await;
    let config = BitmexHttpConfig {
        auth_scheme: AuthScheme::Nonce,
        ..test_config(addr, true)
    };
    let client = BitmexHttpClient::new(&config).unwrap();

    client.positions().await.unwrap();
    client.positions().await.unwrap();

    let nonces: Vec<u64> = state
        .requests()
        .await
        .iter()
        .map(|r| {
            assert_eq!(r.signature_valid, Some(true));
            assert!(!r.headers.contains_key("api-expires"));
            r.headers["api-nonce"].to_str().unwrap().parse().unwrap()
        })
        .collect();
    assert!(nonces[0] < nonces[1]);
}

#[rstest]
#[tokio::test]
async fn test_private_call_without_credentials_is_not_dispatched() {
    let (addr, state) = start_test_server().await;
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let result = client.active_orders().await;

    assert!(matches!(result, Err(BitmexHttpError::MissingCredentials)));
    assert!(state.requests().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_get_503_exhausts_three_retries() {
    let (addr, state) = start_test_server().await;
    for _ in 0..4 {
        state
            .enqueue(
                Method::GET,
                "/instrument",
                Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable")),
            )
            .await;
    }
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let result = client
        .execute(&instrument_request(), RequestOptions::default())
        .await;

    let error = result.unwrap_err();
    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::MaxRetriesExceeded { max_retries: 3, .. }
    ));
    assert_eq!(state.count(&Method::GET, "/instrument").await, 4);
}

#[rstest]
#[tokio::test]
async fn test_max_retries_exceeded_honors_rethrow() {
    let (addr, state) = start_test_server().await;
    for _ in 0..2 {
        state
            .enqueue(
                Method::GET,
                "/instrument",
                Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable")),
            )
            .await;
    }
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();
    let options = RequestOptions::default()
        .with_rethrow(true)
        .with_max_retries(1);

    let error = client
        .execute(&instrument_request(), options)
        .await
        .unwrap_err();

    assert!(!error.is_fatal());
    assert!(matches!(
        error,
        BitmexHttpError::MaxRetriesExceeded { max_retries: 1, .. }
    ));
    assert_eq!(state.count(&Method::GET, "/instrument").await, 2);
}

#[rstest]
#[tokio::test]
async fn test_retry_budget_resets_between_calls() {
    let (addr, state) = start_test_server().await;
    let unavailable = Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable"));
    let instrument = Reply::Json(StatusCode::OK, load_test_data("http_get_instrument_xbtusd.json"));
    for reply in [
        unavailable.clone(),
        unavailable.clone(),
        instrument.clone(),
        unavailable.clone(),
        unavailable.clone(),
        unavailable,
        instrument,
    ] {
        state.enqueue(Method::GET, "/instrument", reply).await;
    }
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let first = client.instrument("XBTUSD").await.unwrap();
    let second = client.instrument("XBTUSD").await.unwrap();

    assert_eq!(first.symbol, "XBTUSD");
    assert_eq!(second.symbol, "XBTUSD");
    assert_eq!(state.count(&Method::GET, "/instrument").await, 7);
}

#[rstest]
#[tokio::test]
async fn test_post_503_is_not_retried() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order",
            Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client
        .buy("XBTUSD", 100, BitmexOrderType::Limit, Some(95_000.0), None)
        .await
        .unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::MaxRetriesExceeded { max_retries: 0, .. }
    ));
    assert_eq!(state.count(&Method::POST, "/order").await, 1);
}

#[rstest]
#[tokio::test]
async fn test_401_is_fatal_even_with_rethrow() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/instrument",
            Reply::Json(StatusCode::UNAUTHORIZED, error_body("Invalid API Key.")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let error = client
        .execute(&instrument_request(), RequestOptions::default().with_rethrow(true))
        .await
        .unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::AuthenticationFailed { .. }
    ));
    assert_eq!(state.count(&Method::GET, "/instrument").await, 1);
}

#[rstest]
#[tokio::test]
async fn test_delete_404_returns_empty() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::DELETE,
            "/order",
            Reply::Json(StatusCode::NOT_FOUND, error_body("Not Found")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let canceled = client
        .cancel(&["6d2b1a0e-3e59-4f1c-8a7b-3c1f1f3c9a01"])
        .await
        .unwrap();

    assert!(canceled.is_empty());
    let requests = state.requests().await;
    assert_eq!(
        requests[0].query_param("orderID").as_deref(),
        Some(r#"["6d2b1a0e-3e59-4f1c-8a7b-3c1f1f3c9a01"]"#)
    );
}

#[rstest]
#[case(false, true)]
#[case(true, false)]
#[tokio::test]
async fn test_get_404_is_fatal_or_rethrown(#[case] rethrow: bool, #[case] fatal: bool) {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/instrument",
            Reply::Json(StatusCode::NOT_FOUND, error_body("Not Found")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let error = client
        .execute(&instrument_request(), RequestOptions::default().with_rethrow(rethrow))
        .await
        .unwrap_err();

    assert_eq!(error.is_fatal(), fatal);
    assert!(matches!(error.inner(), BitmexHttpError::NotFound { .. }));
    assert_eq!(state.count(&Method::GET, "/instrument").await, 1);
}

#[rstest]
#[tokio::test]
async fn test_duplicate_cl_ord_id_recovers_matching_order() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order",
            Reply::Json(StatusCode::BAD_REQUEST, error_body("Duplicate clOrdID")),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Dynamic(Arc::new(|history: &[RecordedRequest]| order_from_post(history, 0.0))),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let order = client
        .sell("XBTUSD", 100, BitmexOrderType::Limit, Some(95_000.5), None)
        .await
        .unwrap();

    let requests = state.requests().await;
    let post_body: Value = serde_json::from_str(&requests[0].body).unwrap();
    let cl_ord_id = post_body["clOrdID"].as_str().unwrap();
    assert!(cl_ord_id.starts_with("mm_bitmex_"));
    assert_eq!(post_body["orderQty"], -100);
    assert_eq!(order.cl_ord_id.unwrap().as_str(), cl_ord_id);
    assert_eq!(order.order_qty, Some(100));

    let filter: Value = serde_json::from_str(&requests[1].query_param("filter").unwrap()).unwrap();
    assert_eq!(filter, json!({ "clOrdID": [cl_ord_id] }));
    assert_eq!(requests[1].signature_valid, Some(true));
}

#[rstest]
#[tokio::test]
async fn test_duplicate_cl_ord_id_price_mismatch_is_fatal() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order",
            Reply::Json(StatusCode::BAD_REQUEST, error_body("Duplicate clOrdID")),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Dynamic(Arc::new(|history: &[RecordedRequest]| order_from_post(history, 1.0))),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client
        .buy("XBTUSD", 100, BitmexOrderType::Limit, Some(95_000.0), None)
        .await
        .unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::DuplicateOrderMismatch { .. }
    ));
}

#[rstest]
#[tokio::test]
async fn test_insufficient_balance_is_fatal() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order",
            Reply::Json(
                StatusCode::BAD_REQUEST,
                error_body("Account has insufficient Available Balance, 2000 XBt required"),
            ),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client
        .place_order("XBTUSD", 100, BitmexOrderType::Market, None, None)
        .await
        .unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::InsufficientBalance { .. }
    ));
}

#[rstest]
#[tokio::test]
async fn test_invalid_price_rejected_before_dispatch() {
    let (addr, state) = start_test_server().await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let missing = client
        .place_order("XBTUSD", 100, BitmexOrderType::Limit, None, None)
        .await;
    let negative = client
        .place_order("XBTUSD", 100, BitmexOrderType::Limit, Some(-1.0), None)
        .await;

    assert!(matches!(missing, Err(BitmexHttpError::InvalidOrder(_))));
    assert!(matches!(negative, Err(BitmexHttpError::InvalidOrder(_))));
    assert!(state.requests().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_stop_limit_carries_stop_price() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order",
            Reply::Json(
                StatusCode::OK,
                json!({"orderID": "9a4f2c7d-1b8e-4d3a-9f6c-5e2d7b8a0c02", "ordStatus": "New"}),
            ),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    client
        .sell(
            "XBTUSD",
            50,
            BitmexOrderType::StopLimit,
            Some(94_000.0),
            Some(94_500.0),
        )
        .await
        .unwrap();

    let body: Value = serde_json::from_str(&state.requests().await[0].body).unwrap();
    assert_eq!(body["ordType"], "StopLimit");
    assert_eq!(body["price"], 94_000.0);
    assert_eq!(body["stopPx"], 94_500.0);
    assert_eq!(body["orderQty"], -50);
}

#[rstest]
#[tokio::test]
async fn test_rate_limit_cancels_orders_and_waits_for_reset() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/user/margin",
            Reply::RateLimited { reset_in_secs: 2 },
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/user/margin",
            Reply::Json(StatusCode::OK, load_test_data("http_get_margin.json")),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Json(StatusCode::OK, load_test_data("http_get_orders.json")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let start = Instant::now();
    let margin = client.balances().await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(margin.currency.as_str(), "XBt");

    let requests = state.requests().await;
    let paths: Vec<(Method, &str)> = requests
        .iter()
        .map(|r| (r.method.clone(), r.path.as_str()))
        .collect();
    assert_eq!(
        paths,
        vec![
            (Method::GET, "/user/margin"),
            (Method::GET, "/order"),
            (Method::DELETE, "/order"),
            (Method::GET, "/user/margin"),
        ]
    );

    let filter: Value = serde_json::from_str(&requests[1].query_param("filter").unwrap()).unwrap();
    assert_eq!(filter, json!({ "open": true }));
    assert_eq!(requests[1].query_param("count").as_deref(), Some("500"));

    let order_ids: Vec<String> =
        serde_json::from_str(&requests[2].query_param("orderID").unwrap()).unwrap();
    assert_eq!(
        order_ids,
        vec![
            "6d2b1a0e-3e59-4f1c-8a7b-3c1f1f3c9a01",
            "9a4f2c7d-1b8e-4d3a-9f6c-5e2d7b8a0c02",
        ]
    );
}

#[rstest]
#[case(false)]
#[case(true)]
#[tokio::test]
async fn test_rate_limit_on_market_data_does_not_cancel(#[case] authenticated: bool) {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/instrument",
            Reply::RateLimited { reset_in_secs: 0 },
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/instrument",
            Reply::Json(StatusCode::OK, load_test_data("http_get_instrument_xbtusd.json")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, authenticated)).unwrap();

    client.instrument("XBTUSD").await.unwrap();

    assert_eq!(state.count(&Method::GET, "/order").await, 0);
    assert_eq!(state.count(&Method::DELETE, "/order").await, 0);
    assert_eq!(state.count(&Method::GET, "/instrument").await, 2);
}

#[rstest]
#[tokio::test]
async fn test_timeout_is_retried() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/instrument",
            Reply::Delayed(Duration::from_millis(500), json!([])),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/instrument",
            Reply::Json(StatusCode::OK, load_test_data("http_get_instrument_xbtusd.json")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();
    let options = RequestOptions::default().with_timeout(Duration::from_millis(100));

    let value = client.execute(&instrument_request(), options).await.unwrap();

    assert_eq!(value[0]["symbol"], "XBTUSD");
    assert_eq!(state.count(&Method::GET, "/instrument").await, 2);
}

#[rstest]
#[tokio::test]
async fn test_connection_error_retried_until_budget_exhausted() {
    // Reserve a port then close it so connections are refused
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = BitmexHttpClient::new(&test_config(addr, false)).unwrap();

    let error = client
        .execute(&instrument_request(), RequestOptions::default().with_rethrow(true))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        BitmexHttpError::MaxRetriesExceeded { max_retries: 3, .. }
    ));
}

#[rstest]
#[tokio::test]
async fn test_amend_bulk_orders_always_rethrows() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::PUT,
            "/order/bulk",
            Reply::Json(StatusCode::BAD_GATEWAY, error_body("Bad Gateway")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client
        .amend_bulk_orders(vec![PutOrderParams {
            order_id: Some("6d2b1a0e-3e59-4f1c-8a7b-3c1f1f3c9a01".to_string()),
            price: Some(95_010.0),
            ..Default::default()
        }])
        .await
        .unwrap_err();

    assert!(!error.is_fatal());
    assert!(matches!(
        error,
        BitmexHttpError::UnexpectedStatus {
            status: StatusCode::BAD_GATEWAY,
            ..
        }
    ));
    assert_eq!(state.count(&Method::PUT, "/order/bulk").await, 1);
}

#[rstest]
#[tokio::test]
async fn test_create_bulk_orders_sets_symbol_and_cl_ord_ids() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order/bulk",
            Reply::Dynamic(Arc::new(|history: &[RecordedRequest]| {
                let body: Value = serde_json::from_str(&history[0].body).unwrap();
                let orders = body["orders"].as_array().unwrap();
                Value::Array(
                    orders
                        .iter()
                        .enumerate()
                        .map(|(i, order)| {
                            json!({
                                "orderID": format!("00000000-0000-0000-0000-00000000000{i}"),
                                "clOrdID": order["clOrdID"],
                                "symbol": order["symbol"],
                                "orderQty": order["orderQty"].as_i64().unwrap().abs(),
                                "price": order["price"],
                                "ordStatus": "New",
                                "workingIndicator": true,
                            })
                        })
                        .collect(),
                )
            })),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();
    let orders = vec![
        PostOrderParams {
            order_qty: 100,
            price: Some(94_990.0),
            ..Default::default()
        },
        PostOrderParams {
            order_qty: -100,
            price: Some(95_010.0),
            cl_ord_id: Some("mm_bitmex_fixed".to_string()),
            ..Default::default()
        },
    ];

    let created = client.create_bulk_orders(orders).await.unwrap();

    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|o| o.symbol == Some(Ustr::from("XBTUSD"))));
    assert!(
        created[0]
            .cl_ord_id
            .unwrap()
            .as_str()
            .starts_with("mm_bitmex_")
    );
    assert_eq!(created[1].cl_ord_id, Some(Ustr::from("mm_bitmex_fixed")));
}

#[rstest]
#[tokio::test]
async fn test_cancel_all_orders_cancels_active_orders() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Json(StatusCode::OK, load_test_data("http_get_orders.json")),
        )
        .await;
    state
        .enqueue(
            Method::DELETE,
            "/order",
            Reply::Json(
                StatusCode::OK,
                json!([
                    {"orderID": "6d2b1a0e-3e59-4f1c-8a7b-3c1f1f3c9a01", "ordStatus": "Canceled"},
                    {"orderID": "9a4f2c7d-1b8e-4d3a-9f6c-5e2d7b8a0c02", "ordStatus": "Canceled"},
                ]),
            ),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let canceled = client.cancel_all_orders().await.unwrap();

    assert_eq!(canceled.len(), 2);
    let requests = state.requests().await;
    let filter: Value = serde_json::from_str(&requests[0].query_param("filter").unwrap()).unwrap();
    assert_eq!(filter, json!({ "open": true, "symbol": "XBTUSD" }));
    assert_eq!(requests[1].method, Method::DELETE);
}

#[rstest]
#[tokio::test]
async fn test_withdraw_is_never_retried() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/user/requestWithdrawal",
            Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client
        .withdraw(100_000, Some(1_000), "bc1qexampleaddress")
        .await
        .unwrap_err();

    assert!(error.is_fatal());
    assert_eq!(
        state.count(&Method::POST, "/user/requestWithdrawal").await,
        1
    );
    let body: Value = serde_json::from_str(&state.requests().await[0].body).unwrap();
    assert_eq!(body["currency"], "XBt");
    assert_eq!(body["amount"], 100_000);
}

#[rstest]
#[tokio::test]
async fn test_rate_limit_cancel_auth_failure_is_fatal() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/user/margin",
            Reply::RateLimited { reset_in_secs: 0 },
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/user/margin",
            Reply::Json(StatusCode::OK, load_test_data("http_get_margin.json")),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Json(StatusCode::UNAUTHORIZED, error_body("Invalid API Key.")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client.balances().await.unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::AuthenticationFailed { .. }
    ));
    assert_eq!(state.count(&Method::GET, "/user/margin").await, 1);
    assert_eq!(state.count(&Method::DELETE, "/order").await, 0);
}

#[rstest]
#[tokio::test]
async fn test_rate_limit_cancel_transient_failure_is_ignored() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::GET,
            "/user/margin",
            Reply::RateLimited { reset_in_secs: 0 },
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/user/margin",
            Reply::Json(StatusCode::OK, load_test_data("http_get_margin.json")),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let margin = client.balances().await.unwrap();

    assert_eq!(margin.margin_balance, Some(4_193_712_700));
    assert_eq!(state.count(&Method::GET, "/order").await, 1);
    assert_eq!(state.count(&Method::GET, "/user/margin").await, 2);
}

#[rstest]
#[tokio::test]
async fn test_put_503_is_not_retried() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::PUT,
            "/order/bulk",
            Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable")),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client
        .amend_bulk_orders(vec![PutOrderParams {
            orig_cl_ord_id: Some("mm_bitmex_0001".to_string()),
            order_qty: Some(200),
            ..Default::default()
        }])
        .await
        .unwrap_err();

    assert!(!error.is_fatal());
    assert!(matches!(
        error,
        BitmexHttpError::MaxRetriesExceeded { max_retries: 0, .. }
    ));
    assert_eq!(state.count(&Method::PUT, "/order/bulk").await, 1);
}

#[rstest]
#[tokio::test]
async fn test_delete_503_exhausts_three_retries() {
    let (addr, state) = start_test_server().await;
    for _ in 0..4 {
        state
            .enqueue(
                Method::DELETE,
                "/order",
                Reply::Json(StatusCode::SERVICE_UNAVAILABLE, error_body("Service unavailable")),
            )
            .await;
    }
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();

    let error = client
        .cancel(&["6d2b1a0e-3e59-4f1c-8a7b-3c1f1f3c9a01"])
        .await
        .unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::MaxRetriesExceeded { max_retries: 3, .. }
    ));
    assert_eq!(state.count(&Method::DELETE, "/order").await, 4);
    assert!(
        state
            .requests()
            .await
            .iter()
            .all(|r| r.signature_valid == Some(true))
    );
}

#[rstest]
#[tokio::test]
async fn test_bulk_duplicate_cl_ord_id_recovers_all_orders() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order/bulk",
            Reply::Json(StatusCode::BAD_REQUEST, error_body("Duplicate clOrdID")),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Dynamic(Arc::new(|history: &[RecordedRequest]| {
                orders_from_submission(history, "/order/bulk", 0.0)
            })),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();
    let orders = vec![
        PostOrderParams {
            order_qty: 100,
            price: Some(94_990.0),
            ..Default::default()
        },
        PostOrderParams {
            order_qty: -100,
            price: Some(95_010.0),
            ..Default::default()
        },
    ];

    let recovered = client.create_bulk_orders(orders).await.unwrap();

    let requests = state.requests().await;
    let body: Value = serde_json::from_str(&requests[0].body).unwrap();
    let cl_ord_ids: Vec<&str> = body["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|order| order["clOrdID"].as_str().unwrap())
        .collect();
    let filter: Value = serde_json::from_str(&requests[1].query_param("filter").unwrap()).unwrap();
    assert_eq!(filter, json!({ "clOrdID": cl_ord_ids }));
    assert_eq!(recovered.len(), 2);
    assert_eq!(
        recovered[1].cl_ord_id.map(|id| id.to_string()).as_deref(),
        Some(cl_ord_ids[1])
    );
    assert_eq!(state.count(&Method::POST, "/order/bulk").await, 1);
}

#[rstest]
#[tokio::test]
async fn test_bulk_duplicate_cl_ord_id_with_missing_order_is_mismatch() {
    let (addr, state) = start_test_server().await;
    state
        .enqueue(
            Method::POST,
            "/order/bulk",
            Reply::Json(StatusCode::BAD_REQUEST, error_body("Duplicate clOrdID")),
        )
        .await;
    state
        .enqueue(
            Method::GET,
            "/order",
            Reply::Dynamic(Arc::new(|history: &[RecordedRequest]| {
                let mut orders = orders_from_submission(history, "/order/bulk", 0.0);
                if let Value::Array(orders) = &mut orders {
                    orders.truncate(1);
                }
                orders
            })),
        )
        .await;
    let client = BitmexHttpClient::new(&test_config(addr, true)).unwrap();
    let orders = vec![
        PostOrderParams {
            order_qty: 100,
            price: Some(94_990.0),
            ..Default::default()
        },
        PostOrderParams {
            order_qty: -100,
            price: Some(95_010.0),
            ..Default::default()
        },
    ];

    let error = client.create_bulk_orders(orders).await.unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error.inner(),
        BitmexHttpError::DuplicateOrderMismatch { .. }
    ));
}
