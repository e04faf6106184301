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

//! Builder types for BitMEX REST query parameters and request bodies.
//!
//! Parameters of GET and DELETE requests are url-encoded into the query string, so
//! structured values such as `filter` or an `orderID` list are sent as JSON text.

use derive_builder::Builder;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{
    common::enums::{BitmexOrderType, BitmexSide},
    http::error::BitmexBuildError,
};

/// Serializes a value as its compact JSON text so it can travel in a query string.
fn serialize_json_text<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(value) => {
            let text = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
            serializer.serialize_some(&text)
        }
        None => serializer.serialize_none(),
    }
}

/// Query parameters for `GET /instrument`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into, strip_option), build_fn(error = "BitmexBuildError"))]
pub struct GetInstrumentParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_json_text"
    )]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
}

/// Query parameters for `GET /orderBook/L2`.
#[derive(Clone, Debug, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into), build_fn(error = "BitmexBuildError"))]
pub struct GetOrderBookParams {
    pub symbol: String,
    /// Levels per side, `0` returns the full book.
    #[builder(default = "25")]
    pub depth: u32,
}

/// Query parameters for `GET /trade` and `GET /execution/tradeHistory`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into, strip_option), build_fn(error = "BitmexBuildError"))]
pub struct GetTradeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_json_text"
    )]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
}

/// Query parameters for `GET /order`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into, strip_option), build_fn(error = "BitmexBuildError"))]
pub struct GetOrderParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_json_text"
    )]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
}

/// Query parameters for `GET /position`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into, strip_option), build_fn(error = "BitmexBuildError"))]
pub struct GetPositionParams {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_json_text"
    )]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Body of `POST /order` and one entry of `POST /order/bulk`.
///
/// `order_qty` is signed, negative quantities sell.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into), build_fn(error = "BitmexBuildError"))]
pub struct PostOrderParams {
    #[builder(default)]
    pub symbol: String,
    pub order_qty: i64,
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_px: Option<f64>,
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_type: Option<BitmexOrderType>,
    #[builder(default, setter(strip_option))]
    #[serde(rename = "clOrdID", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_inst: Option<String>,
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl PostOrderParams {
    /// Side implied by the sign of `order_qty`.
    #[must_use]
    pub const fn side(&self) -> BitmexSide {
        BitmexSide::from_signed_qty(self.order_qty)
    }
}

/// Body of `POST /order/bulk`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PostBulkOrdersParams {
    pub orders: Vec<PostOrderParams>,
}

/// One entry of `PUT /order/bulk`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into, strip_option), build_fn(error = "BitmexBuildError"))]
pub struct PutOrderParams {
    #[serde(rename = "orderID", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(rename = "origClOrdID", skip_serializing_if = "Option::is_none")]
    pub orig_cl_ord_id: Option<String>,
    #[serde(rename = "clOrdID", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_qty: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaves_qty: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_px: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl PutOrderParams {
    /// Checks that exactly one of `orderID` and `origClOrdID` identifies the order.
    ///
    /// # Errors
    ///
    /// Returns an error if neither or both identifiers are set.
    pub fn validate(&self) -> Result<(), BitmexBuildError> {
        match (&self.order_id, &self.orig_cl_ord_id) {
            (Some(_), Some(_)) => Err(BitmexBuildError::BothOrderIds),
            (None, None) => Err(BitmexBuildError::MissingOrderId),
            _ => Ok(()),
        }
    }
}

/// Body of `PUT /order/bulk`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PutBulkOrdersParams {
    pub orders: Vec<PutOrderParams>,
}

/// Query parameters for `DELETE /order`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into, strip_option), build_fn(error = "BitmexBuildError"))]
pub struct DeleteOrderParams {
    #[serde(
        rename = "orderID",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_json_text"
    )]
    pub order_id: Option<Vec<String>>,
    #[serde(
        rename = "clOrdID",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_json_text"
    )]
    pub cl_ord_id: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Body of `POST /order/closePosition`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostClosePositionParams {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Body of `POST /position/leverage`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPositionLeverageParams {
    pub symbol: String,
    /// Leverage between 0.01 and 100, `0` switches the position to cross margin.
    pub leverage: f64,
}

/// Body of `POST /user/requestWithdrawal`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithdrawalParams {
    pub currency: String,
    /// Amount in satoshis.
    pub amount: i64,
    /// Network fee in satoshis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<i64>,
    pub address: String,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
