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

//! Data structures representing BitMEX REST API payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ustr::Ustr;
use uuid::Uuid;

use crate::common::{
    enums::{BitmexOrderStatus, BitmexOrderType, BitmexSide},
    parse::parse_satoshis_to_xbt,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexInstrument {
    pub symbol: Ustr,
    pub root_symbol: Option<Ustr>,
    pub state: Option<Ustr>,
    pub tick_size: Option<f64>,
    pub lot_size: Option<f64>,
    pub last_price: Option<f64>,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub mid_price: Option<f64>,
    pub mark_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub volume: Option<f64>,
    pub volume24h: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl BitmexInstrument {
    /// Returns whether this is an index (symbols prefixed with `.` such as `.BXBT`).
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.symbol.as_str().starts_with('.')
    }
}

/// Best prices derived from an instrument snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BitmexTicker {
    pub last: Option<f64>,
    pub buy: Option<f64>,
    pub sell: Option<f64>,
    pub mid: Option<f64>,
}

impl From<&BitmexInstrument> for BitmexTicker {
    fn from(instrument: &BitmexInstrument) -> Self {
        // Indices never trade, the mark price is the only meaningful level
        if instrument.is_index() {
            let mark = instrument.mark_price;
            return Self {
                last: mark,
                buy: mark,
                sell: mark,
                mid: mark,
            };
        }

        let bid = instrument.bid_price.or(instrument.last_price);
        let ask = instrument.ask_price.or(instrument.last_price);
        let mid = match (bid, ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        };

        Self {
            last: instrument.last_price,
            buy: bid,
            sell: ask,
            mid,
        }
    }
}

/// Daily session statistics for an instrument.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BitmexDailyStats {
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub volume: Option<f64>,
}

impl From<&BitmexInstrument> for BitmexDailyStats {
    fn from(instrument: &BitmexInstrument) -> Self {
        Self {
            low: instrument.low_price,
            high: instrument.high_price,
            volume: instrument.volume,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexOrderBookL2 {
    pub symbol: Ustr,
    pub id: i64,
    pub side: BitmexSide,
    pub size: Option<i64>,
    pub price: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexTrade {
    pub timestamp: DateTime<Utc>,
    pub symbol: Ustr,
    pub side: Option<BitmexSide>,
    pub size: i64,
    pub price: f64,
    pub tick_direction: Option<Ustr>,
    #[serde(rename = "trdMatchID")]
    pub trd_match_id: Option<Uuid>,
    pub gross_value: Option<i64>,
    pub home_notional: Option<f64>,
    pub foreign_notional: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexOrder {
    #[serde(rename = "orderID")]
    pub order_id: Uuid,
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Option<Ustr>,
    pub account: Option<i64>,
    pub symbol: Option<Ustr>,
    pub side: Option<BitmexSide>,
    pub order_qty: Option<i64>,
    pub price: Option<f64>,
    pub stop_px: Option<f64>,
    pub ord_type: Option<BitmexOrderType>,
    pub ord_status: Option<BitmexOrderStatus>,
    pub working_indicator: Option<bool>,
    pub ord_rej_reason: Option<Ustr>,
    pub leaves_qty: Option<i64>,
    pub cum_qty: Option<i64>,
    pub avg_px: Option<f64>,
    pub text: Option<Ustr>,
    pub transact_time: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Execution row from the `execution/tradeHistory` endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexExecution {
    #[serde(rename = "execID")]
    pub exec_id: Uuid,
    #[serde(rename = "orderID")]
    pub order_id: Option<Uuid>,
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Option<Ustr>,
    pub symbol: Option<Ustr>,
    pub side: Option<BitmexSide>,
    pub last_qty: Option<i64>,
    pub last_px: Option<f64>,
    pub exec_type: Option<Ustr>,
    pub ord_status: Option<BitmexOrderStatus>,
    pub commission: Option<f64>,
    pub transact_time: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Position status.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexPosition {
    pub account: i64,
    pub symbol: Ustr,
    pub currency: Option<Ustr>,
    pub leverage: Option<f64>,
    pub cross_margin: Option<bool>,
    pub current_qty: Option<i64>,
    pub avg_entry_price: Option<f64>,
    pub liquidation_price: Option<f64>,
    pub is_open: Option<bool>,
    pub mark_price: Option<f64>,
    pub home_notional: Option<f64>,
    pub foreign_notional: Option<f64>,
    pub unrealised_pnl: Option<i64>,
    pub realised_pnl: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexMargin {
    pub account: i64,
    pub currency: Ustr,
    pub margin_balance: Option<i64>,
    pub available_margin: Option<i64>,
    pub wallet_balance: Option<i64>,
    pub unrealised_pnl: Option<i64>,
    pub realised_pnl: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl BitmexMargin {
    /// Margin balance converted from satoshis to XBT.
    #[must_use]
    pub fn margin_balance_xbt(&self) -> Option<f64> {
        self.margin_balance.map(parse_satoshis_to_xbt)
    }

    /// Available margin converted from satoshis to XBT.
    #[must_use]
    pub fn available_margin_xbt(&self) -> Option<f64> {
        self.available_margin.map(parse_satoshis_to_xbt)
    }
}

/// Wallet transaction returned by `user/requestWithdrawal`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexTransaction {
    #[serde(rename = "transactID")]
    pub transact_id: Uuid,
    pub account: Option<i64>,
    pub currency: Option<Ustr>,
    pub transact_type: Option<Ustr>,
    pub amount: Option<i64>,
    pub fee: Option<i64>,
    pub transact_status: Option<Ustr>,
    pub address: Option<Ustr>,
    pub timestamp: Option<DateTime<Utc>>,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
