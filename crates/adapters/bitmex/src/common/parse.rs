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

//! Conversion helpers turning BitMEX payloads into connector-level values.

use serde::Serialize;

use crate::{
    common::{
        consts::SATOSHIS_PER_XBT,
        enums::{BitmexOrderStatus, LocalOrderStatus},
    },
    http::models::BitmexOrder,
};

/// Locally interpreted state of a single order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OrderStatusReport {
    pub status: LocalOrderStatus,
    /// Order price, only populated once the order is filled.
    pub traded_price: Option<f64>,
    /// Cumulative filled quantity, only populated once the order is filled.
    pub traded_qty: Option<i64>,
    /// Remaining quantity, only populated once the order is filled.
    pub remain_qty: Option<i64>,
}

impl OrderStatusReport {
    const fn with_status(status: LocalOrderStatus) -> Self {
        Self {
            status,
            traded_price: None,
            traded_qty: None,
            remain_qty: None,
        }
    }
}

/// Classifies a BitMEX order into a [`LocalOrderStatus`].
///
/// An order is only FILLED when BitMEX reports `Filled` and the order is no longer
/// working, and only ACTIVE when it reports `New` and is still working. A missing
/// `workingIndicator` counts as not working.
#[must_use]
pub fn read_order_status(order: &BitmexOrder) -> OrderStatusReport {
    let working = order.working_indicator.unwrap_or(false);

    match order.ord_status {
        Some(BitmexOrderStatus::Filled) if !working => OrderStatusReport {
            status: LocalOrderStatus::Filled,
            traded_price: order.price,
            traded_qty: order.cum_qty,
            remain_qty: order.leaves_qty,
        },
        Some(BitmexOrderStatus::Canceled) => {
            OrderStatusReport::with_status(LocalOrderStatus::Cancelled)
        }
        Some(BitmexOrderStatus::New) if working => {
            OrderStatusReport::with_status(LocalOrderStatus::Active)
        }
        _ => OrderStatusReport::with_status(LocalOrderStatus::Unknown),
    }
}

/// Converts a satoshi amount (BitMEX `XBt`) into XBT.
#[must_use]
pub fn parse_satoshis_to_xbt(value: i64) -> f64 {
    value as f64 / SATOSHIS_PER_XBT
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
