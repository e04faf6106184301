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

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Represents the side of an order or trade (Buy/Sell).
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexSide {
    /// Buy side of a trade or order.
    Buy,
    /// Sell side of a trade or order.
    Sell,
}

impl BitmexSide {
    /// Returns the side implied by the sign of a BitMEX order quantity.
    ///
    /// BitMEX accepts a signed `orderQty` where negative means sell.
    #[must_use]
    pub const fn from_signed_qty(qty: i64) -> Self {
        if qty > 0 { Self::Buy } else { Self::Sell }
    }

    /// Applies the side to an unsigned quantity, negating it for sells.
    #[must_use]
    pub const fn signed_qty(self, qty: i64) -> i64 {
        match self {
            Self::Buy => qty.abs(),
            Self::Sell => -qty.abs(),
        }
    }
}

/// Represents the available order types on BitMEX.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexOrderType {
    /// Market order, executed immediately at current market price.
    Market,
    /// Limit order, executed only at specified price or better.
    Limit,
    /// Stop Market order, triggers a market order when price reaches stop price.
    Stop,
    /// Stop Limit order, triggers a limit order when price reaches stop price.
    StopLimit,
    /// Market if touched order, triggers a market order when price reaches touch price.
    MarketIfTouched,
    /// Limit if touched order, triggers a limit order when price reaches touch price.
    LimitIfTouched,
    /// Pegged order, price automatically tracks market.
    Pegged,
}

impl BitmexOrderType {
    /// Returns whether orders of this type must carry a limit price.
    #[must_use]
    pub const fn requires_price(self) -> bool {
        !matches!(self, Self::Market | Self::Stop | Self::MarketIfTouched)
    }

    /// Returns whether orders of this type carry a trigger price (`stopPx`).
    #[must_use]
    pub const fn requires_stop_px(self) -> bool {
        matches!(
            self,
            Self::Stop | Self::StopLimit | Self::MarketIfTouched | Self::LimitIfTouched
        )
    }
}

/// Represents the possible states of an order as reported by BitMEX.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexOrderStatus {
    /// Order has been placed but not yet processed.
    New,
    /// Order has been partially filled.
    PartiallyFilled,
    /// Order has been completely filled.
    Filled,
    /// Order has been canceled by user or system.
    Canceled,
    /// Order was rejected by the system.
    Rejected,
    /// Order has expired according to its time in force.
    Expired,
    /// Any status this connector does not recognise.
    #[serde(other)]
    Unknown,
}

/// Locally interpreted order status.
///
/// BitMEX reports both a textual `ordStatus` and a `workingIndicator`; the two can
/// disagree transiently, so the local status is only definite when both agree.
#[derive(
    Copy, Clone, Debug, Display, PartialEq, Eq, AsRefStr, EnumIter, EnumString, Serialize,
)]
pub enum LocalOrderStatus {
    #[strum(serialize = "ACTIVE")]
    Active,
    #[strum(serialize = "FILLED")]
    Filled,
    #[strum(serialize = "CXLED")]
    Cancelled,
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
