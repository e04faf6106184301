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

//! REST connector for the [BitMEX](https://www.bitmex.com/) derivatives exchange.
//!
//! The `liquidbot-bitmex` crate signs, dispatches and classifies requests against the
//! **BitMEX REST API v1**, retrying transient failures and recovering from rate limits
//! and duplicate client order IDs. On top of the dispatcher sits a façade covering
//! market data and the order lifecycle: place, amend, query and cancel.
//!
//! The official BitMEX API reference can be found at <https://www.bitmex.com/api/explorer/>.
//!
//! # Errors
//!
//! Library calls never terminate the process. Errors that require the caller to stop
//! trading are wrapped in [`http::error::BitmexHttpError::Fatal`]; check
//! [`http::error::BitmexHttpError::is_fatal`] and exit if it returns `true`.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod common;
pub mod config;
pub mod http;
