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

use liquidbot_bitmex::http::{client::BitmexHttpClient, error::BitmexHttpError};
use tracing::level_filters::LevelFilter;

const SYMBOL: &str = "XBTUSD";

async fn run(client: &BitmexHttpClient) -> Result<(), BitmexHttpError> {
    let ticker = client.ticker(Some(SYMBOL)).await?;
    tracing::info!(?ticker, "Retrieved ticker");

    let today = client.today(SYMBOL).await?;
    tracing::info!(?today, "Retrieved daily stats");

    let book = client.order_book(SYMBOL, 10).await?;
    tracing::info!("Retrieved {} order book levels", book.len());

    let trades = client.recent_trades(SYMBOL).await?;
    if let Some(trade) = trades.first() {
        tracing::info!(?trade, "Most recent trade");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    let client = BitmexHttpClient::from_env()?;

    if let Err(e) = run(&client).await {
        if e.is_fatal() {
            tracing::error!("Fatal error, exiting: {e}");
            std::process::exit(1);
        }
        return Err(e.into());
    }

    Ok(())
}
