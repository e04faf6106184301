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

use liquidbot_bitmex::{
    common::enums::BitmexOrderType,
    http::{client::BitmexHttpClient, error::BitmexHttpError, query::PostOrderParamsBuilder},
};
use tracing::level_filters::LevelFilter;

async fn run(client: &BitmexHttpClient) -> Result<(), BitmexHttpError> {
    let margin = client.balances().await?;
    tracing::info!(
        "Margin balance {:?} XBT, available {:?} XBT",
        margin.margin_balance_xbt(),
        margin.available_margin_xbt()
    );

    let ticker = client.ticker(None).await?;
    let Some(ask) = ticker.sell else {
        tracing::warn!("No ask price for {}", client.symbol());
        return Ok(());
    };

    // Far from the touch so the order rests
    let price = (ask * 1.1).round();
    let order = client
        .sell(
            client.symbol().as_str(),
            100,
            BitmexOrderType::Limit,
            Some(price),
            None,
        )
        .await?;
    tracing::info!(?order, "Placed order");

    let status = client.order_status(order.order_id).await?;
    tracing::info!(?status, "Order status");

    let params = PostOrderParamsBuilder::default()
        .order_qty(-100)
        .price(price + 50.0)
        .ord_type(BitmexOrderType::Limit)
        .exec_inst("ParticipateDoNotInitiate")
        .build()?;
    let bulk = client.create_bulk_orders(vec![params]).await?;
    tracing::info!("Created {} orders", bulk.len());

    let canceled = client.cancel_all_orders().await?;
    tracing::info!("Canceled {} orders", canceled.len());

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
