use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use bus::MessageHandler;
use common::{Observation, Result};

use crate::PaperTradingModule;

/// Feeds the paper backend's price table from observations on the bus.
///
/// Subscribed on every tracked channel next to the strategy handler, so the
/// paper module fills at the price the strategy just saw.
pub struct PriceTracker {
    module: Arc<PaperTradingModule>,
}

impl PriceTracker {
    pub fn new(module: Arc<PaperTradingModule>) -> Self {
        Self { module }
    }
}

#[async_trait]
impl MessageHandler for PriceTracker {
    fn name(&self) -> &str {
        "paper-price-tracker"
    }

    async fn handle(&self, channel: &str, message: Arc<Value>) -> Result<()> {
        let observation = Observation::new((*message).clone());
        let Some(token) = observation.base_token_address() else {
            debug!(channel, "Observation has no base token address, price not tracked");
            return Ok(());
        };
        let Some(price) = observation.price_native().transpose()? else {
            debug!(channel, token, "Observation has no priceNative, price not tracked");
            return Ok(());
        };

        self.module.update_price(token, price).await;
        trace!(channel, token, price = %price, "Paper price updated");
        Ok(())
    }
}
