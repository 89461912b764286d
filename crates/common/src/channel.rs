//! Channel naming shared by observation publishers and strategy subscribers.
//!
//! One logical stream per instrument, keyed by its liquidity pair address:
//! `token_data:<pairAddress>`. Changing this breaks every running publisher.

pub const CHANNEL_PREFIX: &str = "token_data:";

/// Channel carrying observations for the given pair address.
pub fn token_channel(pair_address: &str) -> String {
    format!("{CHANNEL_PREFIX}{pair_address}")
}

/// Extract the pair address from a `token_data:` channel name.
pub fn pair_from_channel(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(CHANNEL_PREFIX)
        .filter(|pair| !pair.is_empty())
}
