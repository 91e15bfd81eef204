//! CLI command implementations.

pub mod run;
pub mod show;
pub mod sync;

use anyhow::{Context, Result};
use crate::config::Config;
use crate::feed::LapiClient;
use crate::gateway::EdgeOsClient;

/// Build the EdgeOS client from the `device` section
pub(crate) fn device_client(config: &Config) -> Result<EdgeOsClient> {
    EdgeOsClient::new(
        &config.device.url,
        &config.device.user,
        config.device.password.clone(),
        config.device.accept_invalid_certs,
        config.device_timeout()?,
    )
    .context("Failed to create device client")
}

/// Build the decision feed client from the `feed` section
pub(crate) fn feed_client(config: &Config) -> Result<LapiClient> {
    LapiClient::new(
        &config.feed.url,
        config.feed.api_key.clone(),
        config.feed_timeout()?,
    )
    .context("Failed to create decision feed client")
}
