//! CLI commands

pub mod handle;
pub mod id;
pub mod resolve;
pub mod values;

use chartstage_core::ProviderSettings;
use std::path::Path;

use crate::error::Result;

/// Settings from `--config`, or the default location
pub fn load_settings(path: Option<&Path>) -> Result<ProviderSettings> {
    let settings = match path {
        Some(path) => ProviderSettings::load_from(path)?,
        None => ProviderSettings::load()?,
    };
    Ok(settings)
}
