//! Resolve command - show how a chart reference will be installed

use chartstage_core::ChartResolver;
use std::path::Path;

use crate::error::Result;

/// Run the resolve command
pub fn run(
    config: Option<&Path>,
    chart: &str,
    version: Option<&str>,
    repository: Option<&str>,
) -> Result<()> {
    let settings = super::load_settings(config)?;
    let descriptor = ChartResolver::from_settings(&settings).resolve(Some(chart), version, repository)?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}
