//! Values command - build the override values a poll would install with

use chartstage_fetch::{SourceFetcher, build_override_values};
use std::path::Path;

use crate::error::Result;

/// Run the values command
pub async fn run(config: Option<&Path>, set: &[String], url: Option<&str>, yaml: bool) -> Result<()> {
    let settings = super::load_settings(config)?;
    let fetcher = SourceFetcher::from_settings(&settings)
        .map_err(|e| e.into_core("Building HTTP clients"))?;

    let values = build_override_values(&fetcher, set, url, &settings.values_scratch_path).await?;

    if yaml {
        let out = serde_yaml::to_string(values.inner()).map_err(|e| {
            crate::error::CliError::Other {
                message: format!("cannot render values: {e}"),
            }
        })?;
        print!("{out}");
    } else {
        println!("{}", serde_json::to_string_pretty(values.inner())?);
    }
    Ok(())
}
