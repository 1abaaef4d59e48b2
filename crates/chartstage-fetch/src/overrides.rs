//! Override values: inline assignments plus an optional fetched document

use chartstage_core::{Result, Values, parse_assignments};
use std::path::Path;

use crate::fetcher::SourceFetcher;

/// Build the override values for one poll.
///
/// Inline assignments are applied first. When `document_url` is set the
/// document is fetched to `scratch`, parsed, and merged on top so that its
/// leaves win. Any failure aborts with no partial result.
pub async fn build_override_values(
    fetcher: &SourceFetcher,
    inline: &[String],
    document_url: Option<&str>,
    scratch: &Path,
) -> Result<Values> {
    let values = parse_assignments(inline)?;

    let Some(url) = document_url.filter(|u| !u.trim().is_empty()) else {
        return Ok(values);
    };

    fetcher.fetch(url, scratch).await?;
    let document = Values::from_file(scratch)?;
    tracing::debug!(keys = document.inner().len(), "merging override document");
    Ok(values.merged(&document))
}
