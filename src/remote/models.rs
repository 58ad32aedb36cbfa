// ABOUTME: Release asset addressing for large-table Parquet files
// ABOUTME: Maps repository, tag and file name to a deterministic download URL

use crate::config::{ReleaseSource, LATEST_TAG};

/// Download URL of `file_name` in the release selected by `source`
///
/// The [`LATEST_TAG`] sentinel resolves to the most recent release; any other
/// tag pins that release.
///
/// # Examples
///
/// ```
/// # use sqlite_dist::config::ReleaseSource;
/// # use sqlite_dist::remote::asset_url;
/// let mut source = ReleaseSource::default();
/// source.repo = "acme/dist".into();
/// assert_eq!(
///     asset_url(&source, "Words.parquet"),
///     "https://github.com/acme/dist/releases/latest/download/Words.parquet"
/// );
/// source.tag = "v1.0.0".into();
/// assert_eq!(
///     asset_url(&source, "Words.parquet"),
///     "https://github.com/acme/dist/releases/download/v1.0.0/Words.parquet"
/// );
/// ```
pub fn asset_url(source: &ReleaseSource, file_name: &str) -> String {
    let base = source.base_url.trim_end_matches('/');
    if source.tag == LATEST_TAG {
        format!(
            "{}/{}/releases/latest/download/{}",
            base, source.repo, file_name
        )
    } else {
        format!(
            "{}/{}/releases/download/{}/{}",
            base, source.repo, source.tag, file_name
        )
    }
}
