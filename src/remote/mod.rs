// ABOUTME: Release asset resolution for large tables
// ABOUTME: URL addressing plus the checksum-verifying fetcher

pub mod client;
pub mod models;

pub use client::{AssetFetcher, FetchMode};
pub use models::asset_url;
