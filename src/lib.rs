#![cfg_attr(docsrs, feature(doc_auto_cfg))]
//! Scheduled remote-data refresh cache.
//!
//! A [`cache::RefreshingSnapshotCache`] owns one current [`cache::Snapshot`],
//! refreshes it asynchronously from a remote source, serves the last good
//! value immediately while a refresh is pending, and computes the next
//! scheduled refresh instant from its [`cache::RefreshPolicy`]. Fetch
//! failures degrade the snapshot to stale instead of surfacing as errors.

/// Snapshot cache instance and utility types
pub mod cache;
/// Fetchers that load remote data for the cache.
/// Public traits are included to allow easy use of custom implementations.
pub mod fetchers;
