//! Common utilities for the o10n CSS optimizer.
//!
//! This crate provides shared infrastructure used by every pipeline stage:
//! - **Hashing** - content addressing for cache artifacts
//! - **Fetching** - blocking HTTP downloads of remote stylesheets
//! - **Notices** - deduplicated per-render operator warnings
//! - **URLs** - site-relative URL resolution, local path mapping and CDN rewriting

pub mod hash;
pub mod net;
pub mod notice;
pub mod url;

pub use hash::{content_hash, hash_parts};
pub use net::{Fetch, FetchError, FetchedResource, HttpFetcher};
pub use notice::{Notice, Notices};
pub use url::{CdnRewrite, Site};
