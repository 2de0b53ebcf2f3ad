//! Network layer.
//!
//! Everything that leaves the process goes through the [`Upstream`] trait:
//! tile fetches from the fetch policy, bulk downloads from the admin channel,
//! and package streams for the installer.

mod http;
#[cfg(test)]
pub(crate) mod mock;
mod upstream;

pub use http::{create_http_client, HttpUpstream, DEFAULT_USER_AGENT};
pub use upstream::{ByteStream, Upstream, UpstreamResponse};
