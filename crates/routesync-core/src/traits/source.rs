// # Domain Fetcher Trait
//
// Reads the enabled domains of one upstream source.
//
// ## Implementations
//
// - FusionPBX (PostgreSQL): `routesync-fusionpbx` crate

use async_trait::async_trait;

use crate::model::SourceRecord;

/// Trait for reading a source's enabled domains
///
/// Implementations connect to the source's own database using the parameters
/// in the [`SourceRecord`]. They must not write anywhere, and must not retry:
/// a failure is reported once and the engine records it.
#[async_trait]
pub trait DomainFetcher: Send + Sync {
    /// Fetch every enabled domain name of `source`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<String>)`: Domain names (not necessarily normalized)
    /// - `Err(Error)`: Connection, authentication or query failure
    async fn enabled_domains(&self, source: &SourceRecord) -> Result<Vec<String>, crate::Error>;

    /// Name of the fetcher (for logging)
    fn fetcher_name(&self) -> &'static str;
}
