use async_trait::async_trait;

/// Tells the consuming routing service to re-read the destination store
///
/// Called exactly once per run, after every source has been processed.
#[async_trait]
pub trait ServiceReloader: Send + Sync {
    /// Trigger the reload
    ///
    /// `Err` means the service did not confirm the reload. The routing data in
    /// the destination is already correct either way.
    async fn reload(&self) -> Result<(), crate::Error>;
}
