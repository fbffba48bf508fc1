use crate::error::PublisherError;
use crate::types::Advertisement;

pub mod mdns;
pub use mdns::MdnsPublisher;

/// Announces and withdraws multicast name records.
///
/// Implementations own the protocol engine; once [`Publisher::close`] has
/// been called every further announce or withdraw fails with
/// [`PublisherError::Closed`].
pub trait Publisher: Send + Sync {
    fn announce(&self, ad: &Advertisement) -> Result<(), PublisherError>;

    fn withdraw(&self, ad: &Advertisement) -> Result<(), PublisherError>;

    /// Releases the protocol engine.  Closing twice is a no-op.
    fn close(&self) -> Result<(), PublisherError>;

    fn is_closed(&self) -> bool;
}
