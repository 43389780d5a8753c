//! Pulling the routing error out of a response.

use crate::region::RegionError;

/// Returns the routing error embedded in a response, if any.
///
/// One implementation per response message type. Any
/// `Fn(&Resp) -> Option<RegionError>` qualifies.
pub trait ErrorExtractor<Resp: ?Sized> {
    /// `None` means the request succeeded.
    fn extract(&self, response: &Resp) -> Option<RegionError>;
}

impl<Resp: ?Sized, F> ErrorExtractor<Resp> for F
where
    F: Fn(&Resp) -> Option<RegionError>,
{
    fn extract(&self, response: &Resp) -> Option<RegionError> {
        self(response)
    }
}
