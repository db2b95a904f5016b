//! Seams between the secured fields subsystem and its environment.

use csf_core::{
    types::{ClientKey, FieldName},
    wire::Envelope,
};
use url::Url;

use crate::keys::EncryptionKeys;

/// Delivery of envelopes to one isolated frame.
///
/// Implementations must address every envelope to the frame's own origin only, so that the
/// session token in the handshake cannot be read by anything else on the page.
pub trait FrameTransport {
    type Error: std::error::Error;

    fn post(&mut self, envelope: &Envelope) -> Result<(), Self::Error>;

    /// Remove the frame. Called once, after its session token has been revoked.
    fn unmount(&mut self);
}

/// What the host needs to create a frame for one field.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    /// Root container the frame goes in.
    pub root: &'a str,
    pub field: &'a FieldName,
    /// Frame source; its origin is the only origin messages are accepted from.
    pub src: &'a Url,
}

/// The document hosting the secured fields.
pub trait FrameHost {
    type Transport: FrameTransport;
    type Error: std::error::Error;

    /// Whether the root container selector resolves to an element.
    fn resolve_root(&self, selector: &str) -> bool;

    /// Field slots present in the root container, e.g. elements marked for
    /// `encryptedCardNumber` and `encryptedSecurityCode`.
    fn field_slots(&self, selector: &str) -> Vec<FieldName>;

    fn mount(&mut self, request: MountRequest<'_>) -> Result<Self::Transport, Self::Error>;
}

/// Validates a client key and supplies per-field encryption keys.
pub trait KeyProvider {
    type Error: std::error::Error;

    fn fetch_keys(
        &self,
        client_key: &ClientKey,
        fields: &[FieldName],
    ) -> impl Future<Output = Result<EncryptionKeys, Self::Error>>;
}
