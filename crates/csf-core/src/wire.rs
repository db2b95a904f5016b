//! Cross-frame wire contract.
//!
//! Every message between the host and a frame is an [`Envelope`]:
//!
//! ```json
//! { "type": "valid", "fieldName": "encryptedCardNumber", "sessionToken": "...", "payload": {} }
//! ```
//!
//! Frames may only send validation and metadata events ([`FrameEvent`]); the host may only
//! send configuration commands ([`Command`]). Neither direction ever carries a raw card
//! number or security code.

use std::fmt::Display;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    types::{AnyJson, BrandHint, ErrorCode, FieldName, MaskedPreview, SessionToken},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Handshake,
    Configure,
    Valid,
    Invalid,
    BrandDetected,
    Focus,
    Blur,
    DataReady,
    Error,
    /// Any type this version does not know about. Ignored, never fatal.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Handshake => "handshake",
            MessageType::Configure => "configure",
            MessageType::Valid => "valid",
            MessageType::Invalid => "invalid",
            MessageType::BrandDetected => "brand-detected",
            MessageType::Focus => "focus",
            MessageType::Blur => "blur",
            MessageType::DataReady => "data-ready",
            MessageType::Error => "error",
            MessageType::Unknown => "unknown",
        }
    }

    /// Types a frame may send to the host.
    pub fn is_inbound(&self) -> bool {
        !matches!(self, MessageType::Configure | MessageType::Unknown)
    }

    /// Types the host may send to a frame.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            MessageType::Handshake | MessageType::Configure | MessageType::Focus | MessageType::Blur
        )
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub field_name: FieldName,
    /// Echoed session token. Untrusted until checked against the live session.
    pub session_token: String,
    #[serde(default)]
    pub payload: AnyJson,
}

impl Envelope {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: AnyJson) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encrypted representation of a field value, produced inside the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedValue(pub String);

impl Display for EncryptedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public key a frame encrypts its field value with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKey {
    pub key_id: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidPayload {
    encrypted_value: EncryptedValue,
    #[serde(default)]
    masked_preview: Option<String>,
    #[serde(default)]
    length: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodePayload {
    error_code: ErrorCode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataReadyPayload {
    length: usize,
    #[serde(default)]
    masked_preview: Option<String>,
}

/// Value metadata a frame may share: never the value itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueMetadata {
    pub length: Option<usize>,
    pub masked_preview: Option<MaskedPreview>,
}

/// A decoded frame-to-host event.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// The frame echoes its session token back, completing the handshake.
    Handshake,
    Valid {
        encrypted_value: EncryptedValue,
        metadata: ValueMetadata,
    },
    Invalid {
        error_code: ErrorCode,
    },
    BrandDetected(BrandHint),
    Focus,
    Blur,
    DataReady(ValueMetadata),
    Error {
        error_code: ErrorCode,
    },
}

impl FrameEvent {
    /// Decode the payload of an inbound envelope.
    ///
    /// Returns `Ok(None)` for unknown message types so newer frames stay compatible.
    pub fn decode(envelope: &Envelope) -> Result<Option<Self>> {
        let field = &envelope.field_name;
        let payload = || envelope.payload.clone();

        let event = match envelope.kind {
            MessageType::Unknown => return Ok(None),
            MessageType::Configure => return Err(Error::UnexpectedDirection(envelope.kind)),
            MessageType::Handshake => FrameEvent::Handshake,
            MessageType::Focus => FrameEvent::Focus,
            MessageType::Blur => FrameEvent::Blur,
            MessageType::Valid => {
                let p: ValidPayload = serde_json::from_value(payload())?;
                FrameEvent::Valid {
                    encrypted_value: p.encrypted_value,
                    metadata: ValueMetadata {
                        length: p.length,
                        masked_preview: mask(field, p.masked_preview)?,
                    },
                }
            }
            MessageType::Invalid => {
                let p: CodePayload = serde_json::from_value(payload())?;
                FrameEvent::Invalid {
                    error_code: p.error_code,
                }
            }
            MessageType::Error => {
                let p: CodePayload = serde_json::from_value(payload())?;
                FrameEvent::Error {
                    error_code: p.error_code,
                }
            }
            MessageType::BrandDetected => FrameEvent::BrandDetected(serde_json::from_value(payload())?),
            MessageType::DataReady => {
                let p: DataReadyPayload = serde_json::from_value(payload())?;
                FrameEvent::DataReady(ValueMetadata {
                    length: Some(p.length),
                    masked_preview: mask(field, p.masked_preview)?,
                })
            }
        };

        Ok(Some(event))
    }

    pub fn kind(&self) -> MessageType {
        match self {
            FrameEvent::Handshake => MessageType::Handshake,
            FrameEvent::Valid { .. } => MessageType::Valid,
            FrameEvent::Invalid { .. } => MessageType::Invalid,
            FrameEvent::BrandDetected(_) => MessageType::BrandDetected,
            FrameEvent::Focus => MessageType::Focus,
            FrameEvent::Blur => MessageType::Blur,
            FrameEvent::DataReady(_) => MessageType::DataReady,
            FrameEvent::Error { .. } => MessageType::Error,
        }
    }
}

fn mask(field: &FieldName, preview: Option<String>) -> Result<Option<MaskedPreview>> {
    preview
        .map(|p| MaskedPreview::checked(field, &p).ok_or_else(|| Error::RawDataExposed(field.clone())))
        .transpose()
}

/// Presentation settings a frame applies to its input.
#[derive(Builder, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureCommand {
    /// Style directives, keyed by state (`base`, `error`, `placeholder`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<AnyJson>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

/// First message to a freshly mounted frame.
///
/// The session token travels in the envelope; the transport must only deliver it to the
/// frame's own origin.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeCommand {
    #[builder(into)]
    pub setup_type: String,
    pub encryption_key: EncryptionKey,
    #[builder(default)]
    pub configure: ConfigureCommand,
}

/// A host-to-frame command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Handshake(HandshakeCommand),
    Configure(ConfigureCommand),
    Focus,
    Blur,
}

impl Command {
    pub fn kind(&self) -> MessageType {
        match self {
            Command::Handshake(_) => MessageType::Handshake,
            Command::Configure(_) => MessageType::Configure,
            Command::Focus => MessageType::Focus,
            Command::Blur => MessageType::Blur,
        }
    }

    /// Wrap the command in an envelope addressed to one frame session.
    pub fn into_envelope(self, field: &FieldName, token: &SessionToken) -> Result<Envelope> {
        let kind = self.kind();
        let payload = match self {
            Command::Handshake(h) => serde_json::to_value(h)?,
            Command::Configure(c) => serde_json::to_value(c)?,
            Command::Focus | Command::Blur => AnyJson::Object(Default::default()),
        };

        Ok(Envelope {
            kind,
            field_name: field.clone(),
            session_token: token.as_str().to_string(),
            payload,
        })
    }
}
