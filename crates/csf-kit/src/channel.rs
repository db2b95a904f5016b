//! Authenticated transport between the host and one isolated frame.
//!
//! A channel mints a [`SessionToken`] when it opens and hands it to the frame in the
//! handshake. From then on a message is accepted only if it comes from the frame's origin,
//! echoes the live token, and is a type the current [`LoadState`] permits. Anything else is
//! a [`ProtocolAnomaly`] for the caller to log and drop.

use csf_core::{
    errors::{CommandError, Error as WireError, ProtocolAnomaly},
    types::{FieldName, SessionToken},
    wire::{Command, Envelope, FrameEvent, HandshakeCommand, MessageType},
};

use crate::concepts::FrameTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Handshake sent, waiting for the frame to echo the token.
    Pending,
    Loaded,
    Failed,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Pending => "pending",
            LoadState::Loaded => "loaded",
            LoadState::Failed => "failed",
        }
    }

    /// Inbound message types accepted in this state.
    pub fn permits(&self, kind: MessageType) -> bool {
        match self {
            LoadState::Pending => matches!(kind, MessageType::Handshake | MessageType::Error),
            LoadState::Loaded => kind.is_inbound() && kind != MessageType::Handshake,
            LoadState::Failed => false,
        }
    }
}

pub struct FrameChannel<T: FrameTransport> {
    field: FieldName,
    origin: String,
    /// `None` once revoked; nothing is accepted or sent after that.
    token: Option<SessionToken>,
    load_state: LoadState,
    transport: Option<T>,
}

impl<T: FrameTransport> FrameChannel<T> {
    /// Mint a session token and send the handshake to a freshly mounted frame.
    pub fn open(
        field: FieldName,
        origin: String,
        transport: T,
        handshake: HandshakeCommand,
    ) -> Result<Self, CommandError> {
        let mut channel = FrameChannel {
            field,
            origin,
            token: Some(SessionToken::generate()),
            load_state: LoadState::Pending,
            transport: Some(transport),
        };

        if let Err(err) = channel.post(Command::Handshake(handshake)) {
            channel.close();
            return Err(err);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(field = %channel.field, origin = %channel.origin, "Frame handshake sent");

        Ok(channel)
    }

    pub fn field(&self) -> &FieldName {
        &self.field
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Whether the session token is still live.
    pub fn is_live(&self) -> bool {
        self.token.is_some()
    }

    /// Authenticate and decode an inbound envelope.
    ///
    /// Returns `Ok(None)` for message types this version does not know. A `handshake` moves
    /// the channel from pending to loaded.
    pub fn authenticate(
        &mut self,
        origin: &str,
        envelope: &Envelope,
    ) -> Result<Option<FrameEvent>, ProtocolAnomaly> {
        let Some(token) = self.token.as_ref() else {
            return Err(ProtocolAnomaly::TokenRevoked {
                field: self.field.clone(),
            });
        };

        if origin != self.origin {
            return Err(ProtocolAnomaly::OriginMismatch {
                expected: self.origin.clone(),
                actual: origin.to_string(),
            });
        }

        if envelope.field_name != self.field {
            return Err(ProtocolAnomaly::UnknownField {
                field: envelope.field_name.to_string(),
            });
        }

        if !token.matches(&envelope.session_token) {
            return Err(ProtocolAnomaly::TokenMismatch {
                field: self.field.clone(),
            });
        }

        let Some(event) = FrameEvent::decode(envelope).map_err(|err| self.decode_anomaly(err))?
        else {
            return Ok(None);
        };

        let kind = event.kind();
        if !self.load_state.permits(kind) {
            return Err(ProtocolAnomaly::NotPermitted {
                field: self.field.clone(),
                kind,
                state: self.load_state.as_str(),
            });
        }

        if kind == MessageType::Handshake {
            self.load_state = LoadState::Loaded;
        }

        Ok(Some(event))
    }

    /// Send a configuration command to a loaded frame.
    pub fn send(&mut self, command: Command) -> Result<(), CommandError> {
        if self.load_state != LoadState::Loaded {
            return Err(CommandError::FieldNotReady {
                field: self.field.clone(),
                state: self.load_state.as_str(),
            });
        }
        self.post(command)
    }

    /// Give up on a frame that never completed its handshake.
    pub fn mark_failed(&mut self) {
        self.load_state = LoadState::Failed;
    }

    /// Revoke the session token. Any message still in flight is rejected from now on.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    /// Revoke the token, then remove the frame.
    pub fn close(&mut self) {
        self.invalidate();
        if let Some(mut transport) = self.transport.take() {
            transport.unmount();
        }
    }

    fn post(&mut self, command: Command) -> Result<(), CommandError> {
        let (Some(token), Some(transport)) = (self.token.as_ref(), self.transport.as_mut()) else {
            return Err(CommandError::Destroyed);
        };

        let envelope = command
            .into_envelope(&self.field, token)
            .map_err(|err| CommandError::Encode(err.to_string()))?;

        transport
            .post(&envelope)
            .map_err(|err| CommandError::Transport {
                field: self.field.clone(),
                reason: err.to_string(),
            })
    }

    fn decode_anomaly(&self, err: WireError) -> ProtocolAnomaly {
        match err {
            WireError::UnexpectedDirection(kind) => ProtocolAnomaly::UnexpectedDirection { kind },
            WireError::RawDataExposed(field) => ProtocolAnomaly::RawDataRejected { field },
            WireError::SerdeJsonError(err) => ProtocolAnomaly::Malformed {
                reason: format!("{}: {err}", self.field),
            },
        }
    }
}

impl<T: FrameTransport> Drop for FrameChannel<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, convert::Infallible, rc::Rc};

    use csf_core::{
        types::ErrorCode,
        wire::{ConfigureCommand, EncryptionKey},
    };
    use serde_json::json;

    use super::*;

    const ORIGIN: &str = "https://frames.example.com";

    #[derive(Default, Clone)]
    struct Recorder {
        posted: Rc<RefCell<Vec<Envelope>>>,
        unmounted: Rc<RefCell<bool>>,
    }

    impl FrameTransport for Recorder {
        type Error = Infallible;

        fn post(&mut self, envelope: &Envelope) -> Result<(), Self::Error> {
            self.posted.borrow_mut().push(envelope.clone());
            Ok(())
        }

        fn unmount(&mut self) {
            *self.unmounted.borrow_mut() = true;
        }
    }

    fn open() -> (FrameChannel<Recorder>, Recorder, String) {
        let recorder = Recorder::default();
        let handshake = HandshakeCommand::builder()
            .setup_type("card")
            .encryption_key(EncryptionKey {
                key_id: "k".to_string(),
                public_key: "pk".to_string(),
            })
            .build();

        let channel = FrameChannel::open(
            FieldName::CardNumber,
            ORIGIN.to_string(),
            recorder.clone(),
            handshake,
        )
        .unwrap();

        let token = recorder.posted.borrow()[0].session_token.clone();
        (channel, recorder, token)
    }

    fn message(kind: &str, token: &str, payload: serde_json::Value) -> Envelope {
        Envelope::from_value(json!({
            "type": kind,
            "fieldName": "encryptedCardNumber",
            "sessionToken": token,
            "payload": payload
        }))
        .unwrap()
    }

    #[test]
    fn test_handshake_sent_on_open() {
        let (channel, recorder, token) = open();

        let posted = recorder.posted.borrow();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].kind, MessageType::Handshake);
        assert_eq!(posted[0].payload["setupType"], "card");
        assert_eq!(token.len(), 43);
        assert_eq!(channel.load_state(), LoadState::Pending);
    }

    #[test]
    fn test_handshake_completes_load() {
        let (mut channel, _, token) = open();

        let event = channel
            .authenticate(ORIGIN, &message("handshake", &token, json!({})))
            .unwrap();

        assert_eq!(event, Some(FrameEvent::Handshake));
        assert_eq!(channel.load_state(), LoadState::Loaded);
    }

    #[test]
    fn test_validation_before_handshake_not_permitted() {
        let (mut channel, _, token) = open();

        let err = channel
            .authenticate(
                ORIGIN,
                &message("invalid", &token, json!({ "errorCode": "incomplete" })),
            )
            .unwrap_err();

        assert_eq!(
            err,
            ProtocolAnomaly::NotPermitted {
                field: FieldName::CardNumber,
                kind: MessageType::Invalid,
                state: "pending",
            }
        );
        assert_eq!(channel.load_state(), LoadState::Pending);
    }

    #[test]
    fn test_error_permitted_while_pending() {
        let (mut channel, _, token) = open();

        let event = channel
            .authenticate(ORIGIN, &message("error", &token, json!({ "errorCode": "frameError" })))
            .unwrap();

        assert_eq!(
            event,
            Some(FrameEvent::Error {
                error_code: ErrorCode::FRAME_ERROR
            })
        );
    }

    #[test]
    fn test_rejects_wrong_origin_and_token() {
        let (mut channel, _, token) = open();

        assert!(matches!(
            channel.authenticate("https://evil.example.com", &message("handshake", &token, json!({}))),
            Err(ProtocolAnomaly::OriginMismatch { .. })
        ));
        assert!(matches!(
            channel.authenticate(ORIGIN, &message("handshake", "forged", json!({}))),
            Err(ProtocolAnomaly::TokenMismatch { .. })
        ));
        assert_eq!(channel.load_state(), LoadState::Pending);
    }

    #[test]
    fn test_unknown_type_ignored() {
        let (mut channel, _, token) = open();
        channel
            .authenticate(ORIGIN, &message("handshake", &token, json!({})))
            .unwrap();

        assert_eq!(
            channel
                .authenticate(ORIGIN, &message("bin-lookup", &token, json!({ "bin": "x" })))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_second_handshake_not_permitted() {
        let (mut channel, _, token) = open();
        channel
            .authenticate(ORIGIN, &message("handshake", &token, json!({})))
            .unwrap();

        assert!(matches!(
            channel.authenticate(ORIGIN, &message("handshake", &token, json!({}))),
            Err(ProtocolAnomaly::NotPermitted { .. })
        ));
    }

    #[test]
    fn test_send_requires_loaded() {
        let (mut channel, recorder, token) = open();

        assert!(matches!(
            channel.send(Command::Focus),
            Err(CommandError::FieldNotReady { state: "pending", .. })
        ));

        channel
            .authenticate(ORIGIN, &message("handshake", &token, json!({})))
            .unwrap();
        channel
            .send(Command::Configure(ConfigureCommand::builder().disabled(true).build()))
            .unwrap();

        let posted = recorder.posted.borrow();
        assert_eq!(posted.last().unwrap().kind, MessageType::Configure);
        assert_eq!(posted.last().unwrap().session_token, token);
    }

    #[test]
    fn test_invalidate_rejects_in_flight() {
        let (mut channel, recorder, token) = open();
        channel
            .authenticate(ORIGIN, &message("handshake", &token, json!({})))
            .unwrap();

        channel.close();

        assert_eq!(
            channel.authenticate(ORIGIN, &message("focus", &token, json!({}))),
            Err(ProtocolAnomaly::TokenRevoked {
                field: FieldName::CardNumber
            })
        );
        assert_eq!(channel.send(Command::Focus), Err(CommandError::Destroyed));
        assert!(*recorder.unmounted.borrow());
    }
}
