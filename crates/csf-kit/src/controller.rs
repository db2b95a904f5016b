//! Per-field lifecycle.
//!
//! ```text
//! uninitialized -> loading -> ready -> (valid | invalid) -> destroyed
//!                     \-> failed
//! ```
//!
//! `valid` and `invalid` are sub-states of ready. A controller only changes its
//! [`FieldState`] in response to messages its [`FrameChannel`] has authenticated.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use csf_core::{
    errors::{
        CommandError, FieldValidationError, FrameLoadFailure, FrameLoadReason, ProtocolAnomaly,
    },
    types::{Brand, BrandHint, ErrorCode, FieldName},
    wire::{Command, ConfigureCommand, EncryptedValue, Envelope, FrameEvent, HandshakeCommand, ValueMetadata},
};

use crate::{
    channel::FrameChannel,
    concepts::FrameTransport,
    config::FrameLoadPolicy,
    registry::FieldDescriptor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Loading,
    /// Handshake complete, no validation reported yet.
    Ready,
    Valid,
    Invalid,
    /// The frame never completed its handshake.
    Failed,
    Destroyed,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Uninitialized => "uninitialized",
            ControllerState::Loading => "loading",
            ControllerState::Ready => "ready",
            ControllerState::Valid => "valid",
            ControllerState::Invalid => "invalid",
            ControllerState::Failed => "failed",
            ControllerState::Destroyed => "destroyed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            ControllerState::Ready | ControllerState::Valid | ControllerState::Invalid
        )
    }
}

/// Derived state of one field, as seen by the host.
///
/// Only the owning controller mutates it; host code gets read access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldState {
    valid: bool,
    empty: bool,
    focused: bool,
    touched: bool,
    blurred: bool,
    degraded: bool,
    error_code: Option<ErrorCode>,
    brand_hint: Option<BrandHint>,
    metadata: ValueMetadata,
    /// Receive sequence of the message that set the current error.
    error_seq: Option<u64>,
}

impl FieldState {
    fn new() -> Self {
        FieldState {
            empty: true,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn has_focus(&self) -> bool {
        self.focused
    }

    /// The field has received focus at least once.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Focus left the field after it was touched.
    pub fn is_blurred(&self) -> bool {
        self.blurred
    }

    /// The frame failed to load; the element should show a fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn error_code(&self) -> Option<&ErrorCode> {
        self.error_code.as_ref()
    }

    /// Brand hint; only ever set on the card number field.
    pub fn brand_hint(&self) -> Option<&Brand> {
        self.brand_hint.as_ref().and_then(|h| h.brand.as_ref())
    }

    pub fn brand_info(&self) -> Option<&BrandHint> {
        self.brand_hint.as_ref()
    }

    pub fn metadata(&self) -> &ValueMetadata {
        &self.metadata
    }

    pub fn validation_error(&self, field: &FieldName) -> Option<FieldValidationError> {
        self.error_code.as_ref().map(|code| FieldValidationError {
            field: field.clone(),
            code: code.clone(),
        })
    }

    pub(crate) fn error_seq(&self) -> Option<u64> {
        self.error_seq
    }

    fn set_valid(&mut self) {
        self.valid = true;
        self.empty = false;
        self.error_code = None;
        self.error_seq = None;
    }

    fn set_invalid(&mut self, code: ErrorCode, seq: u64) {
        self.valid = false;
        self.empty = code == ErrorCode::EMPTY;
        if self.error_code.as_ref() != Some(&code) {
            self.error_seq = Some(seq);
        }
        self.error_code = Some(code);
    }
}

/// What a handled message changed, for the handle to publish.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldChange {
    pub became_ready: bool,
    /// Validity or error code changed.
    pub validation: bool,
    pub focus: Option<bool>,
    pub brand: bool,
    pub load_failure: Option<FrameLoadFailure>,
}

pub struct FieldController<T: FrameTransport> {
    descriptor: Arc<FieldDescriptor>,
    state: ControllerState,
    channel: Option<FrameChannel<T>>,
    field: FieldState,
    encrypted: Option<EncryptedValue>,
    mounted_at: Option<Instant>,
}

impl<T: FrameTransport> FieldController<T> {
    pub fn new(descriptor: Arc<FieldDescriptor>) -> Self {
        FieldController {
            descriptor,
            state: ControllerState::Uninitialized,
            channel: None,
            field: FieldState::new(),
            encrypted: None,
            mounted_at: None,
        }
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &FieldName {
        &self.descriptor.name
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn field_state(&self) -> &FieldState {
        &self.field
    }

    /// Encrypted value handed over by the frame with its latest `valid` report.
    pub fn encrypted_value(&self) -> Option<&EncryptedValue> {
        self.encrypted.as_ref()
    }

    /// Open the channel to a freshly mounted frame.
    pub fn mount(
        &mut self,
        transport: T,
        handshake: HandshakeCommand,
        now: Instant,
    ) -> Result<(), CommandError> {
        if self.state != ControllerState::Uninitialized {
            return Err(CommandError::FieldNotReady {
                field: self.name().clone(),
                state: self.state.as_str(),
            });
        }

        let channel = FrameChannel::open(
            self.name().clone(),
            self.descriptor.origin(),
            transport,
            handshake,
        )?;

        self.channel = Some(channel);
        self.mounted_at = Some(now);
        self.state = ControllerState::Loading;
        Ok(())
    }

    /// Apply an inbound envelope. `seq` orders messages across all fields.
    ///
    /// Returns `Ok(None)` for message types this version does not know.
    pub fn handle(
        &mut self,
        origin: &str,
        envelope: &Envelope,
        seq: u64,
    ) -> Result<Option<FieldChange>, ProtocolAnomaly> {
        let channel = match (self.state, self.channel.as_mut()) {
            (ControllerState::Destroyed, _) | (_, None) => {
                return Err(ProtocolAnomaly::TokenRevoked {
                    field: self.descriptor.name.clone(),
                });
            }
            (_, Some(channel)) => channel,
        };

        let Some(event) = channel.authenticate(origin, envelope)? else {
            return Ok(None);
        };

        if matches!(event, FrameEvent::BrandDetected(_)) && !self.descriptor.name.is_card_number() {
            return Err(ProtocolAnomaly::BrandFromNonCardNumber {
                field: self.descriptor.name.clone(),
            });
        }

        Ok(Some(self.apply(event, seq)))
    }

    fn apply(&mut self, event: FrameEvent, seq: u64) -> FieldChange {
        let mut change = FieldChange::default();
        let before = (self.field.valid, self.field.error_code.clone());

        match event {
            FrameEvent::Handshake => {
                self.state = ControllerState::Ready;
                change.became_ready = true;

                #[cfg(feature = "tracing")]
                tracing::debug!(field = %self.descriptor.name, "Frame ready");
            }
            FrameEvent::Valid {
                encrypted_value,
                metadata,
            } => {
                self.field.set_valid();
                self.merge_metadata(metadata);
                self.encrypted = Some(encrypted_value);
                self.state = ControllerState::Valid;
            }
            FrameEvent::Invalid { error_code } => {
                self.invalidate_value(error_code, seq);
            }
            FrameEvent::Error { error_code } if self.state == ControllerState::Loading => {
                change.load_failure = Some(self.fail(FrameLoadReason::FrameReported { code: error_code }));
            }
            FrameEvent::Error { error_code } => {
                self.invalidate_value(error_code, seq);
            }
            FrameEvent::BrandDetected(hint) => {
                let previous = self.field.brand_hint.clone();
                if !hint.supported {
                    self.invalidate_value(ErrorCode::UNSUPPORTED_CARD, seq);
                } else if self.field.error_code.as_ref() == Some(&ErrorCode::UNSUPPORTED_CARD) {
                    self.field.error_code = None;
                    self.field.error_seq = None;
                }
                self.field.brand_hint = hint.brand.is_some().then_some(hint);
                change.brand = previous != self.field.brand_hint;
            }
            FrameEvent::Focus => {
                self.field.touched = true;
                if !self.field.focused {
                    self.field.focused = true;
                    change.focus = Some(true);
                }
            }
            FrameEvent::Blur => {
                if self.field.focused {
                    self.field.focused = false;
                    self.field.blurred = self.field.touched;
                    change.focus = Some(false);
                }
            }
            FrameEvent::DataReady(metadata) => {
                self.merge_metadata(metadata);
            }
        }

        change.validation = before != (self.field.valid, self.field.error_code.clone());
        change
    }

    fn invalidate_value(&mut self, code: ErrorCode, seq: u64) {
        self.field.set_invalid(code, seq);
        self.encrypted = None;
        self.state = ControllerState::Invalid;
    }

    fn merge_metadata(&mut self, metadata: ValueMetadata) {
        if let Some(length) = metadata.length {
            self.field.empty = length == 0;
            self.field.metadata.length = Some(length);
        }
        if metadata.masked_preview.is_some() {
            self.field.metadata.masked_preview = metadata.masked_preview;
        }
    }

    fn fail(&mut self, reason: FrameLoadReason) -> FrameLoadFailure {
        if let Some(channel) = self.channel.as_mut() {
            channel.mark_failed();
        }
        self.state = ControllerState::Failed;
        self.field.degraded = true;

        let failure = FrameLoadFailure {
            field: self.descriptor.name.clone(),
            reason,
        };

        #[cfg(feature = "tracing")]
        tracing::warn!("{failure}");

        failure
    }

    /// Declare the frame failed if it is still loading after the policy timeout.
    pub fn poll_timeout(&mut self, now: Instant, policy: &FrameLoadPolicy) -> Option<FrameLoadFailure> {
        if self.state != ControllerState::Loading {
            return None;
        }

        let elapsed = self
            .mounted_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::ZERO);

        (elapsed >= policy.timeout).then(|| {
            self.fail(FrameLoadReason::Timeout {
                after: policy.timeout,
            })
        })
    }

    /// Ask the frame to take focus. Completion is reported by a later `focus` message.
    pub fn set_focus(&mut self) -> Result<(), CommandError> {
        self.send(Command::Focus)
    }

    pub fn configure(&mut self, command: ConfigureCommand) -> Result<(), CommandError> {
        self.send(Command::Configure(command))
    }

    fn send(&mut self, command: Command) -> Result<(), CommandError> {
        if !self.state.is_ready() {
            return Err(match self.state {
                ControllerState::Destroyed => CommandError::Destroyed,
                state => CommandError::FieldNotReady {
                    field: self.descriptor.name.clone(),
                    state: state.as_str(),
                },
            });
        }

        match self.channel.as_mut() {
            Some(channel) => channel.send(command),
            None => Err(CommandError::Destroyed),
        }
    }

    /// Revoke the session token without removing the frame yet.
    pub fn invalidate(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.invalidate();
        }
    }

    /// Revoke the token, remove the frame and refuse everything from now on.
    pub fn destroy(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.encrypted = None;
        self.state = ControllerState::Destroyed;
    }
}
