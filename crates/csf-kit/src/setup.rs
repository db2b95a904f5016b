//! Setup and the handle given to the element.
//!
//! [`initialize`] validates the setup, resolves the field descriptors, fetches encryption
//! keys and mounts one frame per field. The returned [`SecuredFieldsHandle`] is the only
//! object the element holds: it routes inbound frame messages, publishes state changes to
//! observers and assembles the submit payload.

use std::time::Instant;

use csf_core::{
    errors::{CommandError, ConfigurationError, FrameLoadFailure, PayloadError, ProtocolAnomaly},
    types::{AnyJson, ClientKey, FieldName, FieldPolicy},
    wire::{ConfigureCommand, Envelope, HandshakeCommand},
};

use crate::{
    aggregator::{self, CompositeState, FieldSnapshot, SubmitPayload},
    concepts::{FrameHost, KeyProvider, MountRequest},
    config::SetupConfig,
    controller::{FieldChange, FieldController, FieldState},
    events::{CsfEvent, Observer, Observers, SubscriptionId},
    keys::EncryptionKeys,
    registry::Registry,
};

/// Outcome of handing an inbound message to the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Authenticated and applied to its field.
    Applied,
    /// Authenticated, but of a type this version does not know.
    Ignored,
    /// Rejected. Already logged; callers normally need not act on it.
    Dropped(ProtocolAnomaly),
}

/// Validate `config`, mount a frame per field and return the handle.
///
/// Errors are logged and reported to `config.callbacks` before being returned; none of
/// them panics or leaves frames mounted.
pub async fn initialize<H, K>(
    config: Option<SetupConfig>,
    mut host: H,
    keys: &K,
) -> Result<SecuredFieldsHandle<H>, ConfigurationError>
where
    H: FrameHost,
    K: KeyProvider,
{
    let Some(mut config) = config else {
        let err = ConfigurationError::MissingSetup;
        report(&err);
        return Err(err);
    };

    let mut observers = Observers::default();
    observers.subscribe(Box::new(std::mem::take(&mut config.callbacks)));

    match build(&config, &mut host, keys).await {
        Ok((root, registry, controllers, keys)) => {
            let mut handle = SecuredFieldsHandle {
                host,
                root,
                registry,
                controllers,
                keys,
                config,
                observers,
                published: CompositeState::default(),
                seq: 0,
                destroyed: false,
            };
            handle.published = handle.composite_state();

            #[cfg(feature = "tracing")]
            tracing::debug!(
                setup = %handle.registry.kind(),
                fields = handle.controllers.len(),
                "Secured fields initialized"
            );

            Ok(handle)
        }
        Err(err) => {
            report(&err);
            observers.emit(CsfEvent::Error(err.clone()));
            Err(err)
        }
    }
}

type Built<T> = (String, Registry, Vec<FieldController<T>>, EncryptionKeys);

async fn build<H, K>(
    config: &SetupConfig,
    host: &mut H,
    keys: &K,
) -> Result<Built<H::Transport>, ConfigurationError>
where
    H: FrameHost,
    K: KeyProvider,
{
    let root = config
        .root
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or(ConfigurationError::RootNodeNotFound { selector: None })?;

    if !host.resolve_root(root) {
        return Err(ConfigurationError::RootNodeNotFound {
            selector: Some(root.to_string()),
        });
    }

    let client_key = config
        .client_key
        .as_deref()
        .and_then(ClientKey::new)
        .ok_or(ConfigurationError::MissingCredential)?;

    let registry = Registry::resolve(config, &client_key, &host.field_slots(root))?;

    let names = registry.names();
    let keys = keys
        .fetch_keys(&client_key, &names)
        .await
        .map_err(|err| ConfigurationError::CredentialEndpoint {
            reason: err.to_string(),
        })?;

    if let Some(field) = names.iter().find(|name| !keys.contains_key(*name)) {
        return Err(ConfigurationError::MissingEncryptionKey {
            field: field.clone(),
        });
    }

    let mut controllers: Vec<FieldController<H::Transport>> = Vec::with_capacity(names.len());
    for descriptor in registry.descriptors() {
        let mut controller = FieldController::new(descriptor.clone());
        let mounted = mount(&mut controller, config, &registry, &keys, host, root);
        if let Err(err) = mounted {
            for mut mounted in controllers {
                mounted.destroy();
            }
            return Err(err);
        }
        controllers.push(controller);
    }

    Ok((root.to_string(), registry, controllers, keys))
}

fn mount<H: FrameHost>(
    controller: &mut FieldController<H::Transport>,
    config: &SetupConfig,
    registry: &Registry,
    keys: &EncryptionKeys,
    host: &mut H,
    root: &str,
) -> Result<(), ConfigurationError> {
    let descriptor = controller.descriptor().clone();
    let field = &descriptor.name;

    let encryption_key = keys
        .get(field)
        .cloned()
        .ok_or_else(|| ConfigurationError::MissingEncryptionKey {
            field: field.clone(),
        })?;

    let transport = host
        .mount(MountRequest {
            root,
            field,
            src: &descriptor.src,
        })
        .map_err(|err| ConfigurationError::FrameMount {
            field: field.clone(),
            reason: err.to_string(),
        })?;

    let handshake = HandshakeCommand::builder()
        .setup_type(registry.kind().frame_type())
        .encryption_key(encryption_key)
        .configure(ConfigureCommand {
            styles: config.styles.clone(),
            placeholder: config.placeholders.get(field).cloned(),
            locale: Some(config.locale.clone()),
            disabled: None,
        })
        .build();

    controller
        .mount(transport, handshake, Instant::now())
        .map_err(|err| ConfigurationError::FrameMount {
            field: field.clone(),
            reason: err.to_string(),
        })
}

#[cfg(feature = "tracing")]
fn report(err: &ConfigurationError) {
    use csf_core::errors::Severity;

    match err.severity() {
        Severity::Warning => tracing::warn!("Secured fields not initialized: {err}"),
        Severity::Error => tracing::error!("Secured fields not initialized: {err}"),
    }
}

#[cfg(not(feature = "tracing"))]
fn report(_err: &ConfigurationError) {}

pub struct SecuredFieldsHandle<H: FrameHost> {
    host: H,
    root: String,
    registry: Registry,
    /// One per descriptor, in registry order.
    controllers: Vec<FieldController<H::Transport>>,
    keys: EncryptionKeys,
    config: SetupConfig,
    observers: Observers,
    /// Composite last published to observers; only used to detect transitions.
    published: CompositeState,
    /// Receive order across all fields.
    seq: u64,
    destroyed: bool,
}

impl<H: FrameHost> SecuredFieldsHandle<H> {
    pub fn subscribe(&mut self, observer: impl Observer + 'static) -> SubscriptionId {
        self.observers.subscribe(Box::new(observer))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn fields(&self) -> Vec<FieldName> {
        self.registry.names()
    }

    pub fn field_state(&self, field: &FieldName) -> Option<&FieldState> {
        self.controller(field).map(|c| c.field_state())
    }

    /// Current card-level state, derived from the fields on every call.
    pub fn composite_state(&self) -> CompositeState {
        aggregator::aggregate(&self.snapshots())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Hand over a raw message received from a frame.
    ///
    /// `origin` is the sender origin reported by the transport. Anomalies are logged and
    /// dropped; they never reach observers.
    pub fn receive(&mut self, origin: &str, data: &str) -> Delivery {
        match Envelope::from_json(data) {
            Ok(envelope) => self.receive_envelope(origin, &envelope),
            Err(err) => self.drop_message(ProtocolAnomaly::Malformed {
                reason: err.to_string(),
            }),
        }
    }

    /// Like [`Self::receive`], for transports that deliver structured data.
    pub fn receive_value(&mut self, origin: &str, data: AnyJson) -> Delivery {
        match Envelope::from_value(data) {
            Ok(envelope) => self.receive_envelope(origin, &envelope),
            Err(err) => self.drop_message(ProtocolAnomaly::Malformed {
                reason: err.to_string(),
            }),
        }
    }

    pub fn receive_envelope(&mut self, origin: &str, envelope: &Envelope) -> Delivery {
        if self.destroyed {
            return self.drop_message(ProtocolAnomaly::Destroyed);
        }

        let Some(index) = self.registry.position(&envelope.field_name) else {
            return self.drop_message(ProtocolAnomaly::UnknownField {
                field: envelope.field_name.to_string(),
            });
        };

        self.seq += 1;
        match self.controllers[index].handle(origin, envelope, self.seq) {
            Ok(Some(change)) => {
                self.publish(index, change);
                Delivery::Applied
            }
            Ok(None) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(field = %envelope.field_name, "Ignoring unknown message type");
                Delivery::Ignored
            }
            Err(anomaly) => self.drop_message(anomaly),
        }
    }

    /// Ask a field's frame to take focus. Completion arrives later as a `focus` message.
    pub fn set_focus(&mut self, field: &FieldName) -> Result<(), CommandError> {
        self.ensure_live()?;
        self.controller_mut(field)?.set_focus()
    }

    pub fn update_styles(&mut self, styles: AnyJson) -> Result<(), CommandError> {
        self.ensure_live()?;
        self.config.styles = Some(styles.clone());
        self.broadcast(ConfigureCommand::builder().styles(styles).build())
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) -> Result<(), CommandError> {
        self.ensure_live()?;
        let locale = locale.into();
        self.config.locale = locale.clone();
        self.broadcast(ConfigureCommand::builder().locale(locale).build())
    }

    pub fn set_disabled(&mut self, disabled: bool) -> Result<(), CommandError> {
        self.ensure_live()?;
        self.broadcast(ConfigureCommand::builder().disabled(disabled).build())
    }

    pub fn set_placeholder(
        &mut self,
        field: &FieldName,
        placeholder: impl Into<String>,
    ) -> Result<(), CommandError> {
        self.ensure_live()?;
        let placeholder = placeholder.into();
        self.config
            .placeholders
            .insert(field.clone(), placeholder.clone());
        self.controller_mut(field)?
            .configure(ConfigureCommand::builder().placeholder(placeholder).build())
    }

    /// Encrypted values of every field, once the card is valid as a whole.
    ///
    /// A synchronous check over already-reported state; fails with
    /// [`PayloadError::NotReady`] while any required field is not valid.
    pub fn request_payload(&self) -> Result<SubmitPayload, PayloadError> {
        if self.destroyed {
            return Err(PayloadError::Destroyed);
        }
        aggregator::assemble_payload(&self.snapshots())
    }

    /// Declare frames still loading after the policy timeout as failed.
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<FrameLoadFailure> {
        if self.destroyed {
            return Vec::new();
        }

        let policy = self.config.load_policy;
        let mut failures = Vec::new();
        for index in 0..self.controllers.len() {
            if let Some(failure) = self.controllers[index].poll_timeout(now, &policy) {
                failures.push(failure.clone());
                self.publish(
                    index,
                    FieldChange {
                        load_failure: Some(failure),
                        ..Default::default()
                    },
                );
            }
        }
        failures
    }

    /// Tear down one field and mount a fresh frame for it.
    ///
    /// The previous session token is revoked first, so late messages from the old frame
    /// are rejected. A field that fails to remount stays destroyed.
    pub fn recreate_field(&mut self, field: &FieldName) -> Result<(), CommandError> {
        self.ensure_live()?;
        let index = self
            .registry
            .position(field)
            .ok_or_else(|| CommandError::UnknownField(field.clone()))?;

        self.controllers[index].destroy();
        let mut controller = FieldController::new(self.registry.descriptors()[index].clone());
        let mounted = mount(
            &mut controller,
            &self.config,
            &self.registry,
            &self.keys,
            &mut self.host,
            &self.root,
        );
        if mounted.is_ok() {
            self.controllers[index] = controller;
        }

        self.publish(
            index,
            FieldChange {
                validation: true,
                ..Default::default()
            },
        );

        mounted.map_err(|err| {
            report(&err);
            self.observers.emit(CsfEvent::Error(err.clone()));
            CommandError::Remount(err)
        })
    }

    /// Revoke every session token, then remove every frame.
    ///
    /// Tokens go first so that a message already in flight is rejected by the token check
    /// even if it races the frame removal.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        for controller in self.controllers.iter_mut() {
            controller.invalidate();
        }
        for controller in self.controllers.iter_mut() {
            controller.destroy();
        }

        self.destroyed = true;
        self.observers.clear();

        #[cfg(feature = "tracing")]
        tracing::debug!("Secured fields destroyed");
    }

    fn publish(&mut self, index: usize, change: FieldChange) {
        let controller = &self.controllers[index];
        let field = controller.name().clone();
        let state = controller.field_state().clone();

        if let Some(focused) = change.focus {
            self.observers.emit(CsfEvent::Focus {
                field: field.clone(),
                focused,
            });
        }

        if let Some(failure) = change.load_failure {
            self.observers.emit(CsfEvent::FrameLoadFailed(failure));
        }

        if change.validation {
            self.observers.emit(CsfEvent::FieldValidation {
                field: field.clone(),
                state: state.clone(),
            });
        }

        let composite = self.composite_state();

        if composite.detected_brand != self.published.detected_brand {
            self.observers
                .emit(CsfEvent::BrandDetected(composite.detected_brand.clone()));
        }

        if composite.all_valid != self.published.all_valid {
            self.observers.emit(CsfEvent::AllValid(composite.all_valid));
        }

        if composite.all_frames_ready && !self.published.all_frames_ready {
            self.observers.emit(CsfEvent::AllFramesReady);
        }

        self.published = composite;

        if change.validation && state.is_valid() && state.has_focus() && self.config.auto_focus {
            self.advance_focus(index);
        }
    }

    /// Move focus from a completed card number or expiry field to the next visible field.
    fn advance_focus(&mut self, index: usize) {
        let from = self.controllers[index].name();
        if !(from.is_card_number() || from.is_expiry()) {
            return;
        }

        let snapshots = self.snapshots();
        let hint = aggregator::brand_hint(&snapshots);
        let next = snapshots
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, s)| {
                s.ready && aggregator::effective_policy(s.descriptor, hint) != FieldPolicy::Hidden
            })
            .map(|(i, _)| i);

        if let Some(next) = next {
            if let Err(_err) = self.controllers[next].set_focus() {
                #[cfg(feature = "tracing")]
                tracing::debug!("Auto focus failed: {_err}");
            }
        }
    }

    fn snapshots(&self) -> Vec<FieldSnapshot<'_>> {
        self.controllers
            .iter()
            .map(|c| FieldSnapshot {
                descriptor: c.descriptor(),
                state: c.field_state(),
                ready: c.state().is_ready(),
                encrypted: c.encrypted_value(),
            })
            .collect()
    }

    fn controller(&self, field: &FieldName) -> Option<&FieldController<H::Transport>> {
        self.registry
            .position(field)
            .map(|index| &self.controllers[index])
    }

    fn controller_mut(
        &mut self,
        field: &FieldName,
    ) -> Result<&mut FieldController<H::Transport>, CommandError> {
        let index = self
            .registry
            .position(field)
            .ok_or_else(|| CommandError::UnknownField(field.clone()))?;
        Ok(&mut self.controllers[index])
    }

    fn ensure_live(&self) -> Result<(), CommandError> {
        if self.destroyed {
            Err(CommandError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Send a configure command to every ready field. Fields still loading pick the
    /// settings up from the handshake instead.
    fn broadcast(&mut self, command: ConfigureCommand) -> Result<(), CommandError> {
        let mut result = Ok(());
        for controller in self.controllers.iter_mut() {
            if !controller.state().is_ready() {
                continue;
            }
            if let Err(err) = controller.configure(command.clone()) {
                result = result.and(Err(err));
            }
        }
        result
    }

    fn drop_message(&self, anomaly: ProtocolAnomaly) -> Delivery {
        #[cfg(feature = "tracing")]
        tracing::warn!("Dropping frame message: {anomaly}");
        Delivery::Dropped(anomaly)
    }
}

impl<H: FrameHost> Drop for SecuredFieldsHandle<H> {
    fn drop(&mut self) {
        self.destroy();
    }
}
