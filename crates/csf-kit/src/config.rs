use std::{collections::HashMap, fmt::Debug, time::Duration};

use bon::Builder;
use csf_core::{
    errors::{ConfigurationError, FrameLoadFailure},
    types::{AnyJson, Brand, FieldName},
};
use url::Url;

use crate::{
    controller::FieldState,
    events::{CsfEvent, Observer},
};

/// Version segment of the frame source path.
pub const FRAME_VERSION: &str = "5.0.0";

/// Setup for one secured fields instance.
#[derive(Builder, Debug)]
pub struct SetupConfig {
    /// Selector of the root container holding the field slots.
    #[builder(into)]
    pub root: Option<String>,
    /// Setup type: `card`, a scheme/brand alias, or a generic single field type.
    #[builder(into, default = "card".to_string())]
    pub setup_type: String,
    /// Public client key authenticating the integration.
    #[builder(into)]
    pub client_key: Option<String>,
    /// Base URL frames are loaded from, derived from the environment/region.
    pub loading_context: Url,
    #[builder(into, default = FRAME_VERSION.to_string())]
    pub frame_version: String,
    #[builder(into, default = "en-US".to_string())]
    pub locale: String,
    /// Style directives forwarded to every frame.
    pub styles: Option<AnyJson>,
    #[builder(default)]
    pub placeholders: HashMap<FieldName, String>,
    /// Move focus to the next field once a field is completed.
    #[builder(default = true)]
    pub auto_focus: bool,
    #[builder(default)]
    pub expiry_layout: ExpiryLayout,
    #[builder(default)]
    pub load_policy: FrameLoadPolicy,
    #[builder(default)]
    pub callbacks: Callbacks,
}

/// How the expiry date is collected in a card setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpiryLayout {
    /// One `encryptedExpiryDate` field.
    #[default]
    Combined,
    /// Separate `encryptedExpiryMonth` and `encryptedExpiryYear` fields.
    Split,
}

/// When a frame that has not completed its handshake is given up on.
///
/// Failed frames are not retried automatically; see
/// [`SecuredFieldsHandle::recreate_field`](crate::setup::SecuredFieldsHandle::recreate_field).
#[derive(Builder, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLoadPolicy {
    #[builder(default = FrameLoadPolicy::DEFAULT_TIMEOUT)]
    pub timeout: Duration,
}

impl FrameLoadPolicy {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
}

impl Default for FrameLoadPolicy {
    fn default() -> Self {
        FrameLoadPolicy {
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Named callbacks, registered as the first observer of the handle.
///
/// Configuration errors raised during setup are reported to `on_error` as well as returned.
#[derive(Default)]
pub struct Callbacks {
    on_all_valid: Option<Box<dyn FnMut(bool)>>,
    on_field_validation: Option<Box<dyn FnMut(&FieldName, &FieldState)>>,
    on_brand_detected: Option<Box<dyn FnMut(Option<&Brand>)>>,
    on_error: Option<Box<dyn FnMut(&ConfigurationError)>>,
    on_focus: Option<Box<dyn FnMut(&FieldName, bool)>>,
    on_frame_load_failure: Option<Box<dyn FnMut(&FrameLoadFailure)>>,
    on_all_frames_ready: Option<Box<dyn FnMut()>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_all_valid(mut self, f: impl FnMut(bool) + 'static) -> Self {
        self.on_all_valid = Some(Box::new(f));
        self
    }

    pub fn on_field_validation(mut self, f: impl FnMut(&FieldName, &FieldState) + 'static) -> Self {
        self.on_field_validation = Some(Box::new(f));
        self
    }

    pub fn on_brand_detected(mut self, f: impl FnMut(Option<&Brand>) + 'static) -> Self {
        self.on_brand_detected = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ConfigurationError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_focus(mut self, f: impl FnMut(&FieldName, bool) + 'static) -> Self {
        self.on_focus = Some(Box::new(f));
        self
    }

    pub fn on_frame_load_failure(mut self, f: impl FnMut(&FrameLoadFailure) + 'static) -> Self {
        self.on_frame_load_failure = Some(Box::new(f));
        self
    }

    pub fn on_all_frames_ready(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_all_frames_ready = Some(Box::new(f));
        self
    }
}

impl Observer for Callbacks {
    fn notify(&mut self, event: &CsfEvent) {
        match event {
            CsfEvent::AllValid(valid) => {
                if let Some(f) = self.on_all_valid.as_mut() {
                    f(*valid)
                }
            }
            CsfEvent::FieldValidation { field, state } => {
                if let Some(f) = self.on_field_validation.as_mut() {
                    f(field, state)
                }
            }
            CsfEvent::BrandDetected(brand) => {
                if let Some(f) = self.on_brand_detected.as_mut() {
                    f(brand.as_ref())
                }
            }
            CsfEvent::Focus { field, focused } => {
                if let Some(f) = self.on_focus.as_mut() {
                    f(field, *focused)
                }
            }
            CsfEvent::FrameLoadFailed(failure) => {
                if let Some(f) = self.on_frame_load_failure.as_mut() {
                    f(failure)
                }
            }
            CsfEvent::AllFramesReady => {
                if let Some(f) = self.on_all_frames_ready.as_mut() {
                    f()
                }
            }
            CsfEvent::Error(err) => {
                if let Some(f) = self.on_error.as_mut() {
                    f(err)
                }
            }
        }
    }
}

impl Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_all_valid", &self.on_all_valid.is_some())
            .field("on_field_validation", &self.on_field_validation.is_some())
            .field("on_brand_detected", &self.on_brand_detected.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_focus", &self.on_focus.is_some())
            .field("on_frame_load_failure", &self.on_frame_load_failure.is_some())
            .field("on_all_frames_ready", &self.on_all_frames_ready.is_some())
            .finish()
    }
}
