//! Field descriptor registry.
//!
//! Resolves a setup type into the fields to instantiate. Card aliases are classified into
//! [`SetupKind::Card`] first, so resolution is a match over two cases rather than string
//! comparisons scattered through setup.

use std::sync::Arc;

use bon::Builder;
use csf_core::{
    errors::ConfigurationError,
    types::{ClientKey, FieldName, FieldPolicy, SetupKind},
};
use url::Url;

use crate::config::{ExpiryLayout, SetupConfig};

/// One logical field. Immutable once the registry is built.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: FieldName,
    /// Frame source URL for this field.
    pub src: Url,
    /// Policy before any brand is known.
    #[builder(default)]
    pub policy: FieldPolicy,
}

impl FieldDescriptor {
    /// Serialized origin of the frame source; the only origin accepted for this field.
    pub fn origin(&self) -> String {
        self.src.origin().ascii_serialization()
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    kind: SetupKind,
    descriptors: Vec<Arc<FieldDescriptor>>,
}

impl Registry {
    /// Canonical fields for a setup kind, in focus order.
    pub fn canonical_fields(kind: &SetupKind, layout: ExpiryLayout) -> Vec<FieldName> {
        match (kind, layout) {
            (SetupKind::Card, ExpiryLayout::Combined) => vec![
                FieldName::CardNumber,
                FieldName::ExpiryDate,
                FieldName::SecurityCode,
            ],
            (SetupKind::Card, ExpiryLayout::Split) => vec![
                FieldName::CardNumber,
                FieldName::ExpiryMonth,
                FieldName::ExpiryYear,
                FieldName::SecurityCode,
            ],
            (SetupKind::SingleGenericField(setup_type), _) => vec![FieldName::generic(setup_type)],
        }
    }

    /// Resolve the descriptors for `config`.
    ///
    /// A card setup keeps the canonical fields that have a slot in the root container and
    /// fails with [`ConfigurationError::NoSecuredFields`] if none do. A generic setup always
    /// resolves to its single field.
    pub fn resolve(
        config: &SetupConfig,
        client_key: &ClientKey,
        slots: &[FieldName],
    ) -> Result<Self, ConfigurationError> {
        let kind = SetupKind::classify(&config.setup_type);
        let src = frame_source(config, client_key, &kind)?;

        let names: Vec<FieldName> = match &kind {
            SetupKind::Card => Self::canonical_fields(&kind, config.expiry_layout)
                .into_iter()
                .filter(|name| slots.contains(name))
                .collect(),
            SetupKind::SingleGenericField(_) => {
                Self::canonical_fields(&kind, config.expiry_layout)
            }
        };

        if names.is_empty() {
            return Err(ConfigurationError::NoSecuredFields {
                setup_type: config.setup_type.clone(),
            });
        }

        let descriptors = names
            .into_iter()
            .map(|name| {
                let mut field_src = src.clone();
                field_src
                    .query_pairs_mut()
                    .append_pair("fieldType", name.as_str());
                Arc::new(FieldDescriptor::builder().name(name).src(field_src).build())
            })
            .collect();

        Ok(Registry { kind, descriptors })
    }

    pub fn kind(&self) -> &SetupKind {
        &self.kind
    }

    pub fn descriptors(&self) -> &[Arc<FieldDescriptor>] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<FieldName> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn get(&self, name: &FieldName) -> Option<&Arc<FieldDescriptor>> {
        self.descriptors.iter().find(|d| &d.name == name)
    }

    pub fn position(&self, name: &FieldName) -> Option<usize> {
        self.descriptors.iter().position(|d| &d.name == name)
    }
}

/// `{loading_context}securedfields/{client_key}/{version}/securedFields.html?type={type}`
fn frame_source(
    config: &SetupConfig,
    client_key: &ClientKey,
    kind: &SetupKind,
) -> Result<Url, ConfigurationError> {
    let path = format!(
        "securedfields/{}/{}/securedFields.html",
        client_key, config.frame_version
    );
    let mut src = config
        .loading_context
        .join(&path)
        .map_err(|err| ConfigurationError::InvalidFrameSource {
            reason: err.to_string(),
        })?;

    if src.cannot_be_a_base() || !matches!(src.scheme(), "https" | "http") {
        return Err(ConfigurationError::InvalidFrameSource {
            reason: format!("Frames cannot be loaded from '{src}'"),
        });
    }

    src.query_pairs_mut().append_pair("type", kind.frame_type());
    Ok(src)
}
