//! Card-level state derived from the individual fields.
//!
//! [`aggregate`] is a pure function of the current field states. Nothing here is cached
//! between calls, so the composite can never drift from the fields it summarizes.

use std::collections::BTreeMap;

use csf_core::{
    errors::PayloadError,
    types::{Brand, BrandHint, FieldName, FieldPolicy},
    wire::EncryptedValue,
};
use serde::Serialize;

use crate::{controller::FieldState, registry::FieldDescriptor};

/// Read-only view of one field for aggregation.
#[derive(Debug, Clone, Copy)]
pub struct FieldSnapshot<'a> {
    pub descriptor: &'a FieldDescriptor,
    pub state: &'a FieldState,
    /// Handshake completed and not destroyed.
    pub ready: bool,
    pub encrypted: Option<&'a EncryptedValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeState {
    /// Every required field is valid.
    pub all_valid: bool,
    pub detected_brand: Option<Brand>,
    pub number_of_valid_fields: usize,
    /// Field whose current error was reported most recently.
    pub last_error_field: Option<FieldName>,
    pub all_frames_ready: bool,
    pub has_unsupported_card: bool,
    /// Fields that are required under the current brand.
    pub required_fields: Vec<FieldName>,
    pub touched_fields: Vec<FieldName>,
}

/// Payload handed to the element on submit: each field's encrypted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitPayload {
    #[serde(flatten)]
    pub fields: BTreeMap<FieldName, EncryptedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<Brand>,
}

/// Brand information from the card number field, if there is one.
pub fn brand_hint<'a>(fields: &[FieldSnapshot<'a>]) -> Option<&'a BrandHint> {
    fields
        .iter()
        .find(|f| f.descriptor.name.is_card_number())
        .and_then(|f| f.state.brand_info())
}

/// Policy of a field once the brand is taken into account.
///
/// A brand may relax a required field; it never makes an optional one required.
pub fn effective_policy(descriptor: &FieldDescriptor, brand: Option<&BrandHint>) -> FieldPolicy {
    match (descriptor.policy, brand) {
        (FieldPolicy::Required, Some(hint)) if hint.brand.is_some() => {
            hint.policy_for(&descriptor.name)
        }
        (policy, _) => policy,
    }
}

pub fn aggregate(fields: &[FieldSnapshot<'_>]) -> CompositeState {
    let hint = brand_hint(fields);

    let required_fields: Vec<FieldName> = fields
        .iter()
        .filter(|f| effective_policy(f.descriptor, hint).is_required())
        .map(|f| f.descriptor.name.clone())
        .collect();

    let has_unsupported_card = hint.is_some_and(|h| !h.supported);

    let all_valid = !required_fields.is_empty()
        && !has_unsupported_card
        && fields
            .iter()
            .filter(|f| required_fields.contains(&f.descriptor.name))
            .all(|f| f.state.is_valid());

    let last_error_field = fields
        .iter()
        .filter(|f| f.state.error_code().is_some())
        .filter_map(|f| f.state.error_seq().map(|seq| (seq, &f.descriptor.name)))
        .max_by_key(|(seq, _)| *seq)
        .map(|(_, name)| name.clone());

    CompositeState {
        all_valid,
        detected_brand: hint.and_then(|h| h.brand.clone()),
        number_of_valid_fields: fields.iter().filter(|f| f.state.is_valid()).count(),
        last_error_field,
        all_frames_ready: !fields.is_empty() && fields.iter().all(|f| f.ready),
        has_unsupported_card,
        required_fields,
        touched_fields: fields
            .iter()
            .filter(|f| f.state.is_touched())
            .map(|f| f.descriptor.name.clone())
            .collect(),
    }
}

/// Collect the encrypted values of a card that is valid as a whole.
///
/// Valid optional fields are included; hidden fields never are.
pub fn assemble_payload(fields: &[FieldSnapshot<'_>]) -> Result<SubmitPayload, PayloadError> {
    let composite = aggregate(fields);
    let hint = brand_hint(fields);

    let pending: Vec<FieldName> = fields
        .iter()
        .filter(|f| composite.required_fields.contains(&f.descriptor.name))
        .filter(|f| !f.state.is_valid() || f.encrypted.is_none())
        .map(|f| f.descriptor.name.clone())
        .collect();

    if !composite.all_valid || !pending.is_empty() {
        return Err(PayloadError::NotReady { pending });
    }

    let payload_fields = fields
        .iter()
        .filter(|f| effective_policy(f.descriptor, hint) != FieldPolicy::Hidden)
        .filter(|f| f.state.is_valid())
        .filter_map(|f| f.encrypted.map(|e| (f.descriptor.name.clone(), e.clone())))
        .collect();

    Ok(SubmitPayload {
        fields: payload_fields,
        brand: composite.detected_brand,
    })
}
