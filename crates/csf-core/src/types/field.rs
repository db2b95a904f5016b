use std::{borrow::Cow, convert::Infallible, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// Logical name of a secured field, as it appears on the wire and in the submit payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldName {
    /// `encryptedCardNumber`, the PAN field.
    CardNumber,
    /// `encryptedExpiryDate`, combined month and year.
    ExpiryDate,
    /// `encryptedExpiryMonth`, used with a split expiry layout.
    ExpiryMonth,
    /// `encryptedExpiryYear`, used with a split expiry layout.
    ExpiryYear,
    /// `encryptedSecurityCode`, the CVC field.
    SecurityCode,
    /// The single field of a generic (non-card) setup.
    Generic(String),
}

impl FieldName {
    /// Name of the single field for a generic setup type, e.g. `giftcard` becomes
    /// `encryptedGiftcard`. A type that spells a card field name yields that field.
    pub fn generic(setup_type: &str) -> Self {
        let mut chars = setup_type.trim().chars();
        let name = match chars.next() {
            Some(first) => format!("encrypted{}{}", first.to_uppercase(), chars.as_str()),
            None => "encryptedValue".to_string(),
        };
        let Ok(field) = name.parse::<FieldName>();
        field
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldName::CardNumber => "encryptedCardNumber",
            FieldName::ExpiryDate => "encryptedExpiryDate",
            FieldName::ExpiryMonth => "encryptedExpiryMonth",
            FieldName::ExpiryYear => "encryptedExpiryYear",
            FieldName::SecurityCode => "encryptedSecurityCode",
            FieldName::Generic(name) => name,
        }
    }

    pub fn is_card_number(&self) -> bool {
        matches!(self, FieldName::CardNumber)
    }

    pub fn is_expiry(&self) -> bool {
        matches!(
            self,
            FieldName::ExpiryDate | FieldName::ExpiryMonth | FieldName::ExpiryYear
        )
    }
}

impl FromStr for FieldName {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "encryptedCardNumber" => FieldName::CardNumber,
            "encryptedExpiryDate" => FieldName::ExpiryDate,
            "encryptedExpiryMonth" => FieldName::ExpiryMonth,
            "encryptedExpiryYear" => FieldName::ExpiryYear,
            "encryptedSecurityCode" => FieldName::SecurityCode,
            other => FieldName::Generic(other.to_string()),
        })
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for FieldName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(serde::de::Error::custom("Empty field name"));
        }
        // Infallible
        let Ok(name) = s.parse::<FieldName>();
        Ok(name)
    }
}

/// Whether a field must be completed for the card to be submittable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    #[default]
    Required,
    Optional,
    Hidden,
}

impl FieldPolicy {
    pub fn is_required(&self) -> bool {
        matches!(self, FieldPolicy::Required)
    }
}

/// Validation error code reported by a frame, rendered by the element as user-facing copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub Cow<'static, str>);

impl ErrorCode {
    pub const LUHN_CHECK_FAILED: ErrorCode = ErrorCode(Cow::Borrowed("luhnCheckFailed"));
    pub const INCOMPLETE: ErrorCode = ErrorCode(Cow::Borrowed("incomplete"));
    pub const EMPTY: ErrorCode = ErrorCode(Cow::Borrowed("empty"));
    pub const EXPIRED: ErrorCode = ErrorCode(Cow::Borrowed("expired"));
    pub const UNSUPPORTED_CARD: ErrorCode = ErrorCode(Cow::Borrowed("unsupportedCard"));
    pub const FRAME_ERROR: ErrorCode = ErrorCode(Cow::Borrowed("frameError"));

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ErrorCode {
    fn from(value: &str) -> Self {
        ErrorCode(Cow::Owned(value.to_string()))
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        ErrorCode(Cow::Owned(value))
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Masked rendition of a field's value, e.g. `•••• •••• •••• 4242`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MaskedPreview(String);

impl MaskedPreview {
    /// Most digits a masked card number may reveal.
    pub const MAX_VISIBLE_DIGITS: usize = 4;

    /// Accepts a preview only if it cannot carry the raw value.
    ///
    /// Security codes must be fully masked; every other field may reveal at most
    /// [`Self::MAX_VISIBLE_DIGITS`] digits.
    pub fn checked(field: &FieldName, preview: &str) -> Option<Self> {
        let digits = preview.chars().filter(char::is_ascii_digit).count();
        let limit = match field {
            FieldName::SecurityCode => 0,
            _ => Self::MAX_VISIBLE_DIGITS,
        };
        (digits <= limit).then(|| MaskedPreview(preview.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MaskedPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
