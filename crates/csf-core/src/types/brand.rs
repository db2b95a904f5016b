use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::types::FieldPolicy;

/// A card brand detected by the card number frame, e.g. `visa`, `mc`, `amex`.
///
/// Brands are normalized to lowercase so that hints from different frame versions compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Brand(String);

impl Brand {
    pub fn new(name: impl AsRef<str>) -> Self {
        Brand(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Brand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.trim().is_empty() {
            return Err(serde::de::Error::custom("Empty brand"));
        }
        Ok(Brand::new(s))
    }
}

impl Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Brand {
    fn from(value: &str) -> Self {
        Brand::new(value)
    }
}

/// Everything the card number frame reports alongside a detected brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandHint {
    /// Detected brand; `None` once the number no longer identifies one.
    #[serde(default)]
    pub brand: Option<Brand>,
    /// How the security code field applies to this brand.
    #[serde(default)]
    pub cvc_policy: FieldPolicy,
    /// How the expiry date field(s) apply to this brand.
    #[serde(default)]
    pub expiry_date_policy: FieldPolicy,
    /// Whether the merchant accepts this brand.
    #[serde(default = "supported_default")]
    pub supported: bool,
}

fn supported_default() -> bool {
    true
}

impl BrandHint {
    pub fn policy_for(&self, field: &crate::types::FieldName) -> FieldPolicy {
        match field {
            crate::types::FieldName::SecurityCode => self.cvc_policy,
            f if f.is_expiry() => self.expiry_date_policy,
            _ => FieldPolicy::Required,
        }
    }
}
