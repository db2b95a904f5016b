use std::{collections::HashMap, convert::Infallible};

use csf_core::{
    types::{ClientKey, FieldName},
    wire::EncryptionKey,
};

use crate::concepts::KeyProvider;

/// Encryption key per field.
pub type EncryptionKeys = HashMap<FieldName, EncryptionKey>;

/// Pick the keys for `fields`, falling back to a shared key.
///
/// Fields with neither a dedicated nor a shared key are left out.
pub fn select_keys(
    fields: &[FieldName],
    keys: &EncryptionKeys,
    shared: Option<&EncryptionKey>,
) -> EncryptionKeys {
    fields
        .iter()
        .filter_map(|field| {
            keys.get(field)
                .or(shared)
                .map(|key| (field.clone(), key.clone()))
        })
        .collect()
}

/// Keys known up front, e.g. delivered with the checkout session.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyProvider {
    pub keys: EncryptionKeys,
    pub shared: Option<EncryptionKey>,
}

impl StaticKeyProvider {
    /// One key for every field.
    pub fn shared(key: EncryptionKey) -> Self {
        StaticKeyProvider {
            keys: EncryptionKeys::new(),
            shared: Some(key),
        }
    }

    pub fn with_key(mut self, field: FieldName, key: EncryptionKey) -> Self {
        self.keys.insert(field, key);
        self
    }
}

impl KeyProvider for StaticKeyProvider {
    type Error = Infallible;

    async fn fetch_keys(
        &self,
        _client_key: &ClientKey,
        fields: &[FieldName],
    ) -> Result<EncryptionKeys, Self::Error> {
        Ok(select_keys(fields, &self.keys, self.shared.as_ref()))
    }
}
