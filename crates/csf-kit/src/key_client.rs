use std::collections::HashMap;

use csf_core::{
    types::{ClientKey, FieldName},
    wire::EncryptionKey,
};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    concepts::KeyProvider,
    keys::{EncryptionKeys, select_keys},
};

/// Fetches per-field encryption keys from the client key endpoint over HTTP.
///
/// `GET {base_url}v1/clientKeys/{clientKey}` is expected to answer with
/// [`ClientKeysResponse`]. An unknown client key is an HTTP error status.
#[derive(Debug, Clone)]
pub struct RemoteKeyProvider {
    pub base_url: Url,
    pub client: reqwest::Client,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientKeysResponse {
    #[serde(default)]
    pub keys: HashMap<FieldName, EncryptionKey>,
    /// Used for fields without a dedicated key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key: Option<EncryptionKey>,
}

impl RemoteKeyProvider {
    pub fn from_url(base_url: Url) -> Self {
        RemoteKeyProvider {
            base_url,
            client: reqwest::Client::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.headers.insert(key, value.to_owned());
        self
    }

    fn endpoint(&self, client_key: &ClientKey) -> Result<Url, url::ParseError> {
        self.base_url
            .join(&format!("v1/clientKeys/{}", client_key.as_str()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteKeyProviderError {
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("HTTP request error: {0}")]
    HttpRequestError(#[from] reqwest::Error),
}

impl KeyProvider for RemoteKeyProvider {
    type Error = RemoteKeyProviderError;

    async fn fetch_keys(
        &self,
        client_key: &ClientKey,
        fields: &[FieldName],
    ) -> Result<EncryptionKeys, Self::Error> {
        let response = self
            .client
            .get(self.endpoint(client_key)?)
            .headers(self.headers.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<ClientKeysResponse>()
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            dedicated = response.keys.len(),
            shared = response.default_key.is_some(),
            "Fetched encryption keys"
        );

        Ok(select_keys(
            fields,
            &response.keys,
            response.default_key.as_ref(),
        ))
    }
}
