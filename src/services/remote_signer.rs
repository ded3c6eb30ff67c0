use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::SigningConfig;
use crate::services::assets::AssetBundle;
use crate::services::pass_builder::{PassDescriptor, PassMeta};

#[derive(thiserror::Error, Debug)]
pub enum RemoteSignError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Remote signer error: {0}")]
    ApiError(String),

    #[error("Remote signing endpoint or credential not configured")]
    NotConfigured,
}

#[derive(Debug, Serialize)]
struct RemoteSignRequest<'a> {
    pass: &'a PassDescriptor,
    assets: BTreeMap<String, String>,
    meta: &'a PassMeta,
}

pub fn is_configured(config: &SigningConfig) -> bool {
    config.remote_sign_url.is_some() && config.remote_sign_token.is_some()
}

/// Sends the descriptor, asset bundle and metadata to the remote signing
/// service in one request; a 2xx response body is the finished artifact.
#[tracing::instrument(skip_all, fields(serial = %meta.serial_number))]
pub async fn sign_remotely(
    config: &SigningConfig,
    descriptor: &PassDescriptor,
    assets: &AssetBundle,
    meta: &PassMeta,
) -> Result<Vec<u8>, RemoteSignError> {
    let (url, token) = match (&config.remote_sign_url, &config.remote_sign_token) {
        (Some(url), Some(token)) => (url, token),
        _ => return Err(RemoteSignError::NotConfigured),
    };

    let client = Client::new();

    let request_body = RemoteSignRequest {
        pass: descriptor,
        assets: assets.to_base64_map(),
        meta,
    };

    let response = client
        .post(url.trim_end_matches('/'))
        .bearer_auth(token.expose_secret())
        .json(&request_body)
        .timeout(std::time::Duration::from_secs(20))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!(
            status = %status,
            error = %error_text,
            "Remote signer request failed"
        );
        return Err(RemoteSignError::ApiError(format!(
            "Status {}: {}",
            status, error_text
        )));
    }

    let bytes = response.bytes().await?;

    tracing::info!(size = bytes.len(), "Remote signer returned an artifact");

    Ok(bytes.to_vec())
}
