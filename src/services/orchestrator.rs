use serde_json::json;

use crate::config::SigningConfig;
use crate::services::assets::AssetBundle;
use crate::services::pass_builder::{PassDescriptor, PassMeta};
use crate::services::pkpass;
use crate::services::remote_signer;
use crate::services::resources::SigningMaterials;

/// Which tier of the fallback chain produced the artifact. The delivery
/// layer exposes it as the `X-Pass-Signing` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStrategy {
    Local,
    Remote,
    Unsigned,
}

impl SigningStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Unsigned => "unsigned",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassArtifact {
    pub bytes: Vec<u8>,
    pub strategy: SigningStrategy,
}

impl PassArtifact {
    pub fn content_type(&self) -> &'static str {
        match self.strategy {
            SigningStrategy::Local | SigningStrategy::Remote => "application/vnd.apple.pkpass",
            SigningStrategy::Unsigned => "application/json",
        }
    }

    pub fn filename(&self, serial: &str) -> String {
        match self.strategy {
            SigningStrategy::Local | SigningStrategy::Remote => format!("{}.pkpass", serial),
            SigningStrategy::Unsigned => "wallet-pass.json".to_string(),
        }
    }
}

/// Runs the ordered fallback: local signing, then the remote signer, then
/// the unsigned document. Never fails and never returns more than one
/// artifact; strategy failures only pick the path, they never escape.
#[tracing::instrument(skip_all, fields(serial = %descriptor.serial_number))]
pub async fn produce_artifact(
    config: &SigningConfig,
    materials: Option<&SigningMaterials>,
    descriptor: &PassDescriptor,
    assets: &AssetBundle,
    meta: &PassMeta,
) -> PassArtifact {
    if !config.signing_enabled {
        tracing::debug!("Local signing disabled by configuration, skipping");
    } else {
        match materials {
            Some(materials) => match pkpass::build_pkpass(descriptor, assets, materials) {
                Ok(bytes) => {
                    tracing::info!(size = bytes.len(), "Pass signed locally");
                    return PassArtifact {
                        bytes,
                        strategy: SigningStrategy::Local,
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Local signing failed, trying next strategy");
                }
            },
            None => {
                tracing::warn!("Signing materials unresolved, trying next strategy");
            }
        }
    }

    if remote_signer::is_configured(config) {
        match remote_signer::sign_remotely(config, descriptor, assets, meta).await {
            Ok(bytes) => {
                tracing::info!(size = bytes.len(), "Pass signed remotely");
                return PassArtifact {
                    bytes,
                    strategy: SigningStrategy::Remote,
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote signing failed, emitting unsigned fallback");
            }
        }
    } else {
        tracing::debug!("Remote signer not configured, emitting unsigned fallback");
    }

    unsigned_fallback(descriptor, assets, meta)
}

/// The last tier: a structured, unsigned document. Has no failure modes.
fn unsigned_fallback(
    descriptor: &PassDescriptor,
    assets: &AssetBundle,
    meta: &PassMeta,
) -> PassArtifact {
    let document = json!({
        "pass": descriptor,
        "appearance": {
            "backgroundColor": descriptor.background_color,
            "foregroundColor": descriptor.foreground_color,
            "labelColor": descriptor.label_color,
            "logoText": descriptor.logo_text,
        },
        "assets": assets.to_base64_map(),
        "meta": meta,
    });

    let bytes = serde_json::to_vec(&document).unwrap_or_else(|e| {
        // Descriptor and meta are plain data; serialization cannot realistically
        // fail, but the contract here is "never error".
        tracing::error!(error = %e, "Unsigned fallback serialization failed");
        b"{}".to_vec()
    });

    tracing::info!("Emitting unsigned pass document");

    PassArtifact {
        bytes,
        strategy: SigningStrategy::Unsigned,
    }
}
