use base64::{engine::general_purpose::STANDARD, Engine};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::SigningConfig;

/// Conventional locations probed for the wallet assets root, in order.
const ROOT_CANDIDATES: &[&str] = &["wallet-assets", "assets/wallet", "/etc/stampcard/wallet"];

const MODEL_DIR_NAME: &str = "pass-model";
const WWDR_CERT_NAME: &str = "wwdr.pem";
const SIGNER_CERT_NAME: &str = "signer-cert.pem";
const SIGNER_KEY_NAME: &str = "signer-key.pem";

#[derive(thiserror::Error, Debug)]
pub enum LocateError {
    #[error("No wallet assets directory exists among the configured candidates")]
    AssetsRootNotFound,

    #[error("Missing signing resource `{label}` at {path}")]
    MissingResource { label: &'static str, path: PathBuf },

    #[error("Inline {label} is not valid base64: {source}")]
    InvalidInline {
        label: &'static str,
        source: base64::DecodeError,
    },
}

/// Where a piece of signing material lives: a file to be read at signing
/// time, or bytes supplied inline through configuration.
#[derive(Debug, Clone)]
pub enum MaterialSource {
    File(PathBuf),
    Inline(Vec<u8>),
}

impl MaterialSource {
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::File(path) => std::fs::read(path),
            Self::Inline(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Resolved locations of everything local signing needs. Read-only once
/// computed; the actual file reads happen inside the signing attempt.
#[derive(Debug, Clone)]
pub struct SigningMaterials {
    pub model_dir: PathBuf,
    pub wwdr_cert: MaterialSource,
    pub signer_cert: MaterialSource,
    pub signer_key: MaterialSource,
    pub key_passphrase: Option<String>,
}

static LOCATED: OnceLock<SigningMaterials> = OnceLock::new();

/// Process-lifetime cached resolution. Only successful results are cached;
/// a failed probe is recomputed on the next request, which keeps a broken
/// deployment fixable by dropping files in place.
pub fn locate_cached(config: &SigningConfig) -> Result<SigningMaterials, LocateError> {
    if let Some(materials) = LOCATED.get() {
        return Ok(materials.clone());
    }

    let materials = locate_signing_materials(config)?;
    Ok(LOCATED.get_or_init(|| materials).clone())
}

/// Resolves the assets root and every signing material from the config,
/// applying per-item overrides and the inline base64 escape hatches.
pub fn locate_signing_materials(
    config: &SigningConfig,
) -> Result<SigningMaterials, LocateError> {
    let root = resolve_root(config)?;

    let model_dir = resolve_path(
        config.pass_model_dir.as_deref(),
        &root,
        MODEL_DIR_NAME,
        "model",
    )?;
    let wwdr_cert = resolve_path(
        config.wwdr_cert_path.as_deref(),
        &root,
        WWDR_CERT_NAME,
        "intermediate certificate",
    )?;

    let signer_cert = match &config.signer_cert_base64 {
        Some(blob) => decode_inline(blob.expose_secret(), "signer certificate")?,
        None => MaterialSource::File(resolve_path(
            config.signer_cert_path.as_deref(),
            &root,
            SIGNER_CERT_NAME,
            "signer certificate",
        )?),
    };

    let signer_key = match &config.signer_key_base64 {
        Some(blob) => decode_inline(blob.expose_secret(), "signer key")?,
        None => MaterialSource::File(resolve_path(
            config.signer_key_path.as_deref(),
            &root,
            SIGNER_KEY_NAME,
            "signer key",
        )?),
    };

    Ok(SigningMaterials {
        model_dir,
        wwdr_cert: MaterialSource::File(wwdr_cert),
        signer_cert,
        signer_key,
        key_passphrase: config
            .signer_key_password
            .as_ref()
            .map(|p| p.expose_secret().clone()),
    })
}

fn resolve_root(config: &SigningConfig) -> Result<PathBuf, LocateError> {
    let override_dir = config.wallet_assets_dir.as_deref();

    override_dir
        .into_iter()
        .chain(ROOT_CANDIDATES.iter().copied())
        .map(PathBuf::from)
        .find(|candidate| candidate.is_dir())
        .ok_or(LocateError::AssetsRootNotFound)
}

/// Explicit override path beats the computed default under the root. Either
/// way the location must exist.
fn resolve_path(
    override_path: Option<&str>,
    root: &Path,
    default_name: &str,
    label: &'static str,
) -> Result<PathBuf, LocateError> {
    let path = match override_path {
        Some(p) => PathBuf::from(p),
        None => root.join(default_name),
    };

    if path.exists() {
        Ok(path)
    } else {
        Err(LocateError::MissingResource { label, path })
    }
}

fn decode_inline(blob: &str, label: &'static str) -> Result<MaterialSource, LocateError> {
    STANDARD
        .decode(blob.trim())
        .map(MaterialSource::Inline)
        .map_err(|source| LocateError::InvalidInline { label, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use std::fs;
    use tempfile::TempDir;

    fn populated_root() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(MODEL_DIR_NAME)).unwrap();
        fs::write(dir.path().join(WWDR_CERT_NAME), b"wwdr").unwrap();
        fs::write(dir.path().join(SIGNER_CERT_NAME), b"cert").unwrap();
        fs::write(dir.path().join(SIGNER_KEY_NAME), b"key").unwrap();
        dir
    }

    fn config_with_root(root: &TempDir) -> SigningConfig {
        let mut config = SigningConfig::disabled();
        config.wallet_assets_dir = Some(root.path().to_string_lossy().into_owned());
        config
    }

    #[test]
    fn test_resolves_all_materials_from_root() {
        let root = populated_root();
        let materials = locate_signing_materials(&config_with_root(&root)).unwrap();

        assert_eq!(materials.model_dir, root.path().join(MODEL_DIR_NAME));
        assert!(matches!(materials.signer_cert, MaterialSource::File(_)));
        assert_eq!(materials.signer_key.read().unwrap(), b"key");
        assert!(materials.key_passphrase.is_none());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let mut config = SigningConfig::disabled();
        config.wallet_assets_dir = Some("/nonexistent/stampcard-test".to_string());
        // Conventional candidates do not exist in the test environment either
        let err = locate_signing_materials(&config).unwrap_err();
        assert!(matches!(err, LocateError::AssetsRootNotFound));
    }

    #[test]
    fn test_missing_signer_key_is_labeled() {
        let root = populated_root();
        fs::remove_file(root.path().join(SIGNER_KEY_NAME)).unwrap();

        let err = locate_signing_materials(&config_with_root(&root)).unwrap_err();
        match err {
            LocateError::MissingResource { label, path } => {
                assert_eq!(label, "signer key");
                assert_eq!(path, root.path().join(SIGNER_KEY_NAME));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_path_override_beats_root_default() {
        let root = populated_root();
        let elsewhere = TempDir::new().unwrap();
        let cert_path = elsewhere.path().join("prod-cert.pem");
        fs::write(&cert_path, b"override-cert").unwrap();

        let mut config = config_with_root(&root);
        config.signer_cert_path = Some(cert_path.to_string_lossy().into_owned());

        let materials = locate_signing_materials(&config).unwrap();
        assert_eq!(materials.signer_cert.read().unwrap(), b"override-cert");
    }

    #[test]
    fn test_inline_blobs_bypass_filesystem_checks() {
        let root = populated_root();
        fs::remove_file(root.path().join(SIGNER_CERT_NAME)).unwrap();
        fs::remove_file(root.path().join(SIGNER_KEY_NAME)).unwrap();

        let mut config = config_with_root(&root);
        config.signer_cert_base64 = Some(Secret::new(STANDARD.encode(b"inline-cert")));
        config.signer_key_base64 = Some(Secret::new(STANDARD.encode(b"inline-key")));
        config.signer_key_password = Some(Secret::new("hunter2".to_string()));

        let materials = locate_signing_materials(&config).unwrap();
        assert_eq!(materials.signer_cert.read().unwrap(), b"inline-cert");
        assert_eq!(materials.signer_key.read().unwrap(), b"inline-key");
        assert_eq!(materials.key_passphrase.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_invalid_inline_base64_is_reported() {
        let root = populated_root();
        let mut config = config_with_root(&root);
        config.signer_cert_base64 = Some(Secret::new("@@not-base64@@".to_string()));

        let err = locate_signing_materials(&config).unwrap_err();
        assert!(matches!(
            err,
            LocateError::InvalidInline {
                label: "signer certificate",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_model_dir_is_labeled() {
        let root = populated_root();
        fs::remove_dir(root.path().join(MODEL_DIR_NAME)).unwrap();

        let err = locate_signing_materials(&config_with_root(&root)).unwrap_err();
        assert!(matches!(
            err,
            LocateError::MissingResource { label: "model", .. }
        ));
    }
}
