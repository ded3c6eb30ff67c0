use cryptographic_message_syntax::{SignedDataBuilder, SignerBuilder};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use x509_certificate::{CapturedX509Certificate, InMemorySigningKeyPair};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::services::assets::AssetBundle;
use crate::services::pass_builder::{PassDescriptor, PassTemplate};
use crate::services::resources::SigningMaterials;

const PASS_JSON: &str = "pass.json";
const MANIFEST_JSON: &str = "manifest.json";
const SIGNATURE: &str = "signature";

#[derive(thiserror::Error, Debug)]
pub enum SignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Signer key error: {0}")]
    Key(String),

    #[error("CMS signing failed: {0}")]
    Cms(String),
}

/// Loads the optional `pass.json` template from the pass model directory.
/// Best-effort: a missing or unparseable template is just skipped.
pub fn load_template(model_dir: &Path) -> Option<PassTemplate> {
    let path = model_dir.join(PASS_JSON);
    let bytes = std::fs::read(&path).ok()?;

    match serde_json::from_slice(&bytes) {
        Ok(template) => Some(template),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unparseable pass template");
            None
        }
    }
}

/// Assembles and signs a complete .pkpass archive: pass.json, the four
/// image slots, a SHA-1 manifest and a detached CMS signature over it.
pub fn build_pkpass(
    descriptor: &PassDescriptor,
    assets: &AssetBundle,
    materials: &SigningMaterials,
) -> Result<Vec<u8>, SignError> {
    let pass_json = serde_json::to_vec_pretty(descriptor)?;

    let mut entries: Vec<(&str, &[u8])> = vec![(PASS_JSON, pass_json.as_slice())];
    entries.extend(assets.entries());

    let manifest = manifest_for(&entries);
    let manifest_json = serde_json::to_vec_pretty(&manifest)?;
    let signature = sign_manifest(&manifest_json, materials)?;

    write_archive(&entries, &manifest_json, &signature)
}

/// SHA-1 hex digest per archive entry, keyed by filename. The manifest and
/// signature themselves are never listed.
pub fn manifest_for(entries: &[(&str, &[u8])]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, bytes)| (name.to_string(), hex::encode(Sha1::digest(bytes))))
        .collect()
}

fn sign_manifest(manifest_json: &[u8], materials: &SigningMaterials) -> Result<Vec<u8>, SignError> {
    let signer_cert = parse_certificate(&materials.signer_cert.read()?)?;
    let wwdr_cert = parse_certificate(&materials.wwdr_cert.read()?)?;
    let key_pair = load_signing_key(
        &materials.signer_key.read()?,
        materials.key_passphrase.as_deref(),
    )?;

    let signer = SignerBuilder::new(&key_pair, signer_cert.clone());

    SignedDataBuilder::default()
        .content_external(manifest_json.to_vec())
        .signer(signer)
        .certificate(wwdr_cert)
        .build_der()
        .map_err(|e| SignError::Cms(e.to_string()))
}

fn parse_certificate(bytes: &[u8]) -> Result<CapturedX509Certificate, SignError> {
    let result = if looks_like_pem(bytes) {
        CapturedX509Certificate::from_pem(bytes)
    } else {
        CapturedX509Certificate::from_der(bytes.to_vec())
    };

    result.map_err(|e| SignError::Certificate(e.to_string()))
}

/// Parses a PKCS#8 signer key, PEM or DER, decrypting `ENCRYPTED PRIVATE
/// KEY` blocks with the configured passphrase.
fn load_signing_key(
    bytes: &[u8],
    passphrase: Option<&str>,
) -> Result<InMemorySigningKeyPair, SignError> {
    let der = if looks_like_pem(bytes) {
        let block = pem::parse(bytes).map_err(|e| SignError::Key(e.to_string()))?;
        match block.tag() {
            "PRIVATE KEY" => block.contents().to_vec(),
            "ENCRYPTED PRIVATE KEY" => decrypt_key(block.contents(), passphrase)?,
            other => {
                return Err(SignError::Key(format!(
                    "unsupported key block `{}`, expected a PKCS#8 private key",
                    other
                )))
            }
        }
    } else {
        bytes.to_vec()
    };

    InMemorySigningKeyPair::from_pkcs8_der(&der).map_err(|e| SignError::Key(e.to_string()))
}

fn decrypt_key(der: &[u8], passphrase: Option<&str>) -> Result<Vec<u8>, SignError> {
    let passphrase = passphrase
        .ok_or_else(|| SignError::Key("signer key is encrypted but no passphrase is configured".to_string()))?;

    let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(der)
        .map_err(|e| SignError::Key(e.to_string()))?;

    let document = encrypted
        .decrypt(passphrase)
        .map_err(|e| SignError::Key(format!("key decryption failed: {}", e)))?;

    Ok(document.as_bytes().to_vec())
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes.starts_with(b"-----BEGIN")
}

fn write_archive(
    entries: &[(&str, &[u8])],
    manifest_json: &[u8],
    signature: &[u8],
) -> Result<Vec<u8>, SignError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(bytes)?;
    }

    zip.start_file(MANIFEST_JSON, options)?;
    zip.write_all(manifest_json)?;

    zip.start_file(SIGNATURE, options)?;
    zip.write_all(signature)?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::resources::MaterialSource;
    use std::io::Read;
    use std::path::PathBuf;
    use zip::ZipArchive;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn test_materials(key_file: &str, passphrase: Option<&str>) -> SigningMaterials {
        SigningMaterials {
            model_dir: fixture(""),
            wwdr_cert: MaterialSource::File(fixture("wwdr.pem")),
            signer_cert: MaterialSource::File(fixture("signer-cert.pem")),
            signer_key: MaterialSource::File(fixture(key_file)),
            key_passphrase: passphrase.map(str::to_string),
        }
    }

    fn sample_entries<'a>(pass_json: &'a [u8]) -> Vec<(&'a str, &'a [u8])> {
        vec![("pass.json", pass_json), ("icon.png", b"icon-bytes")]
    }

    #[test]
    fn test_manifest_sha1_hex() {
        let manifest = manifest_for(&[("hello.txt", b"hello")]);
        assert_eq!(
            manifest.get("hello.txt").unwrap(),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    #[test]
    fn test_manifest_excludes_nothing_passed() {
        let pass_json = br#"{"formatVersion":1}"#;
        let manifest = manifest_for(&sample_entries(pass_json));
        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains_key("pass.json"));
        assert!(!manifest.contains_key("manifest.json"));
    }

    #[test]
    fn test_sign_manifest_with_plain_key() {
        let materials = test_materials("signer-key.pem", None);
        let signature = sign_manifest(b"{\"pass.json\":\"abc\"}", &materials).unwrap();
        // DER SEQUENCE header of a CMS ContentInfo
        assert_eq!(signature[0], 0x30);
        assert!(signature.len() > 256);
    }

    #[test]
    fn test_sign_manifest_with_encrypted_key() {
        let materials = test_materials("signer-key-encrypted.pem", Some("hunter2"));
        let signature = sign_manifest(b"{}", &materials).unwrap();
        assert_eq!(signature[0], 0x30);
    }

    #[test]
    fn test_encrypted_key_without_passphrase_fails() {
        let materials = test_materials("signer-key-encrypted.pem", None);
        let err = sign_manifest(b"{}", &materials).unwrap_err();
        assert!(matches!(err, SignError::Key(_)));
    }

    #[test]
    fn test_encrypted_key_with_wrong_passphrase_fails() {
        let materials = test_materials("signer-key-encrypted.pem", Some("wrong"));
        let err = sign_manifest(b"{}", &materials).unwrap_err();
        assert!(matches!(err, SignError::Key(_)));
    }

    #[test]
    fn test_garbage_certificate_is_rejected() {
        let mut materials = test_materials("signer-key.pem", None);
        materials.signer_cert = MaterialSource::Inline(b"not a certificate".to_vec());
        let err = sign_manifest(b"{}", &materials).unwrap_err();
        assert!(matches!(err, SignError::Certificate(_)));
    }

    #[test]
    fn test_missing_key_file_is_io_error() {
        let mut materials = test_materials("signer-key.pem", None);
        materials.signer_key = MaterialSource::File(fixture("does-not-exist.pem"));
        let err = sign_manifest(b"{}", &materials).unwrap_err();
        assert!(matches!(err, SignError::Io(_)));
    }

    #[test]
    fn test_build_pkpass_produces_complete_archive() {
        use crate::config::SigningConfig;
        use crate::services::assets::placeholder_bundle;
        use crate::services::pass_builder::build_descriptor;
        use crate::services::pass_builder::tests_support::sample_resolved_pass;

        let materials = test_materials("signer-key.pem", None);
        let resolved = sample_resolved_pass();
        let descriptor = build_descriptor(&resolved, &SigningConfig::disabled(), None);

        let bytes = build_pkpass(&descriptor, placeholder_bundle(), &materials).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();

        for expected in [
            "pass.json",
            "icon.png",
            "icon@2x.png",
            "logo.png",
            "strip.png",
            "manifest.json",
            "signature",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }

        // The embedded manifest must hash the embedded pass.json
        let mut pass_json = Vec::new();
        archive
            .by_name("pass.json")
            .unwrap()
            .read_to_end(&mut pass_json)
            .unwrap();
        let mut manifest_json = Vec::new();
        archive
            .by_name("manifest.json")
            .unwrap()
            .read_to_end(&mut manifest_json)
            .unwrap();

        let manifest: BTreeMap<String, String> = serde_json::from_slice(&manifest_json).unwrap();
        assert_eq!(
            manifest.get("pass.json").unwrap(),
            &hex::encode(Sha1::digest(&pass_json))
        );
    }

    #[test]
    fn test_load_template_reads_model_pass_json() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("pass.json"),
            br#"{"barcode":{"format":"PKBarcodeFormatAztec"},"backgroundColor":"rgb(1,2,3)"}"#,
        )
        .unwrap();

        let template = load_template(dir.path()).unwrap();
        assert_eq!(
            template.barcode.unwrap().format.as_deref(),
            Some("PKBarcodeFormatAztec")
        );
        assert_eq!(template.background_color.as_deref(), Some("rgb(1,2,3)"));
    }

    #[test]
    fn test_load_template_skips_missing_or_broken_files() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_template(dir.path()).is_none());

        std::fs::write(dir.path().join("pass.json"), b"{ broken").unwrap();
        assert!(load_template(dir.path()).is_none());
    }
}
