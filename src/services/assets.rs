use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(thiserror::Error, Debug)]
pub enum LogoFetchError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Logo fetch returned status {0}")]
    BadStatus(reqwest::StatusCode),

    #[error("Logo fetch returned an empty body")]
    EmptyBody,
}

/// The four image slots every pass ships with. Always fully populated;
/// slots that cannot be resolved keep the built-in placeholder bytes.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    pub icon: Vec<u8>,
    pub icon_2x: Vec<u8>,
    pub logo: Vec<u8>,
    pub strip: Vec<u8>,
}

impl AssetBundle {
    /// Slot contents keyed by their .pkpass archive filename.
    pub fn entries(&self) -> [(&'static str, &[u8]); 4] {
        [
            ("icon.png", self.icon.as_slice()),
            ("icon@2x.png", self.icon_2x.as_slice()),
            ("logo.png", self.logo.as_slice()),
            ("strip.png", self.strip.as_slice()),
        ]
    }

    /// Base64 rendering used by the remote signer request and the unsigned
    /// fallback document.
    pub fn to_base64_map(&self) -> BTreeMap<String, String> {
        self.entries()
            .into_iter()
            .map(|(name, bytes)| (name.to_string(), STANDARD.encode(bytes)))
            .collect()
    }
}

static PLACEHOLDERS: OnceLock<AssetBundle> = OnceLock::new();

/// The built-in placeholder bundle, computed once per process and read-only
/// afterwards.
pub fn placeholder_bundle() -> &'static AssetBundle {
    PLACEHOLDERS.get_or_init(|| AssetBundle {
        icon: include_bytes!("../../assets/icon.png").to_vec(),
        icon_2x: include_bytes!("../../assets/icon@2x.png").to_vec(),
        logo: include_bytes!("../../assets/logo.png").to_vec(),
        strip: include_bytes!("../../assets/strip.png").to_vec(),
    })
}

/// Builds the bundle for one pass. A configured business logo replaces the
/// `logo` and `strip` slots; every failure keeps the placeholders and is
/// logged rather than surfaced.
#[tracing::instrument]
pub async fn resolve_assets(logo_url: Option<&str>) -> AssetBundle {
    let mut bundle = placeholder_bundle().clone();

    if let Some(url) = logo_url {
        match fetch_logo(url).await {
            Ok(bytes) => {
                tracing::debug!(url = %url, size = bytes.len(), "Business logo fetched");
                bundle.logo = bytes.clone();
                bundle.strip = bytes;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Logo fetch failed, keeping placeholders");
            }
        }
    }

    bundle
}

async fn fetch_logo(url: &str) -> Result<Vec<u8>, LogoFetchError> {
    let client = Client::new();

    let response = client
        .get(url)
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(LogoFetchError::BadStatus(response.status()));
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(LogoFetchError::EmptyBody);
    }

    Ok(bytes.to_vec())
}
