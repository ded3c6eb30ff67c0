use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    pub signing: SigningConfig,
}

/// Everything the signing pipeline needs, resolved once at startup so the
/// components never read ambient environment state themselves.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Global toggle; when off the local strategy is skipped entirely.
    pub signing_enabled: bool,

    // Remote signing service
    pub remote_sign_url: Option<String>,
    pub remote_sign_token: Option<Secret<String>>,

    // Signing material locations
    pub wallet_assets_dir: Option<String>,
    pub pass_model_dir: Option<String>,
    pub wwdr_cert_path: Option<String>,
    pub signer_cert_path: Option<String>,
    pub signer_key_path: Option<String>,

    // Inline signing material (base64), bypasses filesystem checks
    pub signer_cert_base64: Option<Secret<String>>,
    pub signer_key_base64: Option<Secret<String>>,
    pub signer_key_password: Option<Secret<String>>,

    // Pass identity
    pub pass_type_identifier: String,
    pub team_identifier: String,
    pub organization_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            signing: SigningConfig {
                signing_enabled: config.get("signing_enabled").unwrap_or(true),

                remote_sign_url: config.get("remote_sign_url").ok(),
                remote_sign_token: config
                    .get::<String>("remote_sign_token")
                    .ok()
                    .map(Secret::new),

                wallet_assets_dir: config.get("wallet_assets_dir").ok(),
                pass_model_dir: config.get("pass_model_dir").ok(),
                wwdr_cert_path: config.get("wwdr_cert_path").ok(),
                signer_cert_path: config.get("signer_cert_path").ok(),
                signer_key_path: config.get("signer_key_path").ok(),

                signer_cert_base64: config
                    .get::<String>("signer_cert_base64")
                    .ok()
                    .map(Secret::new),
                signer_key_base64: config
                    .get::<String>("signer_key_base64")
                    .ok()
                    .map(Secret::new),
                signer_key_password: config
                    .get::<String>("signer_key_password")
                    .ok()
                    .map(Secret::new),

                pass_type_identifier: config
                    .get("pass_type_identifier")
                    .unwrap_or_else(|_| "pass.com.stampcard.loyalty".to_string()),
                team_identifier: config
                    .get("team_identifier")
                    .unwrap_or_else(|_| "STAMPCARD1".to_string()),
                organization_name: config
                    .get("organization_name")
                    .unwrap_or_else(|_| "Stampcard".to_string()),
            },
        })
    }
}

impl SigningConfig {
    /// A signing configuration with every optional knob unset.
    pub fn disabled() -> Self {
        Self {
            signing_enabled: false,
            remote_sign_url: None,
            remote_sign_token: None,
            wallet_assets_dir: None,
            pass_model_dir: None,
            wwdr_cert_path: None,
            signer_cert_path: None,
            signer_key_path: None,
            signer_cert_base64: None,
            signer_key_base64: None,
            signer_key_password: None,
            pass_type_identifier: "pass.com.stampcard.loyalty".to_string(),
            team_identifier: "STAMPCARD1".to_string(),
            organization_name: "Stampcard".to_string(),
        }
    }
}
