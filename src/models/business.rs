use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub card_title: Option<String>,
    pub card_description: Option<String>,
    pub settings: BusinessSettings,
}

/// Per-business settings stored as JSONB. Unknown keys are ignored so the
/// dashboard can grow the blob without breaking pass delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessSettings {
    pub card_title: Option<String>,
    pub card_description: Option<String>,
}

impl BusinessSettings {
    pub fn from_json(value: Option<serde_json::Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}
