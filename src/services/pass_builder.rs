use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SigningConfig;
use crate::models::ResolvedPass;

// Template defaults, used when neither the business nor a pass model
// template supplies a usable value.
pub const DEFAULT_BACKGROUND_COLOR: &str = "rgb(76,124,176)";
pub const DEFAULT_FOREGROUND_COLOR: &str = "rgb(255,255,255)";
pub const DEFAULT_LABEL_COLOR: &str = "rgb(232,224,208)";

const DEFAULT_CARD_DESCRIPTION: &str = "Tarjeta de sellos digital";
const FALLBACK_CARD_DESCRIPTION: &str = "Tarjeta de fidelidad";
const FALLBACK_REWARD: &str = "Recompensa de fidelidad";
const USAGE_INSTRUCTIONS: &str =
    "Presenta este pase en el comercio para acumular sellos y canjear tu premio.";

const DEFAULT_BARCODE_FORMAT: &str = "PKBarcodeFormatQR";
const DEFAULT_MESSAGE_ENCODING: &str = "iso-8859-1";

/// Normalized, signer-agnostic pass representation. Serializes directly as
/// the `pass.json` payload of a .pkpass container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassDescriptor {
    pub format_version: u32,
    pub pass_type_identifier: String,
    pub serial_number: String,
    pub team_identifier: String,
    pub organization_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_text: Option<String>,
    pub background_color: String,
    pub foreground_color: String,
    pub label_color: String,
    pub barcode: Barcode,
    pub barcodes: Vec<Barcode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevant_date: Option<DateTime<Utc>>,
    pub store_card: FieldGroups,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Barcode {
    pub format: String,
    pub message: String,
    pub message_encoding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldGroups {
    pub primary_fields: Vec<PassField>,
    pub secondary_fields: Vec<PassField>,
    pub auxiliary_fields: Vec<PassField>,
    pub back_fields: Vec<PassField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassField {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: String,
}

impl PassField {
    fn new(key: &str, label: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            label: Some(label.to_string()),
            value: value.into(),
        }
    }
}

/// Optional `pass.json` template from the pass model directory. Only the
/// pieces the builder honors are deserialized; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassTemplate {
    #[serde(default)]
    pub barcode: Option<TemplateBarcode>,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    pub label_color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBarcode {
    pub format: Option<String>,
    pub message: Option<String>,
    pub message_encoding: Option<String>,
}

/// Metadata shipped alongside the descriptor to the remote signer and into
/// the unsigned fallback document.
#[derive(Debug, Clone, Serialize)]
pub struct PassMeta {
    pub serial_number: Uuid,
    pub business_id: Uuid,
    pub business_name: String,
    pub reward: String,
    pub stamps: i32,
    pub stamps_required: i32,
    pub promotion_id: Option<Uuid>,
    pub promotion_name: Option<String>,
    pub revoked: bool,
}

impl PassMeta {
    pub fn from_resolved(resolved: &ResolvedPass) -> Self {
        Self {
            serial_number: resolved.pass.id,
            business_id: resolved.business.id,
            business_name: resolved.business.name.clone(),
            reward: resolve_reward(resolved),
            stamps: resolved.loyalty.stamps,
            stamps_required: resolved.loyalty.stamps_required,
            promotion_id: resolved.promotion.as_ref().map(|p| p.id),
            promotion_name: resolved.promotion.as_ref().map(|p| p.name.clone()),
            revoked: resolved.pass.is_revoked,
        }
    }
}

/// Builds the descriptor from the resolved records. Pure and deterministic;
/// the template (when the pass model directory has one) only contributes
/// barcode metadata and appearance defaults.
pub fn build_descriptor(
    resolved: &ResolvedPass,
    config: &SigningConfig,
    template: Option<&PassTemplate>,
) -> PassDescriptor {
    let template_default = |pick: fn(&PassTemplate) -> Option<&String>, built_in: &str| -> String {
        template
            .and_then(pick)
            .cloned()
            .unwrap_or_else(|| built_in.to_string())
    };

    let background_default =
        template_default(|t| t.background_color.as_ref(), DEFAULT_BACKGROUND_COLOR);
    let foreground_default =
        template_default(|t| t.foreground_color.as_ref(), DEFAULT_FOREGROUND_COLOR);
    let label_default = template_default(|t| t.label_color.as_ref(), DEFAULT_LABEL_COLOR);

    let business = &resolved.business;
    let reward = resolve_reward(resolved);
    let progress = progress_text(resolved.loyalty.stamps, resolved.loyalty.stamps_required);
    let barcode = build_barcode(&resolved.pass.token, template);
    let (expiration_date, relevant_date) = resolve_dates(resolved);

    let mut auxiliary_fields = Vec::new();
    if let Some(promotion) = &resolved.promotion {
        auxiliary_fields.push(PassField::new("promotion", "Promoción", promotion.name.clone()));
    }

    PassDescriptor {
        format_version: 1,
        pass_type_identifier: config.pass_type_identifier.clone(),
        serial_number: resolved.pass.id.to_string(),
        team_identifier: config.team_identifier.clone(),
        organization_name: config.organization_name.clone(),
        description: resolve_card_description(resolved, template),
        logo_text: Some(resolve_card_title(resolved)),
        background_color: resolve_color(business.background_color.as_deref(), &background_default),
        foreground_color: resolve_color(business.text_color.as_deref(), &foreground_default),
        label_color: resolve_color(business.secondary_color.as_deref(), &label_default),
        barcode: barcode.clone(),
        barcodes: vec![barcode],
        expiration_date,
        relevant_date,
        store_card: FieldGroups {
            primary_fields: vec![PassField::new("stamps", "Sellos", progress.clone())],
            secondary_fields: vec![PassField::new("reward", "Premio", reward.clone())],
            auxiliary_fields,
            back_fields: vec![
                PassField::new("instructions", "Cómo usar", USAGE_INSTRUCTIONS),
                PassField::new("progress", "Progreso", progress),
                PassField::new("reward_detail", "Premio", reward),
            ],
        },
    }
}

/// Card title: business override, then settings override, then the name.
pub fn resolve_card_title(resolved: &ResolvedPass) -> String {
    let business = &resolved.business;
    non_empty(business.card_title.as_deref())
        .or_else(|| non_empty(business.settings.card_title.as_deref()))
        .unwrap_or(&business.name)
        .to_string()
}

/// Card description: business override → settings override → promotion
/// reward description → built-in default. The final fallback covers the
/// degenerate case of an all-whitespace built-in.
pub fn resolve_card_description(
    resolved: &ResolvedPass,
    template: Option<&PassTemplate>,
) -> String {
    let business = &resolved.business;
    non_empty(business.card_description.as_deref())
        .or_else(|| non_empty(business.settings.card_description.as_deref()))
        .or_else(|| {
            resolved
                .promotion
                .as_ref()
                .and_then(|p| non_empty(p.reward.as_deref()))
        })
        .or_else(|| template.and_then(|t| non_empty(t.description.as_deref())))
        .or_else(|| non_empty(Some(DEFAULT_CARD_DESCRIPTION)))
        .unwrap_or(FALLBACK_CARD_DESCRIPTION)
        .to_string()
}

/// Reward text is never empty: promotion → loyalty card → fallback.
pub fn resolve_reward(resolved: &ResolvedPass) -> String {
    resolved
        .promotion
        .as_ref()
        .and_then(|p| non_empty(p.reward.as_deref()))
        .or_else(|| non_empty(resolved.loyalty.reward.as_deref()))
        .unwrap_or(FALLBACK_REWARD)
        .to_string()
}

/// Accepts 6-digit hex, 3-digit hex (expanded) or an existing rgb()/rgba()
/// literal; anything else yields the supplied default. Hex is normalized to
/// `rgb(r,g,b)`; a well-formed literal passes through unchanged.
pub fn resolve_color(input: Option<&str>, default: &str) -> String {
    let Some(raw) = non_empty(input) else {
        return default.to_string();
    };
    let raw = raw.trim();

    if raw.starts_with("rgb(") || raw.starts_with("rgba(") {
        if is_rgb_literal(raw) {
            return raw.to_string();
        }
        return default.to_string();
    }

    match hex_to_rgb(raw) {
        Some(rgb) => rgb,
        None => default.to_string(),
    }
}

/// Shape check for `rgb(r,g,b)` / `rgba(r,g,b,a)`: closing paren, right
/// arity, channels in 0-255 and a numeric alpha.
fn is_rgb_literal(raw: &str) -> bool {
    let (args, arity) = if let Some(rest) = raw.strip_prefix("rgba(") {
        (rest, 4)
    } else if let Some(rest) = raw.strip_prefix("rgb(") {
        (rest, 3)
    } else {
        return false;
    };

    let Some(args) = args.strip_suffix(')') else {
        return false;
    };

    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != arity {
        return false;
    }

    let channels_ok = parts[..3].iter().all(|p| p.parse::<u8>().is_ok());
    let alpha_ok = arity == 3 || parts[3].parse::<f32>().is_ok();

    channels_ok && alpha_ok
}

fn hex_to_rgb(raw: &str) -> Option<String> {
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let expanded = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => return None,
    };

    let r = u8::from_str_radix(&expanded[0..2], 16).ok()?;
    let g = u8::from_str_radix(&expanded[2..4], 16).ok()?;
    let b = u8::from_str_radix(&expanded[4..6], 16).ok()?;

    Some(format!("rgb({},{},{})", r, g, b))
}

/// `current/required` with current clamped into [0, required]; when no
/// threshold is set the raw count is shown without a denominator.
pub fn progress_text(current: i32, required: i32) -> String {
    if required > 0 {
        let clamped = current.clamp(0, required);
        format!("{}/{}", clamped, required)
    } else {
        current.to_string()
    }
}

/// Exactly one barcode whose message is always the pass token; a template
/// may only contribute format and encoding metadata.
fn build_barcode(token: &str, template: Option<&PassTemplate>) -> Barcode {
    let template_barcode = template.and_then(|t| t.barcode.as_ref());

    Barcode {
        format: template_barcode
            .and_then(|b| b.format.clone())
            .unwrap_or_else(|| DEFAULT_BARCODE_FORMAT.to_string()),
        message: token.to_string(),
        message_encoding: template_barcode
            .and_then(|b| b.message_encoding.clone())
            .unwrap_or_else(|| DEFAULT_MESSAGE_ENCODING.to_string()),
        alt_text: None,
    }
}

fn resolve_dates(resolved: &ResolvedPass) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match &resolved.promotion {
        Some(promotion) => match (promotion.ends_at, promotion.starts_at) {
            (Some(end), _) => (Some(end), Some(end)),
            (None, Some(start)) => (None, Some(start)),
            (None, None) => (None, None),
        },
        None => (None, None),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
