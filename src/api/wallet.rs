use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::AppError;
use crate::models::{ResolveError, ResolvedPass};
use crate::services::{assets, orchestrator, pass_builder, pkpass, resources};

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    token: Option<String>,
}

/// Download endpoint: resolves the pass by token, runs the generation
/// pipeline and streams back whichever artifact the fallback chain produced.
async fn download_pass(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let token = require_token(query.token)?;

    let resolved = ResolvedPass::find_by_token(&state.pool, &token)
        .await
        .map_err(|e| match e {
            ResolveError::NotFound => AppError::NotFound,
            ResolveError::Incomplete(what) => AppError::IncompleteData(what.to_string()),
            ResolveError::Database(e) => AppError::Database(e),
        })?;

    let signing = &state.config.signing;

    // Best effort: a failed lookup only removes the local strategy.
    let materials = match resources::locate_cached(signing) {
        Ok(materials) => Some(materials),
        Err(e) => {
            tracing::warn!(error = %e, "Signing materials not located");
            None
        }
    };

    let template = materials
        .as_ref()
        .and_then(|m| pkpass::load_template(&m.model_dir));

    let descriptor = pass_builder::build_descriptor(&resolved, signing, template.as_ref());
    let meta = pass_builder::PassMeta::from_resolved(&resolved);
    let bundle = assets::resolve_assets(resolved.business.logo_url.as_deref()).await;

    let artifact =
        orchestrator::produce_artifact(signing, materials.as_ref(), &descriptor, &bundle, &meta)
            .await;

    tracing::info!(
        serial = %descriptor.serial_number,
        strategy = artifact.strategy.as_str(),
        size = artifact.bytes.len(),
        "Pass artifact delivered"
    );

    let filename = artifact.filename(&descriptor.serial_number);

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                artifact.content_type().to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
            (
                HeaderName::from_static("x-pass-signing"),
                artifact.strategy.as_str().to_string(),
            ),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// The token parameter is mandatory; whitespace-only values count as absent.
fn require_token(token: Option<String>) -> Result<String, AppError> {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(AppError::MissingToken)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/wallet/pass", get(download_pass))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_is_rejected() {
        assert!(matches!(require_token(None), Err(AppError::MissingToken)));
    }

    #[test]
    fn test_blank_token_is_rejected() {
        for blank in ["", "   ", "\t"] {
            assert!(
                matches!(
                    require_token(Some(blank.to_string())),
                    Err(AppError::MissingToken)
                ),
                "input {:?}",
                blank
            );
        }
    }

    #[test]
    fn test_token_is_trimmed() {
        assert_eq!(require_token(Some("  tok-1 ".to_string())).unwrap(), "tok-1");
    }
}
