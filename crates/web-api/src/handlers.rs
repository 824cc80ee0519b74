use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tradeboard_core::{
    AccountMode, ExchangeError, Platform, RequestCredential, TradeQuery,
};
use tradeboard_scoring::LeaderboardEntry;

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

#[derive(Deserialize)]
pub struct TokenExchangeRequest {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub account_type: Option<String>,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

// =============================================================================
// Error mapping
// =============================================================================

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
            retry_after: None,
        }),
    )
        .into_response()
}

/// Maps the shared taxonomy onto HTTP statuses. Upstream failures keep
/// their original status and body so the caller sees what the provider
/// said.
fn error_response(err: ExchangeError) -> Response {
    match err {
        ExchangeError::Upstream { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, body).into_response()
        }
        ExchangeError::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody {
                error: "upstream rate limited".to_string(),
                retry_after: Some(retry_after_secs),
            }),
        )
            .into_response(),
        ExchangeError::MissingCredential { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: err.to_string(),
                retry_after: None,
            }),
        )
            .into_response(),
        ExchangeError::Configuration(_)
        | ExchangeError::UnsupportedPlatform { .. }
        | ExchangeError::UpstreamFormat { .. }
        | ExchangeError::TokenExchange { .. }
        | ExchangeError::Validation(_) => bad_request(err.to_string()),
        ExchangeError::NoRefreshToken => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: err.to_string(),
                retry_after: None,
            }),
        )
            .into_response(),
        ExchangeError::Timeout(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(ErrorBody {
                error: err.to_string(),
                retry_after: None,
            }),
        )
            .into_response(),
        ExchangeError::Network(_) | ExchangeError::Serialization(_) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorBody {
                error: err.to_string(),
                retry_after: None,
            }),
        )
            .into_response(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Checks an api key/secret pair against a platform.
pub async fn validate_credentials(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(req): Json<ValidateRequest>,
) -> Response {
    let platform: Platform = match platform.parse() {
        Ok(p) => p,
        Err(err) => return error_response(err),
    };

    let (Some(api_key), Some(api_secret)) = (req.api_key, req.api_secret) else {
        return bad_request("apiKey and apiSecret are required");
    };
    if api_key.is_empty() || api_secret.is_empty() {
        return bad_request("apiKey and apiSecret must be non-empty");
    }

    match state.gateways.validate(platform, &api_key, &api_secret).await {
        Ok(valid) => Json(ValidateResponse { valid }).into_response(),
        Err(err) => error_response(err),
    }
}

/// Forwards an authenticated call to a platform, passing the upstream
/// status and body through untouched.
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let mut platform = None;
    let mut endpoint = None;
    let mut api_key = None;
    let mut api_secret = None;
    let mut mode = AccountMode::Live;
    let mut passthrough = Vec::new();

    for (key, value) in params {
        match key.as_str() {
            "platform" => platform = Some(value),
            "endpoint" => endpoint = Some(value),
            "apiKey" => api_key = Some(value),
            "apiSecret" => api_secret = Some(value),
            "account_type" => match value.parse() {
                Ok(parsed) => mode = parsed,
                Err(err) => return error_response(err),
            },
            _ => passthrough.push((key, value)),
        }
    }

    let (Some(platform), Some(endpoint)) = (platform, endpoint) else {
        return bad_request("platform and endpoint are required");
    };
    let platform: Platform = match platform.parse() {
        Ok(p) => p,
        Err(err) => return error_response(err),
    };

    let mut query = TradeQuery::for_profile("").with_mode(mode);
    if let (Some(api_key), Some(api_secret)) = (api_key, api_secret) {
        query = query.with_credential(RequestCredential {
            api_key,
            api_secret,
        });
    }

    match state
        .gateways
        .proxy(platform, &endpoint, &passthrough, &query)
        .await
    {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
            (status, response.body).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Exchanges a one-time authorization code for a token pair and returns
/// the provider payload with the derived absolute expiry.
pub async fn token_exchange(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenExchangeRequest>,
) -> Response {
    let (Some(code), Some(redirect_uri), Some(account_type)) =
        (req.code, req.redirect_uri, req.account_type)
    else {
        return bad_request("code, redirect_uri and account_type are required");
    };

    let mode: AccountMode = match account_type.parse() {
        Ok(m) => m,
        Err(err) => return error_response(err),
    };

    match state
        .tokens
        .for_mode(mode)
        .exchange_code(&code, &redirect_uri)
        .await
    {
        Ok(grant) => Json(grant.raw).into_response(),
        Err(err) => error_response(err),
    }
}

/// Returns the current leaderboard, refreshing first when no board has
/// been committed yet.
pub async fn leaderboard(State(state): State<Arc<AppState>>) -> Response {
    let mut entries = state.leaderboard.snapshot().await;
    if entries.is_empty() {
        if let Err(err) = state.leaderboard.refresh().await {
            return error_response(err);
        }
        entries = state.leaderboard.snapshot().await;
    }

    Json(LeaderboardResponse { entries }).into_response()
}

// =============================================================================
// Tests
// =============================================================================
