//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use market_types::{
    AdDetailsResponse, AdFilter, AdId, AdResponse, AppError, BrandQuery, ConvertQuery,
    CreateAdRequest, CreateBrandRequest, CreateMissingMakeRequest, CreateModelRequest,
    EditOutcome, MarketRepository, OpenConversationRequest, Principal, RatesQuery, RegisterUserRequest, RegisterUserResponse, UpdateAdRequest,
    UpdateAdResponse, UserResponse,
};

use crate::MarketService;

/// Detail attached to an update refused by the edit cap.
pub const EDIT_LIMIT_DETAIL: &str = "edit limit exceeded";

/// Application state shared across handlers.
pub struct AppState<R: MarketRepository> {
    pub service: MarketService<R>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Store operation timed out".to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_ad_id(id: &str) -> Result<AdId, ApiError> {
    id.parse()
        .map_err(|_| AppError::BadRequest("Invalid ad ID".into()).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Register a user. The only `/api` route open to anonymous callers.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn register_user<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, api_key) = state.service.register_user(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterUserResponse {
            user: user.into(),
            api_key,
        }),
    ))
}

/// Profile of the authenticated caller.
#[tracing::instrument(skip(state, principal), fields(user_id = %principal.user_id))]
pub async fn me<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.service.get_user(principal.user_id).await?;
    Ok(Json(UserResponse::from(user)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Currencies
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn list_currencies<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let currencies = state.service.list_currencies().await?;
    Ok(Json(currencies))
}

/// Effective rate of every currency.
#[tracing::instrument(skip(state))]
pub async fn exchange_rates<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<RatesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rates = state.service.current_rates(query.as_of).await?;
    Ok(Json(rates))
}

/// Preview of the price basket an ad would get.
#[tracing::instrument(skip(state))]
pub async fn convert<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<ConvertQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let preview = state.service.preview_conversion(query).await?;
    Ok(Json(preview))
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn list_brands<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let brands = state.service.list_brands().await?;
    Ok(Json(brands))
}

#[tracing::instrument(skip(state), fields(name = %req.name))]
pub async fn create_brand<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateBrandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let brand = state.service.create_brand(req.name).await?;
    Ok((StatusCode::CREATED, Json(brand)))
}

#[tracing::instrument(skip(state))]
pub async fn list_models<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<BrandQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let models = state.service.list_models(query.brand_id).await?;
    Ok(Json(models))
}

#[tracing::instrument(skip(state), fields(brand_id = %req.brand_id, name = %req.name))]
pub async fn create_model<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateModelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let model = state.service.create_model(req.brand_id, req.name).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Ads
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, principal, req), fields(seller = %principal.user_id))]
pub async fn create_ad<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateAdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ad = state.service.create_ad(req.into(), &principal).await?;
    Ok((StatusCode::CREATED, Json(AdResponse::from(ad))))
}

/// Active ads, optionally for one brand.
#[tracing::instrument(skip(state))]
pub async fn list_ads<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<BrandQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ads = state
        .service
        .list_ads(AdFilter {
            brand_id: query.brand_id,
        })
        .await?;
    let response: Vec<AdResponse> = ads.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// Get an ad. Views by anyone but the seller are counted.
#[tracing::instrument(skip(state, principal), fields(ad_id = %id))]
pub async fn get_ad<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ad_id = parse_ad_id(&id)?;
    let details = state.service.retrieve_ad(ad_id, Some(&principal)).await?;

    if !details.ad.is_seller(principal.user_id) {
        if let Err(e) = state
            .service
            .record_view(ad_id, Some(principal.user_id))
            .await
        {
            tracing::warn!(error = %e, "failed to record ad view");
        }
    }

    Ok(Json(AdDetailsResponse::from(details)))
}

/// Edit an ad. Refusal by the edit cap is a 200 carrying `detail`.
#[tracing::instrument(skip(state, principal, req), fields(ad_id = %id))]
pub async fn update_ad<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ad_id = parse_ad_id(&id)?;
    let outcome = state
        .service
        .update_ad(ad_id, &principal, req.into())
        .await?;

    let response = match outcome {
        EditOutcome::Applied(ad) => UpdateAdResponse {
            detail: None,
            ad: ad.into(),
        },
        EditOutcome::LimitExceeded(ad) => UpdateAdResponse {
            detail: Some(EDIT_LIMIT_DETAIL.to_string()),
            ad: ad.into(),
        },
    };
    Ok(Json(response))
}

/// Withdraw an ad.
#[tracing::instrument(skip(state, principal), fields(ad_id = %id))]
pub async fn deactivate_ad<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ad_id = parse_ad_id(&id)?;
    let ad = state.service.deactivate_ad(ad_id, &principal).await?;
    Ok(Json(AdResponse::from(ad)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversations
// ─────────────────────────────────────────────────────────────────────────────

/// Open a conversation with the seller of an ad.
#[tracing::instrument(skip(state, principal, req), fields(buyer = %principal.user_id, ad_id = %req.ad_id))]
pub async fn open_conversation<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<OpenConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state
        .service
        .open_conversation(req.ad_id, &principal)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

#[tracing::instrument(skip(state, principal), fields(user_id = %principal.user_id))]
pub async fn list_conversations<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.service.list_conversations(&principal).await?;
    Ok(Json(conversations))
}

// ─────────────────────────────────────────────────────────────────────────────
// Missing car makes
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, principal, req), fields(seller = %principal.user_id))]
pub async fn request_missing_make<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateMissingMakeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .service
        .request_missing_make(&principal, req.car_make)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[tracing::instrument(skip(state, principal), fields(seller = %principal.user_id))]
pub async fn list_missing_make_requests<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state
        .service
        .list_missing_make_requests(&principal)
        .await?;
    Ok(Json(requests))
}
