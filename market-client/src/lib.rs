//! # Market Client SDK
//!
//! A typed Rust client for the car-ads marketplace API.

use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;

use market_types::{
    AdDetailsResponse, AdId, AdResponse, CarBrand, CarBrandId, CarModel, Conversation,
    ConvertResponse, CreateAdRequest, CreateBrandRequest, CreateMissingMakeRequest,
    CreateModelRequest, Currency, CurrencyCode, MissingMakeRequest, OpenConversationRequest,
    RateResponse, RegisterUserRequest, RegisterUserResponse, UpdateAdRequest, UpdateAdResponse,
    UserResponse,
};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Marketplace API client.
pub struct MarketClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl MarketClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key sent as a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a user. The returned API key is not retrievable later.
    pub async fn register(
        &self,
        email: &str,
        is_premium: bool,
        region: Option<String>,
    ) -> Result<RegisterUserResponse, ClientError> {
        let req = RegisterUserRequest {
            email: email.to_string(),
            is_premium,
            region,
        };
        self.send(self.request(Method::POST, "/api/users").json(&req))
            .await
    }

    pub async fn me(&self) -> Result<UserResponse, ClientError> {
        self.get("/api/users/me").await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Currencies
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_currencies(&self) -> Result<Vec<Currency>, ClientError> {
        self.get("/api/currencies").await
    }

    /// Effective rates on `as_of` (server's today when `None`).
    pub async fn exchange_rates(
        &self,
        as_of: Option<NaiveDate>,
    ) -> Result<Vec<RateResponse>, ClientError> {
        let mut req = self.request(Method::GET, "/api/exchange-rates");
        if let Some(date) = as_of {
            req = req.query(&[("as_of", date.to_string())]);
        }
        self.send(req).await
    }

    /// Previews the price basket for `amount` in `from`.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: CurrencyCode,
    ) -> Result<ConvertResponse, ClientError> {
        let req = self
            .request(Method::GET, "/api/exchange-rates/convert")
            .query(&[("amount", amount.to_string()), ("from", from.to_string())]);
        self.send(req).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_brand(&self, name: &str) -> Result<CarBrand, ClientError> {
        let req = CreateBrandRequest {
            name: name.to_string(),
        };
        self.post("/api/car-brands", &req).await
    }

    pub async fn list_brands(&self) -> Result<Vec<CarBrand>, ClientError> {
        self.get("/api/car-brands").await
    }

    pub async fn create_model(
        &self,
        brand_id: CarBrandId,
        name: &str,
    ) -> Result<CarModel, ClientError> {
        let req = CreateModelRequest {
            brand_id,
            name: name.to_string(),
        };
        self.post("/api/car-models", &req).await
    }

    pub async fn list_models(
        &self,
        brand_id: Option<CarBrandId>,
    ) -> Result<Vec<CarModel>, ClientError> {
        self.send(self.with_brand(self.request(Method::GET, "/api/car-models"), brand_id))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_ad(&self, req: &CreateAdRequest) -> Result<AdResponse, ClientError> {
        self.post("/api/ads", req).await
    }

    /// Active ads, optionally for one brand.
    pub async fn list_ads(&self, brand_id: Option<CarBrandId>) -> Result<Vec<AdResponse>, ClientError> {
        self.send(self.with_brand(self.request(Method::GET, "/api/ads"), brand_id))
            .await
    }

    pub async fn get_ad(&self, id: AdId) -> Result<AdDetailsResponse, ClientError> {
        self.get(&format!("/api/ads/{}", id)).await
    }

    /// Edits an ad. A refused edit still succeeds, with `detail` set.
    pub async fn update_ad(
        &self,
        id: AdId,
        changes: &UpdateAdRequest,
    ) -> Result<UpdateAdResponse, ClientError> {
        let req = self
            .request(Method::PATCH, &format!("/api/ads/{}", id))
            .json(changes);
        self.send(req).await
    }

    pub async fn deactivate_ad(&self, id: AdId) -> Result<AdResponse, ClientError> {
        self.send(self.request(Method::DELETE, &format!("/api/ads/{}", id)))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversations and missing makes
    // ─────────────────────────────────────────────────────────────────────────

    /// Opens a conversation with the seller of `ad_id`.
    pub async fn open_conversation(&self, ad_id: AdId) -> Result<Conversation, ClientError> {
        self.post("/api/conversations", &OpenConversationRequest { ad_id })
            .await
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.get("/api/conversations").await
    }

    pub async fn request_missing_make(
        &self,
        car_make: &str,
    ) -> Result<MissingMakeRequest, ClientError> {
        let req = CreateMissingMakeRequest {
            car_make: car_make.to_string(),
        };
        self.post("/api/missing-car-make-requests", &req).await
    }

    pub async fn list_missing_make_requests(&self) -> Result<Vec<MissingMakeRequest>, ClientError> {
        self.get("/api/missing-car-make-requests").await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────────

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn with_brand(&self, req: RequestBuilder, brand_id: Option<CarBrandId>) -> RequestBuilder {
        match brand_id {
            Some(id) => req.query(&[("brand_id", id.to_string())]),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
