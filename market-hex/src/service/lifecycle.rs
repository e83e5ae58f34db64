//! Users, catalog and the ad lifecycle.

use exchange_rates::round_price;

use market_types::{
    Ad, AdChanges, AdDetails, AdDraft, AdEdit, AdFilter, AdId, AdView, AppError, CarBrand,
    CarBrandId, CarModel, CarModelId, DomainError, EDIT_ATTEMPT_CAP, EditOutcome,
    MarketRepository, NewAd, Principal, RegisterUserRequest, User, UserId,
};

use super::MarketService;
use super::ledger::today;

impl<R: MarketRepository> MarketService<R> {
    // ─────────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────────

    /// Registers a user and issues their API key.
    ///
    /// The raw key is returned once and only its hash is stored.
    #[tracing::instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register_user(&self, req: RegisterUserRequest) -> Result<(User, String), AppError> {
        let user = User::new(req.email, req.is_premium, req.region)?;
        let (user, raw_key) = self.bounded(self.repo.create_user(user)).await?;
        tracing::info!(user_id = %user.id, "registered user");
        Ok((user, raw_key))
    }

    /// Gets a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.bounded(self.repo.get_user(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", id)))
    }

    /// Resolves an API key hash to its caller. `None` for unknown or revoked keys.
    pub async fn authenticate(&self, key_hash: &str) -> Result<Option<Principal>, AppError> {
        let user = self
            .bounded(self.repo.find_user_by_api_key_hash(key_hash))
            .await?;
        Ok(user.as_ref().map(Principal::from))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn create_brand(&self, name: String) -> Result<CarBrand, AppError> {
        let brand = CarBrand::new(name)?;
        self.bounded(self.repo.create_brand(brand)).await
    }

    pub async fn list_brands(&self) -> Result<Vec<CarBrand>, AppError> {
        self.bounded(self.repo.list_brands()).await
    }

    pub async fn create_model(&self, brand_id: CarBrandId, name: String) -> Result<CarModel, AppError> {
        let model = CarModel::new(brand_id, name)?;
        self.bounded(self.repo.create_model(model))
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound(format!("Car brand {}", brand_id)),
                other => other,
            })
    }

    pub async fn list_models(&self, brand_id: Option<CarBrandId>) -> Result<Vec<CarModel>, AppError> {
        self.bounded(self.repo.list_models(brand_id)).await
    }

    async fn require_model(&self, id: CarModelId) -> Result<CarModel, AppError> {
        self.bounded(self.repo.get_model(id))
            .await?
            .ok_or_else(|| DomainError::CarModelNotFound(id).into())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Publishes a new ad.
    ///
    /// The ad text goes through the content filter once; flagged ads are
    /// stored inactive. The price basket is computed from today's rates and
    /// stored in the same transaction as the ad. Conversion failures abort
    /// the whole operation.
    #[tracing::instrument(skip(self, draft), fields(seller = %seller.user_id, currency = %draft.currency))]
    pub async fn create_ad(&self, mut draft: AdDraft, seller: &Principal) -> Result<Ad, AppError> {
        draft.validate()?;
        draft.price = round_price(draft.price);
        self.require_model(draft.car_model_id).await?;

        let flagged = self.filter.is_flagged(&draft.content_text()).await;
        if flagged {
            tracing::info!("ad content flagged, storing inactive");
        }

        let prices = self
            .convert_to_all(draft.price, draft.currency, today())
            .await?;

        let new_ad = NewAd {
            draft,
            seller_id: seller.user_id,
            is_active: !flagged,
        };
        let ad = self.bounded(self.repo.create_ad(new_ad, prices)).await?;
        tracing::info!(ad_id = %ad.id, active = ad.is_active, "created ad");
        Ok(ad)
    }

    /// Edits an ad on behalf of its seller.
    ///
    /// Each successful edit consumes one attempt. Once [`EDIT_ATTEMPT_CAP`]
    /// attempts are used up, the next request deactivates the ad and returns
    /// [`EditOutcome::LimitExceeded`] instead of applying anything. A
    /// deactivated ad is never reactivated by an edit.
    ///
    /// A price or currency change that races another such change fails with
    /// `Conflict` rather than storing a basket for a price the ad no longer
    /// has. The losing edit consumes no attempt.
    #[tracing::instrument(skip(self, changes), fields(ad_id = %id, requester = %requester.user_id))]
    pub async fn update_ad(
        &self,
        id: AdId,
        requester: &Principal,
        mut changes: AdChanges,
    ) -> Result<EditOutcome, AppError> {
        let current = self.get_ad(id).await?;
        if !current.is_seller(requester.user_id) {
            return Err(AppError::Forbidden("Only the seller may edit this ad".into()));
        }

        changes.validate()?;
        changes.price = changes.price.map(round_price);

        let edit = if current.edits_exhausted(EDIT_ATTEMPT_CAP) {
            // The store refuses the edit and deactivates; nothing to price or filter.
            AdEdit {
                changes,
                flagged: false,
                repriced: None,
                priced_against: None,
                cap: EDIT_ATTEMPT_CAP,
            }
        } else {
            if let Some(model) = changes.car_model_id {
                self.require_model(model).await?;
            }

            let edited = current.with_changes(&changes);
            let flagged = self.filter.is_flagged(&edited.content_text()).await;
            let repriced = if changes.touches_price() {
                Some(
                    self.convert_to_all(edited.price, edited.currency, today())
                        .await?,
                )
            } else {
                None
            };

            // The basket is built from this read; the store checks it still holds.
            let priced_against = repriced.as_ref().map(|_| current.price_basis());

            AdEdit {
                changes,
                flagged,
                repriced,
                priced_against,
                cap: EDIT_ATTEMPT_CAP,
            }
        };

        let outcome = self.bounded(self.repo.apply_edit(id, edit)).await?;
        match &outcome {
            EditOutcome::Applied(ad) => {
                tracing::info!(attempts = ad.edit_attempts, active = ad.is_active, "edit applied")
            }
            EditOutcome::LimitExceeded(_) => {
                tracing::info!("edit limit exceeded, ad deactivated")
            }
        }
        Ok(outcome)
    }

    /// Withdraws a listing. Seller-only and idempotent.
    #[tracing::instrument(skip(self), fields(requester = %requester.user_id))]
    pub async fn deactivate_ad(&self, id: AdId, requester: &Principal) -> Result<Ad, AppError> {
        let current = self.get_ad(id).await?;
        if !current.is_seller(requester.user_id) {
            return Err(AppError::Forbidden(
                "Only the seller may deactivate this ad".into(),
            ));
        }
        self.bounded(self.repo.deactivate_ad(id)).await
    }

    /// Gets an ad by ID without statistics.
    pub async fn get_ad(&self, id: AdId) -> Result<Ad, AppError> {
        self.bounded(self.repo.get_ad(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ad {}", id)))
    }

    /// Gets an ad as seen by `viewer`.
    ///
    /// Premium viewers also get statistics. Statistics are best effort: when
    /// they cannot be computed the bare ad is returned and a warning logged.
    #[tracing::instrument(skip(self, viewer), fields(ad_id = %id))]
    pub async fn retrieve_ad(&self, id: AdId, viewer: Option<&Principal>) -> Result<AdDetails, AppError> {
        let ad = self.get_ad(id).await?;

        let statistics = match viewer {
            Some(principal) if principal.is_premium => {
                match self.compute_statistics(&ad, chrono::Utc::now()).await {
                    Ok(bundle) => Some(bundle),
                    Err(e) => {
                        tracing::warn!(error = %e, "statistics unavailable, serving bare ad");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(AdDetails { ad, statistics })
    }

    /// Records a view of `ad_id` by `viewer`.
    pub async fn record_view(&self, ad_id: AdId, viewer: Option<UserId>) -> Result<(), AppError> {
        self.bounded(self.repo.record_view(AdView::now(ad_id, viewer)))
            .await
    }

    /// Active ads, newest first.
    pub async fn list_ads(&self, filter: AdFilter) -> Result<Vec<Ad>, AppError> {
        self.bounded(self.repo.list_ads(filter)).await
    }
}
