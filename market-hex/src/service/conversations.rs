//! Buyer-seller conversations and requests for makes missing from the catalog.

use market_types::{
    AdId, AppError, Conversation, MarketRepository, MissingMakeRequest, Principal,
};

use super::MarketService;

impl<R: MarketRepository> MarketService<R> {
    /// Opens a conversation with the seller of `ad_id`.
    ///
    /// The seller is read from the ad. A buyer gets one conversation per ad;
    /// a second attempt is a `Conflict`.
    #[tracing::instrument(skip(self, buyer), fields(buyer = %buyer.user_id))]
    pub async fn open_conversation(
        &self,
        ad_id: AdId,
        buyer: &Principal,
    ) -> Result<Conversation, AppError> {
        let ad = self.get_ad(ad_id).await?;
        let conversation = Conversation::open(&ad, buyer.user_id)?;
        let conversation = self
            .bounded(self.repo.create_conversation(conversation))
            .await
            .map_err(|e| match e {
                // The ad vanished or changed hands since it was read.
                AppError::NotFound(_) => AppError::NotFound(format!("Ad {}", ad_id)),
                other => other,
            })?;
        tracing::info!(conversation_id = %conversation.id, "opened conversation");
        Ok(conversation)
    }

    /// Conversations the caller takes part in, as buyer or seller.
    pub async fn list_conversations(&self, user: &Principal) -> Result<Vec<Conversation>, AppError> {
        self.bounded(self.repo.list_conversations(user.user_id)).await
    }

    /// Asks for a make to be added to the catalog.
    ///
    /// Makes the catalog already has, compared case-insensitively, are a
    /// `Conflict`.
    #[tracing::instrument(skip(self, seller), fields(seller = %seller.user_id))]
    pub async fn request_missing_make(
        &self,
        seller: &Principal,
        car_make: String,
    ) -> Result<MissingMakeRequest, AppError> {
        let request = MissingMakeRequest::new(car_make, seller.user_id)?;

        let brands = self.bounded(self.repo.list_brands()).await?;
        if let Some(brand) = brands.iter().find(|b| request.is_covered_by(b)) {
            return Err(AppError::Conflict(format!(
                "Car make {} is already in the catalog",
                brand.name
            )));
        }

        let request = self
            .bounded(self.repo.create_missing_make_request(request))
            .await?;
        tracing::info!(car_make = %request.car_make, "recorded missing make request");
        Ok(request)
    }

    /// The caller's own missing-make requests, newest first.
    pub async fn list_missing_make_requests(
        &self,
        seller: &Principal,
    ) -> Result<Vec<MissingMakeRequest>, AppError> {
        self.bounded(self.repo.list_missing_make_requests(seller.user_id))
            .await
    }
}
