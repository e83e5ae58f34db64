//! MarketService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use exchange_rates::{EUR, UAH, USD};
    use rust_decimal::Decimal;

    use market_repo::security::{generate_api_key, hash_api_key};
    use market_types::{
        Ad, AdChanges, AdDraft, AdEdit, AdFilter, AdId, AdRepository, AdView, AdViewRepository,
        AppError, CarBrand, CarBrandId, CarModel, CarModelId, CatalogRepository, Conversation,
        ConversationRepository, Currency, CurrencyCode, CurrencyRepository, EditOutcome,
        ExchangeRate, MissingMakeRequest, NewAd, PriceBasket, Principal, RegisterUserRequest,
        RepoError, User, UserId, UserRepository,
    };

    use crate::{AllowAll, KeywordFilter, MarketService, ServiceConfig};

    /// Simple in-memory repository for testing the service layer.
    ///
    /// Every write holds the relevant lock for its whole duration, which gives
    /// `apply_edit` the same check-and-increment semantics as the SQL adapters.
    #[derive(Default)]
    pub struct MockRepo {
        currencies: Mutex<BTreeMap<CurrencyCode, Currency>>,
        rates: Mutex<Vec<ExchangeRate>>,
        users: Mutex<HashMap<UserId, User>>,
        keys: Mutex<HashMap<String, UserId>>,
        brands: Mutex<HashMap<CarBrandId, CarBrand>>,
        models: Mutex<HashMap<CarModelId, CarModel>>,
        ads: Mutex<HashMap<AdId, Ad>>,
        views: Mutex<Vec<AdView>>,
        conversations: Mutex<Vec<Conversation>>,
        make_requests: Mutex<Vec<MissingMakeRequest>>,
        /// Fails view reads, which only statistics use.
        fail_views: AtomicBool,
        /// Slows down view reads.
        view_delay: Mutex<Option<Duration>>,
        /// Slows down ad listing.
        list_delay: Mutex<Option<Duration>>,
    }

    impl MockRepo {
        pub fn new() -> Self {
            Self::default()
        }
    }

    async fn pause(delay: Option<Duration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    #[async_trait]
    impl CurrencyRepository for MockRepo {
        async fn list_currencies(&self) -> Result<Vec<Currency>, RepoError> {
            Ok(self.currencies.lock().unwrap().values().cloned().collect())
        }

        async fn upsert_currency(&self, currency: Currency) -> Result<Currency, RepoError> {
            self.currencies
                .lock()
                .unwrap()
                .insert(currency.code, currency.clone());
            Ok(currency)
        }

        async fn rates_as_of(&self, as_of: NaiveDate) -> Result<Vec<ExchangeRate>, RepoError> {
            Ok(self
                .rates
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.effective_date <= as_of)
                .cloned()
                .collect())
        }

        async fn record_rate(
            &self,
            currency: CurrencyCode,
            rate: Decimal,
            effective_date: NaiveDate,
        ) -> Result<ExchangeRate, RepoError> {
            let mut rates = self.rates.lock().unwrap();
            let row = ExchangeRate::new(currency, rate, effective_date, rates.len() as i64 + 1);
            rates.push(row.clone());
            Ok(row)
        }
    }

    #[async_trait]
    impl AdRepository for MockRepo {
        async fn create_ad(&self, new: NewAd, prices: PriceBasket) -> Result<Ad, RepoError> {
            if !self
                .models
                .lock()
                .unwrap()
                .contains_key(&new.draft.car_model_id)
            {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let ad = Ad {
                id: AdId::new(),
                title: new.draft.title,
                description: new.draft.description,
                price: new.draft.price,
                currency: new.draft.currency,
                car_model_id: new.draft.car_model_id,
                seller_id: new.seller_id,
                is_active: new.is_active,
                edit_attempts: 0,
                prices,
                created_at: now,
                updated_at: now,
            };
            self.ads.lock().unwrap().insert(ad.id, ad.clone());
            Ok(ad)
        }

        async fn apply_edit(&self, id: AdId, edit: AdEdit) -> Result<EditOutcome, RepoError> {
            let mut ads = self.ads.lock().unwrap();
            let ad = ads.get_mut(&id).ok_or(RepoError::NotFound)?;

            if ad.edit_attempts >= edit.cap {
                ad.is_active = false;
                return Ok(EditOutcome::LimitExceeded(ad.clone()));
            }
            if edit
                .priced_against
                .is_some_and(|basis| basis != ad.price_basis())
            {
                return Err(RepoError::Conflict("price changed".into()));
            }

            let mut next = ad.with_changes(&edit.changes);
            next.edit_attempts += 1;
            next.is_active = ad.is_active && !edit.flagged;
            if let Some(prices) = edit.repriced {
                next.prices = prices;
            }
            next.updated_at = Utc::now();
            *ad = next;
            Ok(EditOutcome::Applied(ad.clone()))
        }

        async fn deactivate_ad(&self, id: AdId) -> Result<Ad, RepoError> {
            let mut ads = self.ads.lock().unwrap();
            let ad = ads.get_mut(&id).ok_or(RepoError::NotFound)?;
            ad.is_active = false;
            Ok(ad.clone())
        }

        async fn get_ad(&self, id: AdId) -> Result<Option<Ad>, RepoError> {
            Ok(self.ads.lock().unwrap().get(&id).cloned())
        }

        async fn list_ads(&self, filter: AdFilter) -> Result<Vec<Ad>, RepoError> {
            let delay = *self.list_delay.lock().unwrap();
            pause(delay).await;

            let models = self.models.lock().unwrap().clone();
            let mut ads: Vec<Ad> = self
                .ads
                .lock()
                .unwrap()
                .values()
                .filter(|ad| ad.is_active)
                .filter(|ad| match filter.brand_id {
                    Some(brand) => models
                        .get(&ad.car_model_id)
                        .is_some_and(|m| m.brand_id == brand),
                    None => true,
                })
                .cloned()
                .collect();
            ads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(ads)
        }

        async fn active_prices(
            &self,
            currency: CurrencyCode,
            region: Option<&str>,
        ) -> Result<Vec<Decimal>, RepoError> {
            let users = self.users.lock().unwrap().clone();
            Ok(self
                .ads
                .lock()
                .unwrap()
                .values()
                .filter(|ad| ad.is_active)
                .filter(|ad| match region {
                    Some(region) => users
                        .get(&ad.seller_id)
                        .and_then(|u| u.region.as_deref())
                        == Some(region),
                    None => true,
                })
                .filter_map(|ad| {
                    if ad.currency == currency {
                        Some(ad.price)
                    } else {
                        ad.prices.get(&currency).copied()
                    }
                })
                .collect())
        }
    }

    #[async_trait]
    impl AdViewRepository for MockRepo {
        async fn record_view(&self, view: AdView) -> Result<(), RepoError> {
            if !self.ads.lock().unwrap().contains_key(&view.ad_id) {
                return Err(RepoError::NotFound);
            }
            self.views.lock().unwrap().push(view);
            Ok(())
        }

        async fn view_timestamps(&self, ad_id: AdId) -> Result<Vec<DateTime<Utc>>, RepoError> {
            let delay = *self.view_delay.lock().unwrap();
            pause(delay).await;

            if self.fail_views.load(Ordering::SeqCst) {
                return Err(RepoError::Database("views table unavailable".into()));
            }
            Ok(self
                .views
                .lock()
                .unwrap()
                .iter()
                .filter(|v| v.ad_id == ad_id)
                .map(|v| v.viewed_at)
                .collect())
        }
    }

    #[async_trait]
    impl UserRepository for MockRepo {
        async fn create_user(&self, user: User) -> Result<(User, String), RepoError> {
            let mut users = self.users.lock().unwrap();
            if users.values().any(|u| u.email == user.email) {
                return Err(RepoError::Conflict("email already registered".into()));
            }
            let raw_key = generate_api_key();
            self.keys
                .lock()
                .unwrap()
                .insert(hash_api_key(&raw_key), user.id);
            users.insert(user.id, user.clone());
            Ok((user, raw_key))
        }

        async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn find_user_by_api_key_hash(&self, key_hash: &str) -> Result<Option<User>, RepoError> {
            let user_id = self.keys.lock().unwrap().get(key_hash).copied();
            Ok(user_id.and_then(|id| self.users.lock().unwrap().get(&id).cloned()))
        }
    }

    #[async_trait]
    impl CatalogRepository for MockRepo {
        async fn create_brand(&self, brand: CarBrand) -> Result<CarBrand, RepoError> {
            let mut brands = self.brands.lock().unwrap();
            if brands.values().any(|b| b.name == brand.name) {
                return Err(RepoError::Conflict(format!("brand {} exists", brand.name)));
            }
            brands.insert(brand.id, brand.clone());
            Ok(brand)
        }

        async fn list_brands(&self) -> Result<Vec<CarBrand>, RepoError> {
            Ok(self.brands.lock().unwrap().values().cloned().collect())
        }

        async fn create_model(&self, model: CarModel) -> Result<CarModel, RepoError> {
            if !self.brands.lock().unwrap().contains_key(&model.brand_id) {
                return Err(RepoError::NotFound);
            }
            self.models
                .lock()
                .unwrap()
                .insert(model.id, model.clone());
            Ok(model)
        }

        async fn list_models(&self, brand_id: Option<CarBrandId>) -> Result<Vec<CarModel>, RepoError> {
            Ok(self
                .models
                .lock()
                .unwrap()
                .values()
                .filter(|m| brand_id.is_none_or(|b| m.brand_id == b))
                .cloned()
                .collect())
        }

        async fn get_model(&self, id: CarModelId) -> Result<Option<CarModel>, RepoError> {
            Ok(self.models.lock().unwrap().get(&id).cloned())
        }

        async fn create_missing_make_request(
            &self,
            request: MissingMakeRequest,
        ) -> Result<MissingMakeRequest, RepoError> {
            if !self.users.lock().unwrap().contains_key(&request.seller_id) {
                return Err(RepoError::NotFound);
            }
            self.make_requests.lock().unwrap().push(request.clone());
            Ok(request)
        }

        async fn list_missing_make_requests(
            &self,
            seller_id: UserId,
        ) -> Result<Vec<MissingMakeRequest>, RepoError> {
            let mut requests: Vec<_> = self
                .make_requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.seller_id == seller_id)
                .cloned()
                .collect();
            requests.reverse();
            Ok(requests)
        }
    }

    #[async_trait]
    impl ConversationRepository for MockRepo {
        async fn create_conversation(
            &self,
            conversation: Conversation,
        ) -> Result<Conversation, RepoError> {
            let owned = self
                .ads
                .lock()
                .unwrap()
                .get(&conversation.ad_id)
                .is_some_and(|ad| ad.seller_id == conversation.seller_id);
            if !owned {
                return Err(RepoError::NotFound);
            }
            let mut conversations = self.conversations.lock().unwrap();
            if conversations
                .iter()
                .any(|c| c.ad_id == conversation.ad_id && c.buyer_id == conversation.buyer_id)
            {
                return Err(RepoError::Conflict("conversation exists".into()));
            }
            conversations.push(conversation.clone());
            Ok(conversation)
        }

        async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, RepoError> {
            let mut conversations: Vec<_> = self
                .conversations
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.involves(user))
                .cloned()
                .collect();
            conversations.reverse();
            Ok(conversations)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Fixtures
    // ─────────────────────────────────────────────────────────────────────────────

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn rates_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    struct Fixture {
        service: MarketService<MockRepo>,
        seller: Principal,
        model: CarModelId,
    }

    async fn setup() -> Fixture {
        setup_with(ServiceConfig::default()).await
    }

    async fn setup_with(config: ServiceConfig) -> Fixture {
        let service = MarketService::with_config(
            MockRepo::new(),
            Arc::new(KeywordFilter::from_csv("scam,stolen")),
            config,
        );
        assert!(service.seed_reference_rates(rates_day()).await.unwrap());

        let seller = register(&service, "seller@example.com", false, Some("Kyiv")).await;
        let brand = service.create_brand("Toyota".into()).await.unwrap();
        let model = service
            .create_model(brand.id, "Corolla".into())
            .await
            .unwrap();

        Fixture {
            service,
            seller,
            model: model.id,
        }
    }

    async fn register(
        service: &MarketService<MockRepo>,
        email: &str,
        is_premium: bool,
        region: Option<&str>,
    ) -> Principal {
        let (user, _) = service
            .register_user(RegisterUserRequest {
                email: email.into(),
                is_premium,
                region: region.map(String::from),
            })
            .await
            .unwrap();
        Principal::from(&user)
    }

    fn draft(f: &Fixture, price: &str, currency: CurrencyCode) -> AdDraft {
        AdDraft {
            title: "Toyota Corolla 2018".into(),
            description: "Single owner".into(),
            price: d(price),
            currency,
            car_model_id: f.model,
        }
    }

    fn retitle(title: &str) -> AdChanges {
        AdChanges {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_seed_is_skipped_when_currencies_exist() {
        let f = setup().await;
        assert!(!f.service.seed_reference_rates(rates_day()).await.unwrap());
        assert_eq!(f.service.list_currencies().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_current_rates_reports_currency_without_rate() {
        let f = setup().await;
        let gbp = CurrencyCode::new("GBP").unwrap();
        f.service
            .upsert_currency(Currency::new(gbp, "Pound Sterling"))
            .await
            .unwrap();

        let rates = f.service.current_rates(Some(rates_day())).await.unwrap();
        assert_eq!(rates.len(), 4);
        let gbp_row = rates.iter().find(|r| r.currency == gbp).unwrap();
        assert_eq!(gbp_row.rate, None);
        let uah_row = rates.iter().find(|r| r.currency == UAH).unwrap();
        assert_eq!(uah_row.rate, Some(d("37.0")));
        assert_eq!(uah_row.effective_date, Some(rates_day()));
    }

    #[tokio::test]
    async fn test_rate_of_before_first_rate_is_bad_request() {
        let f = setup().await;
        let before = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let err = f.service.rate_of(USD, before).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_convert_round_trip() {
        let f = setup().await;
        let day = rates_day();
        let uah = f.service.convert(d("123.45"), EUR, UAH, day).await.unwrap();
        let back = f.service.convert(uah, UAH, EUR, day).await.unwrap();
        assert!((back - d("123.45")).abs() <= d("0.01"));
    }

    #[tokio::test]
    async fn test_record_rate_rejects_non_positive() {
        let f = setup().await;
        let err = f
            .service
            .record_rate(EUR, Decimal::ZERO, rates_day())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ad creation
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_ad_prices_basket() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();

        assert!(ad.is_active);
        assert_eq!(ad.edit_attempts, 0);
        assert_eq!(ad.seller_id, f.seller.user_id);
        assert_eq!(ad.price.to_string(), "1000.00");
        assert_eq!(ad.prices.len(), 2);
        assert_eq!(ad.prices[&EUR].to_string(), "900.00");
        assert_eq!(ad.prices[&UAH].to_string(), "37000.00");
    }

    #[tokio::test]
    async fn test_create_flagged_ad_is_inactive() {
        let f = setup().await;
        let mut flagged = draft(&f, "500", EUR);
        flagged.description = "Definitely not STOLEN".into();

        let ad = f.service.create_ad(flagged, &f.seller).await.unwrap();
        assert!(!ad.is_active);
        assert_eq!(ad.prices.len(), 2);
    }

    #[tokio::test]
    async fn test_create_ad_unknown_model() {
        let f = setup().await;
        let mut orphan = draft(&f, "500", EUR);
        orphan.car_model_id = CarModelId::new();

        let err = f.service.create_ad(orphan, &f.seller).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_ad_rejects_bad_price() {
        let f = setup().await;
        for price in ["0", "-5", "10.005"] {
            let err = f
                .service
                .create_ad(draft(&f, price, EUR), &f.seller)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "price {price}");
        }
    }

    #[tokio::test]
    async fn test_create_ad_fails_when_any_target_has_no_rate() {
        let f = setup().await;
        f.service
            .upsert_currency(Currency::new(CurrencyCode::new("GBP").unwrap(), "Pound Sterling"))
            .await
            .unwrap();

        let err = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(f.service.list_ads(AdFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_ad_unknown_currency() {
        let f = setup().await;
        let chf = CurrencyCode::new("CHF").unwrap();
        let err = f
            .service
            .create_ad(draft(&f, "1000", chf), &f.seller)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Editing
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_edit_cap_boundary() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();

        for attempt in 1..=3u32 {
            let outcome = f
                .service
                .update_ad(ad.id, &f.seller, retitle(&format!("Corolla v{attempt}")))
                .await
                .unwrap();
            let EditOutcome::Applied(edited) = outcome else {
                panic!("edit {attempt} should apply");
            };
            assert_eq!(edited.edit_attempts, attempt);
            assert!(edited.is_active);
        }

        let outcome = f
            .service
            .update_ad(ad.id, &f.seller, retitle("Corolla v4"))
            .await
            .unwrap();
        let EditOutcome::LimitExceeded(locked) = outcome else {
            panic!("fourth edit should be refused");
        };
        assert!(!locked.is_active);
        assert_eq!(locked.edit_attempts, 3);
        assert_eq!(locked.title, "Corolla v3");

        let again = f
            .service
            .update_ad(ad.id, &f.seller, retitle("Corolla v5"))
            .await
            .unwrap();
        assert!(matches!(again, EditOutcome::LimitExceeded(ref a) if !a.is_active));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_edits_at_last_attempt() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        for n in 0..2 {
            f.service
                .update_ad(ad.id, &f.seller, retitle(&format!("warmup {n}")))
                .await
                .unwrap();
        }

        let service = Arc::new(f.service);
        let handles: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|title| {
                let service = service.clone();
                let seller = f.seller.clone();
                tokio::spawn(async move {
                    service
                        .update_ad(ad.id, &seller, retitle(title))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                EditOutcome::Applied(_) => applied += 1,
                EditOutcome::LimitExceeded(_) => refused += 1,
            }
        }
        assert_eq!((applied, refused), (1, 1));

        let stored = service.get_ad(ad.id).await.unwrap();
        assert_eq!(stored.edit_attempts, 3);
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_non_seller_cannot_edit() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        let stranger = register(&f.service, "stranger@example.com", true, None).await;

        let err = f
            .service
            .update_ad(ad.id, &stranger, retitle("mine now"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(f.service.get_ad(ad.id).await.unwrap().edit_attempts, 0);
    }

    #[tokio::test]
    async fn test_empty_changes_rejected() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();

        let err = f
            .service
            .update_ad(ad.id, &f.seller, AdChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_update_missing_ad() {
        let f = setup().await;
        let err = f
            .service
            .update_ad(AdId::new(), &f.seller, retitle("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_price_edit_reprices_and_title_edit_keeps_basket() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();

        let outcome = f
            .service
            .update_ad(
                ad.id,
                &f.seller,
                AdChanges {
                    price: Some(d("900")),
                    currency: Some(EUR),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let repriced = outcome.into_ad();
        assert_eq!(repriced.currency, EUR);
        assert!(!repriced.prices.contains_key(&EUR));
        assert_eq!(repriced.prices[&USD].to_string(), "1000.00");
        assert_eq!(repriced.prices[&UAH].to_string(), "37000.00");

        let retitled = f
            .service
            .update_ad(ad.id, &f.seller, retitle("New title"))
            .await
            .unwrap()
            .into_ad();
        assert_eq!(retitled.prices, repriced.prices);
    }

    #[tokio::test]
    async fn test_flagged_edit_deactivates_and_clean_edit_does_not_reactivate() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();

        let flagged = f
            .service
            .update_ad(ad.id, &f.seller, retitle("cheap scam deal"))
            .await
            .unwrap()
            .into_ad();
        assert!(!flagged.is_active);

        let clean = f
            .service
            .update_ad(ad.id, &f.seller, retitle("Honest Corolla"))
            .await
            .unwrap()
            .into_ad();
        assert!(!clean.is_active);
        assert_eq!(clean.edit_attempts, 2);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Deactivation and listing
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_deactivate_is_seller_only_and_idempotent() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        let stranger = register(&f.service, "stranger@example.com", false, None).await;

        let err = f.service.deactivate_ad(ad.id, &stranger).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert!(!f.service.deactivate_ad(ad.id, &f.seller).await.unwrap().is_active);
        assert!(!f.service.deactivate_ad(ad.id, &f.seller).await.unwrap().is_active);
        assert!(f.service.list_ads(AdFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ads_by_brand() {
        let f = setup().await;
        let honda = f.service.create_brand("Honda".into()).await.unwrap();
        let civic = f
            .service
            .create_model(honda.id, "Civic".into())
            .await
            .unwrap();

        f.service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        let mut other = draft(&f, "2000", USD);
        other.car_model_id = civic.id;
        let civic_ad = f.service.create_ad(other, &f.seller).await.unwrap();

        let all = f.service.list_ads(AdFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let hondas = f
            .service
            .list_ads(AdFilter {
                brand_id: Some(honda.id),
            })
            .await
            .unwrap();
        assert_eq!(hondas.len(), 1);
        assert_eq!(hondas[0].id, civic_ad.id);
    }

    #[tokio::test]
    async fn test_create_model_for_unknown_brand() {
        let f = setup().await;
        let err = f
            .service
            .create_model(CarBrandId::new(), "Ghost".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Retrieval and statistics
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_statistics_windows() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();

        let t = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        for days in [40, 10, 3, 0] {
            f.service
                .repo()
                .record_view(AdView {
                    ad_id: ad.id,
                    viewer_id: None,
                    viewed_at: t - chrono::Duration::days(days),
                })
                .await
                .unwrap();
        }

        let stats = f.service.compute_statistics(&ad, t).await.unwrap();
        assert_eq!(stats.views_total, 4);
        assert_eq!(stats.views_today, 1);
        assert_eq!(stats.views_week, 2);
        assert_eq!(stats.views_month, 3);
    }

    #[tokio::test]
    async fn test_statistics_averages_in_ad_currency() {
        let f = setup().await;
        let neighbour = register(&f.service, "kyiv2@example.com", false, Some("Kyiv")).await;
        let far = register(&f.service, "lviv@example.com", false, Some("Lviv")).await;

        let viewed = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        f.service
            .create_ad(draft(&f, "2000", EUR), &neighbour)
            .await
            .unwrap();
        f.service
            .create_ad(draft(&f, "37000", UAH), &far)
            .await
            .unwrap();
        let withdrawn = f
            .service
            .create_ad(draft(&f, "9000", USD), &neighbour)
            .await
            .unwrap();
        f.service.deactivate_ad(withdrawn.id, &neighbour).await.unwrap();

        let stats = f
            .service
            .compute_statistics(&viewed, Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.currency, USD);
        // Kyiv: 1000.00 and 2000 EUR -> 2222.22 USD
        assert_eq!(stats.average_price_region, Some(d("1611.11")));
        // plus Lviv: 37000 UAH -> 1000.00 USD
        assert_eq!(stats.average_price_ukraine, Some(d("1407.41")));
    }

    #[tokio::test]
    async fn test_regional_average_absent_without_region() {
        let f = setup().await;
        let nomad = register(&f.service, "nomad@example.com", false, None).await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &nomad)
            .await
            .unwrap();

        let stats = f.service.compute_statistics(&ad, Utc::now()).await.unwrap();
        assert_eq!(stats.average_price_region, None);
        assert_eq!(stats.average_price_ukraine, Some(d("1000.00")));
    }

    #[tokio::test]
    async fn test_averages_absent_when_no_active_ads() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        f.service.deactivate_ad(ad.id, &f.seller).await.unwrap();

        let stats = f.service.compute_statistics(&ad, Utc::now()).await.unwrap();
        assert_eq!(stats.average_price_region, None);
        assert_eq!(stats.average_price_ukraine, None);
    }

    #[tokio::test]
    async fn test_retrieve_statistics_only_for_premium() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        let premium = register(&f.service, "vip@example.com", true, None).await;
        f.service
            .record_view(ad.id, Some(premium.user_id))
            .await
            .unwrap();

        let basic = f.service.retrieve_ad(ad.id, Some(&f.seller)).await.unwrap();
        assert!(basic.statistics.is_none());

        let anonymous = f.service.retrieve_ad(ad.id, None).await.unwrap();
        assert!(anonymous.statistics.is_none());

        let rich = f.service.retrieve_ad(ad.id, Some(&premium)).await.unwrap();
        let stats = rich.statistics.unwrap();
        assert_eq!(stats.views_total, 1);
        assert_eq!(stats.views_today, 1);
        assert_eq!(rich.ad, ad);
    }

    #[tokio::test]
    async fn test_statistics_failure_degrades_to_bare_ad() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        let premium = register(&f.service, "vip@example.com", true, None).await;
        f.service.repo().fail_views.store(true, Ordering::SeqCst);

        let details = f.service.retrieve_ad(ad.id, Some(&premium)).await.unwrap();
        assert!(details.statistics.is_none());
        assert_eq!(details.ad.id, ad.id);
    }

    #[tokio::test]
    async fn test_statistics_timeout_degrades_to_bare_ad() {
        let f = setup_with(ServiceConfig {
            store_timeout: Duration::from_millis(50),
        })
        .await;
        let ad = f
            .service
            .create_ad(draft(&f, "1000", USD), &f.seller)
            .await
            .unwrap();
        let premium = register(&f.service, "vip@example.com", true, None).await;
        *f.service.repo().view_delay.lock().unwrap() = Some(Duration::from_millis(500));

        let details = f.service.retrieve_ad(ad.id, Some(&premium)).await.unwrap();
        assert!(details.statistics.is_none());
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let f = setup_with(ServiceConfig {
            store_timeout: Duration::from_millis(50),
        })
        .await;
        *f.service.repo().list_delay.lock().unwrap() = Some(Duration::from_millis(500));

        let err = f
            .service
            .list_ads(AdFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout));
    }

    #[tokio::test]
    async fn test_retrieve_missing_ad() {
        let f = setup().await;
        let err = f
            .service
            .retrieve_ad(AdId::new(), Some(&f.seller))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let service = MarketService::new(MockRepo::new(), Arc::new(AllowAll));
        let (user, raw_key) = service
            .register_user(RegisterUserRequest {
                email: "  Olena@Example.com ".into(),
                is_premium: true,
                region: Some("Odesa".into()),
            })
            .await
            .unwrap();
        assert_eq!(user.email, "olena@example.com");
        assert!(raw_key.starts_with("sk_"));

        let principal = service
            .authenticate(&hash_api_key(&raw_key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.user_id, user.id);
        assert!(principal.is_premium);
        assert_eq!(principal.region.as_deref(), Some("Odesa"));

        assert!(service.authenticate(&hash_api_key("sk_bogus")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_email_and_duplicates() {
        let f = setup().await;
        let err = f
            .service
            .register_user(RegisterUserRequest {
                email: "no-at-sign".into(),
                is_premium: false,
                region: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = f
            .service
            .register_user(RegisterUserRequest {
                email: "seller@example.com".into(),
                is_premium: false,
                region: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversations and missing makes
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_open_conversation_with_ad_seller() {
        let f = setup().await;
        let buyer = register(&f.service, "buyer@example.com", false, None).await;
        let ad = f
            .service
            .create_ad(draft(&f, "15000", USD), &f.seller)
            .await
            .unwrap();

        let conversation = f.service.open_conversation(ad.id, &buyer).await.unwrap();
        assert_eq!(conversation.seller_id, f.seller.user_id);
        assert_eq!(conversation.buyer_id, buyer.user_id);

        for party in [&buyer, &f.seller] {
            let listed = f.service.list_conversations(party).await.unwrap();
            assert_eq!(listed, vec![conversation.clone()]);
        }
        let outsider = register(&f.service, "other@example.com", false, None).await;
        assert!(f.service.list_conversations(&outsider).await.unwrap().is_empty());

        let err = f.service.open_conversation(ad.id, &buyer).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_seller_cannot_open_conversation_on_own_ad() {
        let f = setup().await;
        let ad = f
            .service
            .create_ad(draft(&f, "15000", USD), &f.seller)
            .await
            .unwrap();

        let err = f.service.open_conversation(ad.id, &f.seller).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = f
            .service
            .open_conversation(AdId::new(), &f.seller)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_make_requests() {
        let f = setup().await;
        let other = register(&f.service, "other@example.com", false, None).await;

        let err = f
            .service
            .request_missing_make(&f.seller, " toyota ".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = f
            .service
            .request_missing_make(&f.seller, "   ".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let lada = f
            .service
            .request_missing_make(&f.seller, " Lada ".into())
            .await
            .unwrap();
        assert_eq!(lada.car_make, "Lada");
        let zaz = f
            .service
            .request_missing_make(&f.seller, "ZAZ".into())
            .await
            .unwrap();

        let mine = f.service.list_missing_make_requests(&f.seller).await.unwrap();
        assert_eq!(mine, vec![zaz, lada]);
        assert!(f.service.list_missing_make_requests(&other).await.unwrap().is_empty());
    }
}
