//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use exchange_rates::{
        ConversionError, Currency, CurrencyCode, EUR, PriceBasket, UAH, USD, reference_rates,
    };
    use market_types::{
        AdChanges, AdDraft, AdEdit, AdFilter, AdId, AdRepository, AdView, AdViewRepository,
        CarBrand, CarModel, CatalogRepository, Conversation, ConversationRepository,
        CurrencyRepository, DomainError, EDIT_ATTEMPT_CAP, MissingMakeRequest,
        EditOutcome, NewAd, PriceBasis, RepoError, User, UserRepository,
    };
    use rust_decimal::Decimal;

    use crate::SqliteRepo;
    use crate::security::hash_api_key;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn day(m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, dd).unwrap()
    }

    async fn setup_repo() -> SqliteRepo {
        let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
        for (currency, rate) in reference_rates() {
            let code = currency.code;
            repo.upsert_currency(currency).await.unwrap();
            repo.record_rate(code, rate, day(1, 1)).await.unwrap();
        }
        repo
    }

    struct Fixture {
        seller: User,
        model: CarModel,
    }

    async fn fixture(repo: &SqliteRepo, region: Option<&str>) -> Fixture {
        let email = format!("seller-{}@example.com", uuid::Uuid::new_v4());
        let user = User::new(email, false, region.map(String::from)).unwrap();
        let (seller, _) = repo.create_user(user).await.unwrap();

        let brand = repo
            .create_brand(CarBrand::new(format!("Brand {}", uuid::Uuid::new_v4())).unwrap())
            .await
            .unwrap();
        let model = repo
            .create_model(CarModel::new(brand.id, "Model".into()).unwrap())
            .await
            .unwrap();

        Fixture { seller, model }
    }

    fn new_ad(f: &Fixture, price: &str, currency: exchange_rates::CurrencyCode) -> NewAd {
        NewAd {
            draft: AdDraft {
                title: "Toyota Corolla".into(),
                description: "Clean title".into(),
                price: d(price),
                currency,
                car_model_id: f.model.id,
            },
            seller_id: f.seller.id,
            is_active: true,
        }
    }

    fn basket(entries: &[(exchange_rates::CurrencyCode, &str)]) -> PriceBasket {
        entries.iter().map(|(c, p)| (*c, d(p))).collect()
    }

    fn edit(changes: AdChanges) -> AdEdit {
        AdEdit {
            changes,
            flagged: false,
            repriced: None,
            priced_against: None,
            cap: EDIT_ATTEMPT_CAP,
        }
    }

    fn retitle(title: &str) -> AdChanges {
        AdChanges {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Currency ledger
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_list_currencies() {
        let repo = setup_repo().await;

        let codes: Vec<_> = repo
            .list_currencies()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();

        assert_eq!(codes, vec![EUR, UAH, USD]);
    }

    #[tokio::test]
    async fn test_upsert_currency_renames() {
        let repo = setup_repo().await;

        repo.upsert_currency(Currency::new(USD, "Dollar")).await.unwrap();

        let currencies = repo.list_currencies().await.unwrap();
        assert_eq!(currencies.len(), 3);
        assert!(currencies.iter().any(|c| c.code == USD && c.name == "Dollar"));
    }

    #[tokio::test]
    async fn test_rates_as_of_excludes_future_rows() {
        let repo = setup_repo().await;
        repo.record_rate(UAH, d("41.2"), day(6, 1)).await.unwrap();

        let before = repo.rates_as_of(day(5, 31)).await.unwrap();
        let after = repo.rates_as_of(day(6, 1)).await.unwrap();

        assert_eq!(before.len(), 3);
        assert_eq!(after.len(), 4);
    }

    #[tokio::test]
    async fn test_record_rate_assigns_increasing_seq() {
        let repo = setup_repo().await;

        let first = repo.record_rate(EUR, d("0.91"), day(2, 1)).await.unwrap();
        let second = repo.record_rate(EUR, d("0.92"), day(2, 1)).await.unwrap();

        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn test_record_rate_unknown_currency() {
        let repo = setup_repo().await;
        let gbp = "GBP".parse().unwrap();

        let result = repo.record_rate(gbp, d("0.8"), day(1, 1)).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::Conversion(
                ConversionError::UnknownCurrency(_)
            )))
        ));
    }

    #[tokio::test]
    async fn test_record_rate_rejects_non_positive() {
        let repo = setup_repo().await;

        let result = repo.record_rate(EUR, Decimal::ZERO, day(1, 1)).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::Conversion(
                ConversionError::InvalidRate { .. }
            )))
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ads
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_and_get_ad_with_basket() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;

        let created = repo
            .create_ad(
                new_ad(&f, "1000.00", USD),
                basket(&[(EUR, "900.00"), (UAH, "37000.00")]),
            )
            .await
            .unwrap();

        assert_eq!(created.edit_attempts, 0);
        assert!(created.is_active);

        let fetched = repo.get_ad(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.price, d("1000.00"));
        assert_eq!(fetched.prices.len(), 2);
        assert_eq!(fetched.prices[&UAH], d("37000.00"));
    }

    #[tokio::test]
    async fn test_get_ad_not_found() {
        let repo = setup_repo().await;

        assert!(repo.get_ad(AdId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_ad_unknown_model_rolls_back() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let mut ad = new_ad(&f, "10.00", USD);
        ad.draft.car_model_id = market_types::CarModelId::new();

        let result = repo.create_ad(ad, basket(&[(EUR, "9.00")])).await;

        assert!(matches!(result, Err(RepoError::NotFound)));
        assert!(repo.list_ads(AdFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_ad_failing_price_row_rolls_back() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        // EUR is written first; GBP has no currency row and fails the insert.
        let gbp: CurrencyCode = "GBP".parse().unwrap();

        let result = repo
            .create_ad(
                new_ad(&f, "1000.00", USD),
                basket(&[(EUR, "900.00"), (gbp, "790.00")]),
            )
            .await;

        assert!(matches!(result, Err(RepoError::NotFound)));
        let ads: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ads")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        let prices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ad_prices")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(ads, 0);
        assert_eq!(prices, 0);
    }

    #[tokio::test]
    async fn test_edit_counter_caps_and_deactivates() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();

        for n in 1..=EDIT_ATTEMPT_CAP {
            let outcome = repo
                .apply_edit(ad.id, edit(retitle(&format!("Edit {n}"))))
                .await
                .unwrap();
            let EditOutcome::Applied(updated) = outcome else {
                panic!("edit {n} should apply");
            };
            assert_eq!(updated.edit_attempts, n);
            assert!(updated.is_active);
        }

        let outcome = repo.apply_edit(ad.id, edit(retitle("Too many"))).await.unwrap();
        let EditOutcome::LimitExceeded(locked) = outcome else {
            panic!("edit beyond the cap must be refused");
        };
        assert_eq!(locked.edit_attempts, EDIT_ATTEMPT_CAP);
        assert_eq!(locked.title, "Edit 3");
        assert!(!locked.is_active);

        // Stays locked.
        let again = repo.apply_edit(ad.id, edit(retitle("Again"))).await.unwrap();
        assert!(matches!(again, EditOutcome::LimitExceeded(ref a) if !a.is_active));
    }

    #[tokio::test]
    async fn test_apply_edit_missing_ad() {
        let repo = setup_repo().await;

        let result = repo.apply_edit(AdId::new(), edit(retitle("x"))).await;

        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    #[tokio::test]
    async fn test_repriced_edit_replaces_basket() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(
                new_ad(&f, "1000.00", USD),
                basket(&[(EUR, "900.00"), (UAH, "37000.00")]),
            )
            .await
            .unwrap();

        let outcome = repo
            .apply_edit(
                ad.id,
                AdEdit {
                    changes: AdChanges {
                        price: Some(d("900.00")),
                        currency: Some(EUR),
                        ..Default::default()
                    },
                    flagged: false,
                    repriced: Some(basket(&[(USD, "1000.00"), (UAH, "37000.00")])),
                    priced_against: Some(ad.price_basis()),
                    cap: EDIT_ATTEMPT_CAP,
                },
            )
            .await
            .unwrap();

        let updated = outcome.into_ad();
        assert_eq!(updated.currency, EUR);
        assert_eq!(updated.price, d("900.00"));
        assert!(updated.prices.contains_key(&USD));
        assert!(!updated.prices.contains_key(&EUR));
    }

    #[tokio::test]
    async fn test_repriced_edit_refused_after_concurrent_currency_change() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(
                new_ad(&f, "1000.00", USD),
                basket(&[(EUR, "900.00"), (UAH, "37000.00")]),
            )
            .await
            .unwrap();
        let read_before_either = ad.price_basis();

        // Switch to EUR, priced from the USD listing.
        repo.apply_edit(
            ad.id,
            AdEdit {
                changes: AdChanges {
                    currency: Some(EUR),
                    ..Default::default()
                },
                flagged: false,
                repriced: Some(basket(&[(USD, "1111.11"), (UAH, "41111.11")])),
                priced_against: Some(read_before_either),
                cap: EDIT_ATTEMPT_CAP,
            },
        )
        .await
        .unwrap();

        // New price, still priced from the USD listing.
        let result = repo
            .apply_edit(
                ad.id,
                AdEdit {
                    changes: AdChanges {
                        price: Some(d("500.00")),
                        ..Default::default()
                    },
                    flagged: false,
                    repriced: Some(basket(&[(EUR, "450.00"), (UAH, "18500.00")])),
                    priced_against: Some(read_before_either),
                    cap: EDIT_ATTEMPT_CAP,
                },
            )
            .await;

        assert!(matches!(result, Err(RepoError::Conflict(_))));
        let stored = repo.get_ad(ad.id).await.unwrap().unwrap();
        assert_eq!(stored.price, d("1000.00"));
        assert_eq!(stored.currency, EUR);
        assert_eq!(stored.edit_attempts, 1);
        assert!(stored.is_active);
        assert!(!stored.prices.contains_key(&EUR));
        assert_eq!(stored.prices[&USD], d("1111.11"));
    }

    #[tokio::test]
    async fn test_stale_price_basis_at_cap_still_locks() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();
        for n in 1..=EDIT_ATTEMPT_CAP {
            repo.apply_edit(ad.id, edit(retitle(&format!("Edit {n}"))))
                .await
                .unwrap();
        }

        let mut repriced = edit(AdChanges {
            price: Some(d("90.00")),
            ..Default::default()
        });
        repriced.repriced = Some(basket(&[(EUR, "81.00")]));
        repriced.priced_against = Some(PriceBasis {
            price: d("1.00"),
            currency: UAH,
        });

        let outcome = repo.apply_edit(ad.id, repriced).await.unwrap();
        assert!(matches!(outcome, EditOutcome::LimitExceeded(ref a) if !a.is_active));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_edits_at_last_attempt_apply_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
        let repo = std::sync::Arc::new(SqliteRepo::new(&url).await.unwrap());
        for (currency, rate) in reference_rates() {
            let code = currency.code;
            repo.upsert_currency(currency).await.unwrap();
            repo.record_rate(code, rate, day(1, 1)).await.unwrap();
        }
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();
        for n in 1..EDIT_ATTEMPT_CAP {
            repo.apply_edit(ad.id, edit(retitle(&format!("Edit {n}"))))
                .await
                .unwrap();
        }

        let racers: Vec<_> = ["Left", "Right"]
            .into_iter()
            .map(|title| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.apply_edit(ad.id, edit(retitle(title))).await })
            })
            .collect();

        let mut applied = 0;
        let mut refused = 0;
        for racer in racers {
            match racer.await.unwrap().unwrap() {
                EditOutcome::Applied(_) => applied += 1,
                EditOutcome::LimitExceeded(_) => refused += 1,
            }
        }

        assert_eq!((applied, refused), (1, 1));
        let stored = repo.get_ad(ad.id).await.unwrap().unwrap();
        assert_eq!(stored.edit_attempts, EDIT_ATTEMPT_CAP);
        assert!(!stored.is_active);
        assert!(stored.title == "Left" || stored.title == "Right");
    }

    #[tokio::test]
    async fn test_flagged_edit_deactivates_and_clean_edit_keeps_inactive() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();

        let mut flagged = edit(retitle("bad words"));
        flagged.flagged = true;
        let first = repo.apply_edit(ad.id, flagged).await.unwrap().into_ad();
        assert!(!first.is_active);

        let second = repo.apply_edit(ad.id, edit(retitle("Clean"))).await.unwrap();
        assert!(matches!(second, EditOutcome::Applied(ref a) if !a.is_active));
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();

        assert!(!repo.deactivate_ad(ad.id).await.unwrap().is_active);
        assert!(!repo.deactivate_ad(ad.id).await.unwrap().is_active);
        assert!(matches!(
            repo.deactivate_ad(AdId::new()).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_ads_filters_by_brand_and_activity() {
        let repo = setup_repo().await;
        let a = fixture(&repo, None).await;
        let b = fixture(&repo, None).await;

        let keep = repo
            .create_ad(new_ad(&a, "10.00", USD), basket(&[(EUR, "9.00")]))
            .await
            .unwrap();
        let hidden = repo
            .create_ad(new_ad(&a, "20.00", USD), PriceBasket::new())
            .await
            .unwrap();
        repo.deactivate_ad(hidden.id).await.unwrap();
        repo.create_ad(new_ad(&b, "30.00", USD), PriceBasket::new())
            .await
            .unwrap();

        let all = repo.list_ads(AdFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let only_a = repo
            .list_ads(AdFilter {
                brand_id: Some(a.model.brand_id),
            })
            .await
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].id, keep.id);
        assert_eq!(only_a[0].prices[&EUR], d("9.00"));
    }

    #[tokio::test]
    async fn test_active_prices_by_currency_and_region() {
        let repo = setup_repo().await;
        let kyiv = fixture(&repo, Some("Kyiv")).await;
        let lviv = fixture(&repo, Some("Lviv")).await;

        repo.create_ad(new_ad(&kyiv, "100.00", USD), basket(&[(EUR, "90.00")]))
            .await
            .unwrap();
        repo.create_ad(new_ad(&kyiv, "50.00", EUR), basket(&[(USD, "55.56")]))
            .await
            .unwrap();
        // No EUR entry: skipped when averaging in EUR.
        repo.create_ad(new_ad(&lviv, "3700.00", UAH), PriceBasket::new())
            .await
            .unwrap();
        let inactive = repo
            .create_ad(new_ad(&lviv, "10.00", EUR), PriceBasket::new())
            .await
            .unwrap();
        repo.deactivate_ad(inactive.id).await.unwrap();

        let mut national = repo.active_prices(EUR, None).await.unwrap();
        national.sort();
        assert_eq!(national, vec![d("50.00"), d("90.00")]);

        let regional = repo.active_prices(EUR, Some("Kyiv")).await.unwrap();
        assert_eq!(regional.len(), 2);

        let lviv_only = repo.active_prices(EUR, Some("Lviv")).await.unwrap();
        assert!(lviv_only.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_view_timestamps() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();

        let now = Utc::now();
        for offset in [40, 10, 0] {
            repo.record_view(AdView {
                ad_id: ad.id,
                viewer_id: None,
                viewed_at: now - Duration::days(offset),
            })
            .await
            .unwrap();
        }

        let views = repo.view_timestamps(ad.id).await.unwrap();
        assert_eq!(views.len(), 3);
        assert!(views[0] < views[2]);
        assert!(repo.view_timestamps(AdId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_view_unknown_ad() {
        let repo = setup_repo().await;

        let result = repo.record_view(AdView::now(AdId::new(), None)).await;

        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users & catalog
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_api_key_resolves_user() {
        let repo = setup_repo().await;
        let user = User::new("premium@example.com".into(), true, Some("Kyiv".into())).unwrap();

        let (created, raw_key) = repo.create_user(user).await.unwrap();

        let found = repo
            .find_user_by_api_key_hash(&hash_api_key(&raw_key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
        assert!(found.is_premium);

        assert!(
            repo.find_user_by_api_key_hash(&hash_api_key("sk_wrong"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let repo = setup_repo().await;
        let first = User::new("dup@example.com".into(), false, None).unwrap();
        let second = User::new("dup@example.com".into(), false, None).unwrap();

        repo.create_user(first).await.unwrap();
        let result = repo.create_user(second).await;

        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_catalog_models_filtered_by_brand() {
        let repo = setup_repo().await;
        let toyota = repo
            .create_brand(CarBrand::new("Toyota".into()).unwrap())
            .await
            .unwrap();
        let bmw = repo
            .create_brand(CarBrand::new("BMW".into()).unwrap())
            .await
            .unwrap();
        let corolla = repo
            .create_model(CarModel::new(toyota.id, "Corolla".into()).unwrap())
            .await
            .unwrap();
        repo.create_model(CarModel::new(bmw.id, "X5".into()).unwrap())
            .await
            .unwrap();

        assert_eq!(repo.list_brands().await.unwrap().len(), 2);
        assert_eq!(repo.list_models(None).await.unwrap().len(), 2);
        assert_eq!(repo.list_models(Some(toyota.id)).await.unwrap(), vec![corolla.clone()]);
        assert_eq!(repo.get_model(corolla.id).await.unwrap(), Some(corolla));
    }

    #[tokio::test]
    async fn test_catalog_constraints() {
        let repo = setup_repo().await;
        repo.create_brand(CarBrand::new("Audi".into()).unwrap())
            .await
            .unwrap();

        let duplicate = repo.create_brand(CarBrand::new("Audi".into()).unwrap()).await;
        assert!(matches!(duplicate, Err(RepoError::Conflict(_))));

        let orphan = repo
            .create_model(CarModel::new(market_types::CarBrandId::new(), "A4".into()).unwrap())
            .await;
        assert!(matches!(orphan, Err(RepoError::NotFound)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversations & missing make requests
    // ─────────────────────────────────────────────────────────────────────────

    async fn buyer(repo: &SqliteRepo) -> User {
        let email = format!("buyer-{}@example.com", uuid::Uuid::new_v4());
        let (user, _) = repo
            .create_user(User::new(email, false, None).unwrap())
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn test_conversation_listed_for_both_parties() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let buyer = buyer(&repo).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();

        let opened = repo
            .create_conversation(Conversation::open(&ad, buyer.id).unwrap())
            .await
            .unwrap();

        assert_eq!(repo.list_conversations(buyer.id).await.unwrap(), vec![opened.clone()]);
        assert_eq!(repo.list_conversations(f.seller.id).await.unwrap(), vec![opened]);
        assert!(repo.list_conversations(market_types::UserId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_requires_ad_seller() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let buyer = buyer(&repo).await;
        let impostor = self::buyer(&repo).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();

        let mut forged = Conversation::open(&ad, buyer.id).unwrap();
        forged.seller_id = impostor.id;
        let result = repo.create_conversation(forged).await;

        assert!(matches!(result, Err(RepoError::NotFound)));
        assert!(repo.list_conversations(buyer.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_conversation_about_same_ad_conflicts() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let buyer = buyer(&repo).await;
        let ad = repo
            .create_ad(new_ad(&f, "100.00", USD), PriceBasket::new())
            .await
            .unwrap();

        repo.create_conversation(Conversation::open(&ad, buyer.id).unwrap())
            .await
            .unwrap();
        let again = repo
            .create_conversation(Conversation::open(&ad, buyer.id).unwrap())
            .await;

        assert!(matches!(again, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_missing_make_requests_per_seller() {
        let repo = setup_repo().await;
        let f = fixture(&repo, None).await;
        let other = buyer(&repo).await;

        let lada = repo
            .create_missing_make_request(MissingMakeRequest::new("Lada".into(), f.seller.id).unwrap())
            .await
            .unwrap();
        repo.create_missing_make_request(MissingMakeRequest::new("ZAZ".into(), other.id).unwrap())
            .await
            .unwrap();

        assert_eq!(repo.list_missing_make_requests(f.seller.id).await.unwrap(), vec![lada]);

        let orphan = repo
            .create_missing_make_request(
                MissingMakeRequest::new("Tatra".into(), market_types::UserId::new()).unwrap(),
            )
            .await;
        assert!(matches!(orphan, Err(RepoError::NotFound)));
    }
}
