//! Client example walking through the ad lifecycle against a running server.
//!
//! Run with: cargo run -p market-app --example client_example --no-default-features --features sqlite

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use market_client::MarketClient;
use market_hex::{KeywordFilter, MarketService, inbound::HttpServer};
use market_repo::build_repo;
use market_types::{CreateAdRequest, CurrencyCode, UpdateAdRequest};
use rust_decimal::Decimal;
use tempfile::tempdir;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let port = addr.port();
    drop(listener);

    // Use a temp file-backed SQLite DB
    let tmp = tempdir()?;
    let db_path = tmp.path().join("market.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    println!("🚀 Starting server on port {port}...");
    println!("   Database: {db_url}");

    let repo = build_repo(&db_url).await?;
    let service = MarketService::new(repo, Arc::new(KeywordFilter::from_csv("scam,stolen")));
    service
        .seed_reference_rates(chrono::Utc::now().date_naive())
        .await?;
    let router = HttpServer::new(service).router();

    let server_addr = format!("127.0.0.1:{port}");
    let server_listener = TcpListener::bind(&server_addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(server_listener, router.into_make_service()).await {
            eprintln!("server stopped: {e}");
        }
    });

    let base_url = format!("http://127.0.0.1:{port}");
    let anonymous = MarketClient::new(&base_url);
    anyhow::ensure!(anonymous.health().await?, "server is not healthy");

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    let seller_key = anonymous
        .register("seller@example.com", false, Some("Kyiv".into()))
        .await?
        .api_key;
    let buyer_key = anonymous
        .register("buyer@example.com", true, Some("Lviv".into()))
        .await?
        .api_key;
    let seller = MarketClient::new(&base_url).with_api_key(seller_key);
    let buyer = MarketClient::new(&base_url).with_api_key(buyer_key);

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog and pricing
    // ─────────────────────────────────────────────────────────────────────────

    let brand = seller.create_brand("Toyota").await?;
    let model = seller.create_model(brand.id, "Corolla").await?;

    let preview = seller
        .convert(Decimal::from(1000), CurrencyCode::from_str("USD")?)
        .await?;
    println!("💱 1000 USD is {:?}", preview.prices);

    let ad = seller
        .create_ad(&CreateAdRequest {
            title: "Toyota Corolla 2018".into(),
            description: "Single owner, 82 000 km".into(),
            price: Decimal::from(14_500),
            currency: CurrencyCode::from_str("USD")?,
            car_model_id: model.id,
        })
        .await?;
    println!("📢 Published ad {} with prices {:?}", ad.id, ad.prices);

    // ─────────────────────────────────────────────────────────────────────────
    // Premium view
    // ─────────────────────────────────────────────────────────────────────────

    buyer.get_ad(ad.id).await?;
    let details = buyer.get_ad(ad.id).await?;
    if let Some(stats) = &details.statistics {
        println!(
            "📊 views total={} today={}, national average {:?} {}",
            stats.views_total, stats.views_today, stats.average_price_ukraine, stats.currency
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversations and missing makes
    // ─────────────────────────────────────────────────────────────────────────

    let conversation = buyer.open_conversation(ad.id).await?;
    println!(
        "💬 Conversation {} opened, seller sees {}",
        conversation.id,
        seller.list_conversations().await?.len()
    );

    let request = seller.request_missing_make("Lada").await?;
    println!("🆕 Asked for make {}", request.car_make);

    // ─────────────────────────────────────────────────────────────────────────
    // Edit limit
    // ─────────────────────────────────────────────────────────────────────────

    for attempt in 1..=4 {
        let updated = seller
            .update_ad(
                ad.id,
                &UpdateAdRequest {
                    price: Some(Decimal::from(14_500 - attempt * 100)),
                    ..Default::default()
                },
            )
            .await?;
        match updated.detail {
            Some(detail) => println!(
                "✋ Edit {attempt}: {detail} (active: {})",
                updated.ad.is_active
            ),
            None => println!(
                "✏️  Edit {attempt}: price {} {}",
                updated.ad.price, updated.ad.currency
            ),
        }
    }

    let remaining = buyer.list_ads(None).await?;
    println!("📋 Active ads after the edit limit: {}", remaining.len());

    Ok(())
}
