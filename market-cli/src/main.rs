//! Marketplace CLI
//!
//! Command-line interface for the car-ads marketplace API.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use market_client::MarketClient;
use market_types::{AdId, CarBrandId, CarModelId, CreateAdRequest, CurrencyCode, UpdateAdRequest};

#[derive(Parser)]
#[command(name = "market")]
#[command(author, version, about = "Car-ads marketplace API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the marketplace API
    #[arg(long, env = "MARKET_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "MARKET_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Register a user and print the API key
    Register {
        #[arg(long)]
        email: String,
        /// Premium users see ad statistics
        #[arg(long)]
        premium: bool,
        #[arg(long)]
        region: Option<String>,
    },
    /// Show the authenticated user
    Me,
    /// Ad operations
    Ad {
        #[command(subcommand)]
        action: AdCommands,
    },
    /// List known currencies
    Currencies,
    /// Show effective exchange rates
    Rates {
        /// Evaluate rates on this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Convert an amount into every other currency
    Convert {
        amount: Decimal,
        #[arg(long, default_value = "USD")]
        from: CurrencyCode,
    },
    /// Car brand operations
    Brand {
        #[command(subcommand)]
        action: BrandCommands,
    },
    /// Car model operations
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Conversations with sellers
    Conversation {
        #[command(subcommand)]
        action: ConversationCommands,
    },
    /// Requests for car makes missing from the catalog
    MissingMake {
        #[command(subcommand)]
        action: MissingMakeCommands,
    },
}

#[derive(Subcommand)]
enum AdCommands {
    /// Publish a new ad
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value = "USD")]
        currency: CurrencyCode,
        /// Car model ID (UUID)
        #[arg(long)]
        model: CarModelId,
    },
    /// Get an ad (with statistics for premium users)
    Get {
        /// Ad ID (UUID)
        id: AdId,
    },
    /// Edit an ad; only the given fields change
    Update {
        id: AdId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        currency: Option<CurrencyCode>,
        #[arg(long)]
        model: Option<CarModelId>,
    },
    /// List active ads
    List {
        #[arg(long)]
        brand: Option<CarBrandId>,
    },
    /// Withdraw an ad
    Deactivate { id: AdId },
}

#[derive(Subcommand)]
enum BrandCommands {
    /// Create a brand
    Create { name: String },
    /// List brands
    List,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Create a model under a brand
    Create {
        #[arg(long)]
        brand: CarBrandId,
        name: String,
    },
    /// List models
    List {
        #[arg(long)]
        brand: Option<CarBrandId>,
    },
}

#[derive(Subcommand)]
enum ConversationCommands {
    /// Open a conversation with the seller of an ad
    Open {
        /// Ad ID (UUID)
        ad: AdId,
    },
    /// List your conversations
    List,
}

#[derive(Subcommand)]
enum MissingMakeCommands {
    /// Ask for a make to be added
    Request { car_make: String },
    /// List your requests
    List,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = MarketClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Register {
            email,
            premium,
            region,
        } => {
            let registered = client.register(&email, premium, region).await?;
            eprintln!("Registered {} ({})", registered.user.email, registered.user.id);
            eprintln!("Save this key, it will not be shown again:");
            println!("{}", registered.api_key);
        }

        Commands::Me => print_json(&client.me().await?)?,

        Commands::Ad { action } => match action {
            AdCommands::Create {
                title,
                description,
                price,
                currency,
                model,
            } => {
                let req = CreateAdRequest {
                    title,
                    description,
                    price,
                    currency,
                    car_model_id: model,
                };
                let ad = client.create_ad(&req).await?;
                if !ad.is_active {
                    eprintln!("! Ad was flagged by the content filter and is not published");
                }
                print_json(&ad)?;
            }
            AdCommands::Get { id } => print_json(&client.get_ad(id).await?)?,
            AdCommands::Update {
                id,
                title,
                description,
                price,
                currency,
                model,
            } => {
                let changes = UpdateAdRequest {
                    title,
                    description,
                    price,
                    currency,
                    car_model_id: model,
                };
                let updated = client.update_ad(id, &changes).await?;
                if let Some(detail) = &updated.detail {
                    eprintln!("! {}", detail);
                }
                print_json(&updated)?;
            }
            AdCommands::List { brand } => print_json(&client.list_ads(brand).await?)?,
            AdCommands::Deactivate { id } => {
                client.deactivate_ad(id).await?;
                println!("✓ Ad {} deactivated", id);
            }
        },

        Commands::Currencies => print_json(&client.list_currencies().await?)?,

        Commands::Rates { as_of } => print_json(&client.exchange_rates(as_of).await?)?,

        Commands::Convert { amount, from } => print_json(&client.convert(amount, from).await?)?,

        Commands::Brand { action } => match action {
            BrandCommands::Create { name } => print_json(&client.create_brand(&name).await?)?,
            BrandCommands::List => print_json(&client.list_brands().await?)?,
        },

        Commands::Model { action } => match action {
            ModelCommands::Create { brand, name } => {
                print_json(&client.create_model(brand, &name).await?)?
            }
            ModelCommands::List { brand } => print_json(&client.list_models(brand).await?)?,
        },

        Commands::Conversation { action } => match action {
            ConversationCommands::Open { ad } => {
                print_json(&client.open_conversation(ad).await?)?
            }
            ConversationCommands::List => print_json(&client.list_conversations().await?)?,
        },

        Commands::MissingMake { action } => match action {
            MissingMakeCommands::Request { car_make } => {
                print_json(&client.request_missing_make(&car_make).await?)?
            }
            MissingMakeCommands::List => {
                print_json(&client.list_missing_make_requests().await?)?
            }
        },
    }

    Ok(())
}
