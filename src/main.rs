use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chowline::config::Config;
use chowline::db::{create_pool, init_db, queries, AppState};
use chowline::handlers;
use chowline::invoice::{FsBlobStore, InvoiceGenerator};
use chowline::models::{CreateOrder, Customer, OrderItem};
use chowline::notify::NotificationDispatcher;
use chowline::payments::PaystackClient;

#[derive(Parser, Debug)]
#[command(name = "chowline")]
#[command(about = "Payment reconciliation service for the Chowline ordering platform")]
struct Cli {
    /// Seed the database with a dev order (useful for webhook testing)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn seed_dev_order(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seed");

    if queries::get_order(&conn, "ORD-DEV-1")
        .expect("Failed to check for seed order")
        .is_some()
    {
        tracing::info!("Seed order already exists, skipping");
        return;
    }

    let input = CreateOrder {
        id: Some("ORD-DEV-1".to_string()),
        branch_id: "1".to_string(),
        customer: Customer {
            name: "Dev Customer".to_string(),
            email: "dev@chowline.local".to_string(),
            phone: "+2340000000000".to_string(),
            address: "1 Test Street".to_string(),
            recipient_name: None,
            recipient_phone: None,
        },
        items: vec![OrderItem {
            name: "Jollof Rice".to_string(),
            price: 5000,
            quantity: 3,
            specifications: Some("extra spicy".to_string()),
        }],
        delivery_price: 1500,
        total_amount: 16500,
    };

    let order = queries::create_order(&conn, &input).expect("Failed to create seed order");
    tracing::info!("Seeded pending order {} (total {})", order.id, order.total_amount);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chowline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.paystack_secret_key.is_empty() {
        tracing::warn!("PAYSTACK_SECRET_KEY is not set; all webhook signatures will be rejected");
    }
    if config.resend_api_key.is_none() {
        tracing::info!("RESEND_API_KEY is not set; email delivery is disabled");
    }
    if config.url_signing_secret.is_empty() {
        tracing::warn!("URL_SIGNING_SECRET is not set; all invoice download URLs will be rejected");
    }

    // Create database pool and initialize schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let notifier = Arc::new(NotificationDispatcher::new(
        config.resend_api_key.clone(),
        config.email_from.clone(),
        config.branches.clone(),
    ));

    let blob_store = Arc::new(FsBlobStore::new(&config.invoice_dir));
    let invoices = Arc::new(InvoiceGenerator::new(
        blob_store,
        config.base_url.clone(),
        config.url_signing_secret.clone(),
    ));

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        paystack: PaystackClient::new(config.paystack_secret_key.clone()),
        notifier,
        invoices,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::error!("--seed requires CHOWLINE_ENV=dev");
            std::process::exit(1);
        }
        seed_dev_order(&state);
    }

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    if cli.ephemeral && config.dev_mode {
        tracing::info!("Ephemeral mode: removing {}", config.database_path);
        let _ = std::fs::remove_file(&config.database_path);
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");
}
