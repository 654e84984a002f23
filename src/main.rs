use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mokkalab::config::Config;
use mokkalab::db::{create_pool, init_db, queries, AppState};
use mokkalab::email::ResendMailer;
use mokkalab::fulfillment::Services;
use mokkalab::handlers::webhooks::handle_stripe_webhook;
use mokkalab::invoice::LexofficeClient;
use mokkalab::models::{CreateProduct, CreateProductVariant, HOUSE_BRAND};
use mokkalab::order_number::ThreadRngSource;
use mokkalab::payments::StripeClient;

#[derive(Parser, Debug)]
#[command(name = "mokkalab")]
#[command(about = "Order fulfillment backend for the Mokkalab store")]
struct Cli {
    /// Seed the database with a dev catalog (products and variants)
    #[arg(long)]
    seed: bool,
}

/// Seeds a small catalog so the webhook flow can be exercised locally.
/// Only runs when the database has no products yet.
fn seed_dev_catalog(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing = queries::list_active_products(&conn).expect("Failed to list products");
    if !existing.is_empty() {
        tracing::info!("Catalog already has products, skipping seed");
        return;
    }

    tracing::info!("Seeding dev catalog");

    let catalog: &[(&str, &str, &[(&str, i64, i64)])] = &[
        (
            "Espresso Forte",
            HOUSE_BRAND,
            &[("250g ganze Bohne", 899, 120), ("1kg ganze Bohne", 2990, 40)],
        ),
        (
            "Filterkaffee Mild",
            HOUSE_BRAND,
            &[("250g gemahlen", 799, 80)],
        ),
        (
            "Sencha Grüntee",
            "Teelab",
            &[("100g lose", 1190, 60)],
        ),
    ];

    for &(name, brand, variants) in catalog {
        let product = queries::create_product(
            &conn,
            &CreateProduct {
                name: name.to_string(),
                brand: brand.to_string(),
                active: true,
            },
        )
        .expect("Failed to create seed product");

        for &(variant_name, price_cents, stock) in variants {
            queries::create_product_variant(
                &conn,
                &product.id,
                &CreateProductVariant {
                    name: variant_name.to_string(),
                    price_cents,
                    stock,
                },
            )
            .expect("Failed to create seed variant");
        }

        tracing::info!("Seeded product '{}' with {} variant(s)", name, variants.len());
    }
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mokkalab=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = pool.get().expect("Failed to get db connection");
        init_db(&conn).expect("Failed to initialize schema");
    }

    if config.lexoffice_api_key.is_none() {
        tracing::warn!("LEXOFFICE_API_KEY not set, invoice generation will fail (non-fatal)");
    }
    if config.resend_api_key.is_none() {
        tracing::warn!("RESEND_API_KEY not set, emails will be logged only");
    }

    let services = Services {
        invoices: Arc::new(LexofficeClient::new(
            config.lexoffice_api_key.as_deref().unwrap_or_default(),
        )),
        mailer: Arc::new(ResendMailer::new(
            config.resend_api_key.clone(),
            config.email_from.clone(),
        )),
        rng: Arc::new(ThreadRngSource),
        internal_notification_email: config.internal_notification_email.clone(),
    };

    let state = AppState {
        db: pool,
        stripe: StripeClient::new(&config.stripe_secret_key, &config.stripe_webhook_secret),
        services,
        base_url: config.base_url.clone(),
    };

    if cli.seed {
        if config.dev_mode {
            seed_dev_catalog(&state);
        } else {
            tracing::warn!("--seed is only available in dev mode (MOKKALAB_ENV=dev)");
        }
    }

    let app = Router::new()
        .route("/health", get(health))
        .route("/webhooks/stripe", post(handle_stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Mokkalab listening on {}", addr);
    axum::serve(listener, app).await.expect("Server error");
}
