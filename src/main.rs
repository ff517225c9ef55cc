use std::{net::SocketAddr, sync::Arc};

use axum::http::HeaderValue;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use storefront_api as api;

use api::gateways::{card::CardGateway, wallet::WalletGateway, PaymentGateway};
use api::notifications::{MailRelayDispatcher, NoopDispatcher, NotificationDispatcher};
use api::services::{checkout::CheckoutService, orders::OrderAdminService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let storage = api::storage::select(&cfg).await?;
    if cfg.uses_database_backend() {
        info!("Using database order storage");
    } else {
        info!(data_dir = %cfg.data_dir, "Using file-based order storage");
    }

    let http = api::gateways::http_client(cfg.provider_timeout_secs)?;

    let wallet: Option<Arc<dyn PaymentGateway>> = cfg.wallet.as_ref().map(|wallet_cfg| {
        info!("Wallet payment provider configured");
        Arc::new(WalletGateway::new(wallet_cfg, &cfg.currency, http.clone()))
            as Arc<dyn PaymentGateway>
    });
    if wallet.is_none() {
        info!("Wallet payment provider not configured; wallet checkout disabled");
    }

    let card: Option<Arc<dyn PaymentGateway>> = cfg.card.as_ref().map(|card_cfg| {
        info!("Card payment provider configured");
        Arc::new(CardGateway::new(card_cfg, &cfg.currency, http.clone()))
            as Arc<dyn PaymentGateway>
    });
    if card.is_none() {
        info!("Card payment provider not configured; card checkout disabled");
    }

    let dispatcher: Arc<dyn NotificationDispatcher> = match cfg.mail.clone() {
        Some(mail_cfg) => {
            info!("Mail relay notifications enabled");
            Arc::new(MailRelayDispatcher::new(mail_cfg, http.clone()))
        }
        None => {
            info!("Mail relay not configured; order notifications disabled");
            Arc::new(NoopDispatcher)
        }
    };

    let checkout = Arc::new(CheckoutService::new(
        storage.clone(),
        wallet,
        card,
        dispatcher,
    ));
    let orders = Arc::new(OrderAdminService::new(storage));

    let state = api::AppState {
        config: cfg.clone(),
        checkout,
        orders,
    };

    let configured_origins = cfg
        .cors_allowed_origins
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_development() {
        info!("Using permissive CORS (development environment)");
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration; set APP__CORS_ALLOWED_ORIGINS");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS".into());
    };

    let app = api::app_router(state).layer(cors_layer);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
