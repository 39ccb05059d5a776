// src/main.rs
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use huddle_engine::api;
use huddle_engine::config::Config;
use huddle_engine::realtime::{ChannelRegistry, InProcessChannelRegistry};
use huddle_engine::rooms::{HttpRoomProvider, RoomProvider};
use huddle_engine::services::matching::HEARTBEAT_FRESHNESS_SECONDS;
use huddle_engine::services::{
    CallLifecycle, MatchingEngine, RateLimiter, ReferralEngine, RiskEngine, WalletService,
};
use huddle_engine::store::Store;

/// Listeners that miss heartbeats this long get toggled offline by the sweep.
const OFFLINE_AFTER_SECONDS: i64 = HEARTBEAT_FRESHNESS_SECONDS * 10;
const SWEEP_INTERVAL_SECONDS: u64 = 30;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("🚀 Starting Huddle Engine");

    let config = Config::from_env().expect("Failed to load configuration");
    info!("Environment: {}", config.environment);

    let store = Arc::new(Store::new());
    let rooms: Arc<dyn RoomProvider> =
        Arc::new(HttpRoomProvider::new(config.room_provider.clone()));
    let channels: Arc<dyn ChannelRegistry> = Arc::new(InProcessChannelRegistry::new());

    let wallet = Arc::new(WalletService::new(store.clone()));
    let limiter = Arc::new(RateLimiter::new(store.clone()));
    let matching = Arc::new(MatchingEngine::new(store.clone()));
    let risk = Arc::new(RiskEngine::new(store.clone()));
    let referral = Arc::new(ReferralEngine::new(
        store.clone(),
        wallet.clone(),
        limiter.clone(),
    ));
    let lifecycle = Arc::new(CallLifecycle::new(
        store.clone(),
        wallet.clone(),
        risk.clone(),
        referral.clone(),
        rooms.clone(),
        channels.clone(),
    ));

    // Presence and ring-timeout upkeep.
    let sweep_store = store.clone();
    let sweep_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));
        loop {
            ticker.tick().await;

            let floor = Utc::now() - ChronoDuration::seconds(OFFLINE_AFTER_SECONDS);
            let silent = sweep_store
                .listeners
                .find(|l| l.online && l.last_heartbeat.map_or(true, |h| h < floor));
            for listener in silent {
                sweep_store.listeners.update(&listener.id, |l| l.online = false);
                info!("Listener {} marked offline after missed heartbeats", listener.id);
            }

            sweep_lifecycle.expire_stale_ringing().await;
        }
    });
    info!("✅ Upkeep sweep started");

    let bind_address = format!("{}:{}", config.host, config.port);
    info!("🌐 Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(wallet.clone()))
            .app_data(web::Data::new(limiter.clone()))
            .app_data(web::Data::new(matching.clone()))
            .app_data(web::Data::new(referral.clone()))
            .app_data(web::Data::new(lifecycle.clone()))
            .configure(api::routes::configure)
    })
    .workers(8)
    .bind(&bind_address)?
    .run()
    .await
}
