mod cors;
mod health;
mod redis;

use std::{sync::Arc, time::Duration};

use actix_web::{App, HttpServer, web};
use api_auth::{ChainedVerifier, IdentityVerifier};
use api_billing::{BillingService, EntitlementResolver, PgBillingStore};
use api_extract::{ExtractionService, GeminiExtractor, PgHistoryStore};
use common::env_config::Config;
use limiter::{
    GuestQuotaStore, GuestQuotaTracker, InMemoryGuestStore, QuotaEngine, guest_redis::RedisGuestStore,
    spawn_guest_sweeper, store::PgUsageStore, user::UserQuotaTracker, window::daily_window,
};

/// Base64 grows payloads by a third, so an 8 MB image needs room above 10 MB.
const JSON_LIMIT_BYTES: usize = 12 * 1024 * 1024;
const RATE_LIMIT_GC_SECS: u64 = 60;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup(logger::default_level(config.is_production())).expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, config.is_production())
        .await
        .expect("Failed to set up database");

    // guest quotas live in Redis when configured, in process memory otherwise
    let window = daily_window();
    let guest_store: Arc<dyn GuestQuotaStore> = match &config.redis_url {
        Some(redis_url) => {
            let redis_pool =
                redis::setup_redis(redis_url).expect("Failed to create pool of Redis connections");
            log::info!("Guest quotas are stored in Redis");
            Arc::new(RedisGuestStore::new(redis_pool, window))
        }
        None => Arc::new(InMemoryGuestStore::new(window)),
    };

    // entitlements and billing
    let billing_store = Arc::new(PgBillingStore::new(pool.clone()));
    let resolver = EntitlementResolver::new(billing_store.clone());
    let billing = BillingService::new(billing_store, resolver.clone());

    // quotas
    let guest_tracker =
        GuestQuotaTracker::new(guest_store, config.quota.guest_daily_limit, window);
    let user_tracker = UserQuotaTracker::new(
        Arc::new(PgUsageStore::new(pool.clone())),
        config.quota.free_daily_limit,
        window,
    );
    let engine = QuotaEngine::new(guest_tracker.clone(), user_tracker, resolver.clone());

    // identity and extraction providers
    let verifier: Arc<dyn IdentityVerifier> =
        Arc::new(ChainedVerifier::from_config(&config.identity));
    let extractions = ExtractionService::new(
        Arc::new(GeminiExtractor::new(config.gemini.clone())),
        Arc::new(PgHistoryStore::new(pool.clone())),
        resolver.clone(),
    );

    // background eviction
    let _guest_sweeper = spawn_guest_sweeper(
        guest_tracker,
        Duration::from_secs(config.quota.guest_sweep_interval_secs.max(1)),
    );

    // one limiter for all workers
    let ip_limiter =
        limiter::ip_middleware(config.rate_limit.window_secs, config.rate_limit.max_requests);
    let gc_limiter = ip_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(RATE_LIMIT_GC_SECS));
        loop {
            ticker.tick().await;
            gc_limiter.retain_recent();
        }
    });

    log::info!(
        "Starting server on {}:{} ({} workers)",
        config.server_host,
        config.server_port,
        config.num_workers
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(resolver.clone()))
            .app_data(web::Data::new(billing.clone()))
            .app_data(web::Data::new(engine.clone()))
            .app_data(web::Data::new(extractions.clone()))
            .app_data(web::Data::from(verifier.clone()))
            .app_data(web::JsonConfig::default().limit(JSON_LIMIT_BYTES))
            .wrap(logger::middleware()) // 3rd
            .wrap(extractor::middleware()) // 2nd
            .wrap(cors::middleware(&config_data)) // 1st
            .service(health::get_root)
            .service(
                web::scope("/api")
                    .wrap(ip_limiter.clone())
                    .service(health::get_health)
                    .service(api_auth::mount_auth())
                    .service(api_auth::mount_users())
                    .service(api_billing::mount_billing().wrap(api_auth::auth_middleware()))
                    .service(api_extract::mount_extractions()),
            )
            .default_service(web::to(health::not_found))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
