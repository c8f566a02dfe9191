//! ci-api - Collection instrument service entry point
//!
//! Wires configuration, database, publishers and the survey response egress
//! into the HTTP router.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ci_api::clients::ServiceClient;
use ci_api::config::Config;
use ci_api::db::Store;
use ci_api::egress::broker::BrokerEgress;
use ci_api::egress::cloud::CloudEgress;
use ci_api::egress::gcs::GcsBucket;
use ci_api::egress::pubsub::PubSubTopic;
use ci_api::egress::token::TokenSource;
use ci_api::egress::ResponseEgress;
use ci_api::publisher::amqp::AmqpPublisher;
use ci_api::publisher::{Destination, INSTRUMENT_EXCHANGE, RESPONSE_QUEUE};
use ci_api::{build_router, AppState};
use ci_common::crypto::{derive_key, JweEncrypter, KEY_PURPOSE_INBOUND};
use ci_common::db::init_database;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(
        "Starting collection instrument service (ci-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = Config::parse();
    config.validate().map_err(|e| anyhow!(e)).context("Invalid configuration")?;

    let pool = init_database(&config.database_uri, config.pool_settings())
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database ready");
    let store = Store::new(pool);

    let encrypter = Arc::new(
        JweEncrypter::from_json(&config.json_secret_keys, KEY_PURPOSE_INBOUND)
            .context("Failed to load JSON_SECRET_KEYS")?,
    );

    let instrument_events = AmqpPublisher::new(
        config.instrument_broker_uri(),
        Destination::FanoutExchange(INSTRUMENT_EXCHANGE.to_string()),
    );
    declare_on_startup(&instrument_events).await;

    let response_egress = build_response_egress(&config, encrypter).await?;
    let clients = ServiceClient::from_config(&config).context("Failed to build upstream client")?;

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .context("Invalid bind address")?;

    let state = AppState::new(store, config, clients, Arc::new(instrument_events), response_egress);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("ci-api listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Plain text by default, one JSON object per line with `LOG_FORMAT=json`
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ci_api=info,ci_common=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Brokers may come up after the service, so a failed declare is only logged
async fn declare_on_startup(publisher: &AmqpPublisher) {
    match publisher.declare().await {
        Ok(()) => info!(destination = %publisher.destination().name(), "✓ Broker destination declared"),
        Err(e) => warn!(
            destination = %publisher.destination().name(),
            error = %e,
            "Could not declare broker destination, will retry on publish"
        ),
    }
}

async fn build_response_egress(config: &Config, encrypter: Arc<JweEncrypter>) -> Result<Arc<dyn ResponseEgress>> {
    if !config.save_seft_in_gcp {
        let publisher = AmqpPublisher::new(
            config.rabbitmq_amqp_survey_response.clone(),
            Destination::Queue(RESPONSE_QUEUE.to_string()),
        );
        declare_on_startup(&publisher).await;
        info!("Survey responses go to the broker");
        return Ok(Arc::new(BrokerEgress::new(encrypter, Arc::new(publisher))));
    }

    // validate() guarantees these are present
    let bucket = config.seft_bucket_name.as_deref().unwrap_or_default();
    let project = config.google_cloud_project.as_deref().unwrap_or_default();
    let topic = config.seft_pubsub_topic.as_deref().unwrap_or_default();

    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout())
        .build()
        .context("Failed to build cloud HTTP client")?;

    let tokens = Arc::new(match &config.google_oauth_access_token {
        Some(token) if !token.is_empty() => TokenSource::Static(token.clone()),
        _ => TokenSource::metadata(http.clone()),
    });

    let store = GcsBucket::new(
        http.clone(),
        &config.gcs_base_url,
        bucket,
        derive_key(&config.ons_cryptokey),
        tokens.clone(),
    );
    let publisher = PubSubTopic::new(http, &config.pubsub_base_url, project, topic, tokens);
    info!(bucket, topic = %publisher.topic_path(), "Survey responses go to the bucket");

    Ok(Arc::new(CloudEgress::new(
        encrypter,
        Arc::new(store),
        Arc::new(publisher),
        config.seft_bucket_file_prefix.clone(),
    )))
}

/// Resolves on SIGINT or SIGTERM so in-flight requests can finish
async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c().await.expect("Failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal = received, "Shutting down");
}
