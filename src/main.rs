use std::sync::Arc;

use chainpay_engine::api::{build_router, AppState};
use chainpay_engine::chains::{ChainRegistry, EthereumProcessor, StarknetProcessor};
use chainpay_engine::config::AppConfig;
use chainpay_engine::database::{
    memory::{InMemoryPaymentStore, InMemoryWebhookStore},
    PaymentStore, PgPaymentRepository, PgWebhookRepository, WebhookStore,
};
use chainpay_engine::logging::init_tracing;
use chainpay_engine::services::{PaymentService, WebhookService};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;

    let (payments, webhooks): (Arc<dyn PaymentStore>, Arc<dyn WebhookStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                info!("Connected to Postgres");
                (
                    Arc::new(PgPaymentRepository::new(pool.clone())),
                    Arc::new(PgWebhookRepository::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set, using in-memory stores");
                (
                    Arc::new(InMemoryPaymentStore::new()),
                    Arc::new(InMemoryWebhookStore::new()),
                )
            }
        };

    let mut registry = ChainRegistry::new();
    registry.register(Arc::new(EthereumProcessor::new(config.ethereum.clone())));
    registry.register(Arc::new(StarknetProcessor::new(config.starknet.clone())));
    let registry = Arc::new(registry);

    let state = AppState {
        payments: Arc::new(PaymentService::new(registry.clone(), payments.clone())),
        webhooks: Arc::new(WebhookService::new(
            payments,
            webhooks,
            config.webhook.clone(),
        )),
    };

    let app = build_router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
