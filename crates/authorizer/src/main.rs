//! Lambda entry point for the platform authorizer.

use std::sync::Arc;

use lambda_runtime::{Error, LambdaEvent, run, service_fn};
use platform_authorizer::{Authorizer, AuthorizerConfig, AuthorizerResponse, TokenAuthorizerEvent};
use platform_authorizer_storage::auth::{KeySetStore, MemoryKeySetStore};
use platform_authorizer_storage_dynamodb::{DynamoKeySetStore, DynamoStoreConfig};
use tracing_subscriber::EnvFilter;

async fn function_handler(
    authorizer: &Authorizer,
    event: LambdaEvent<TokenAuthorizerEvent>,
) -> Result<AuthorizerResponse, Error> {
    tracing::debug!(request_id = %event.context.request_id, "Authorizing request");
    Ok(authorizer.authorize(&event.payload).await?)
}

async fn key_set_store(config: &AuthorizerConfig) -> Result<Arc<dyn KeySetStore>, Error> {
    let Some(table) = config.key_cache_table() else {
        tracing::warn!("KEY_CACHE_TABLE is unset; signing keys are cached per instance only");
        return Ok(Arc::new(MemoryKeySetStore::new()));
    };

    let sdk_config = aws_config::load_from_env().await;
    let store_config = DynamoStoreConfig::builder().table_name(table).build()?;
    tracing::info!(table, "Using DynamoDB key cache");
    Ok(Arc::new(DynamoKeySetStore::new(&sdk_config, store_config)))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        // CloudWatch renders neither colour codes nor our timestamps usefully.
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .json()
        .init();

    let config = AuthorizerConfig::from_env()?;
    let store = key_set_store(&config).await?;
    let authorizer = Arc::new(Authorizer::from_config(&config, store)?);
    tracing::info!(issuers = authorizer.issuer_count(), "Authorizer starting");

    run(service_fn(move |event: LambdaEvent<TokenAuthorizerEvent>| {
        let authorizer = Arc::clone(&authorizer);
        async move { function_handler(&authorizer, event).await }
    }))
    .await
}
