//! # Hello Events
//!
//! Minimal end-to-end wiring: register a handler, publish an event, let the
//! dispatcher pick it up, and shut down cleanly on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use pgebus_core::{Config, EventContext, Handler, RouterBuilder, Supervisor};
use pgebus_postgres::{publish_event, PgEventStore, PgListener, PgNotifier};
use serde_json::{json, Value};
use sqlx::PgPool;

struct HelloHandler;

#[async_trait]
impl Handler for HelloHandler {
    async fn call(&self, ctx: &mut EventContext<'_>, payload: &Value) -> Result<()> {
        println!("handling {} (attempt {}): {payload}", ctx.event_type, ctx.attempt);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/postgres".into());
    let pool = PgPool::connect(&database_url).await?;

    let config = Config::default();
    let store = Arc::new(PgEventStore::new(pool.clone(), config.database.schema.clone()));
    let router = RouterBuilder::new().on("demo.hello", false, HelloHandler).build();

    let mut supervisor = Supervisor::builder(store, router)
        .with_notifier(Arc::new(PgNotifier::new(pool.clone(), config.channel.clone())))
        .with_listener(Arc::new(PgListener::new(pool.clone(), config.channel.clone())))
        .with_config(config.clone())
        .build();

    supervisor.start().await?;

    let mut tx = pool.begin().await?;
    publish_event(
        &mut tx,
        &config.channel,
        &config.database.schema,
        "demo.hello",
        json!({"msg": "hi"}),
        None,
        config.max_attempts,
    )
    .await?;
    tx.commit().await?;

    tokio::signal::ctrl_c().await?;
    supervisor.stop(true, Duration::from_secs(10)).await;

    Ok(())
}
