use std::sync::Arc;

use config::Config;
use db::{get_db_pool, seed_initial_data};
use handlers::AppState;
use session::SessionStore;
use store::{PgStore, Store};

mod accounts;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod routes;
mod scheduling;
mod session;
mod store;
mod views;

extern crate pretty_env_logger;
#[macro_use] extern crate log;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let config = Config::from_env()?;
    views::templates()?;
    let pool = get_db_pool(&config).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    seed_initial_data(store.as_ref(), &config).await?;

    let app = routes::app(AppState::new(store, SessionStore::new(config.session_idle)));
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("clinic listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
