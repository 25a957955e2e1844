use sqlx::postgres::PgPoolOptions;

use crate::{
    config::Config,
    error::StoreError,
    models::Role,
    store::Store,
};

const DEFAULT_DEPARTMENTS: [(&str, &str); 4] = [
    ("General Medicine", "General health issues"),
    ("Pediatrics", "Kids and child health"),
    ("Orthopedics", "Bones and joints"),
    ("Cardiology", "Heart specialist"),
];

/// Connects and brings the schema up to date.
pub async fn get_db_pool(config: &Config) -> anyhow::Result<sqlx::Pool<sqlx::Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

/// Seeds departments and the admin account on an empty database.
pub async fn seed_initial_data(store: &dyn Store, config: &Config) -> Result<(), StoreError> {
    if store.departments().await?.is_empty() {
        for (name, description) in DEFAULT_DEPARTMENTS {
            store.create_department(name, description).await?;
        }
        info!("seeded {} departments", DEFAULT_DEPARTMENTS.len());
    }

    if !store.admin_exists().await? {
        store
            .create_user(&config.admin_username, &config.admin_password, Role::Admin)
            .await?;
        info!("created admin account {}", config.admin_username);
    }
    Ok(())
}
