//! Database connection management
//!
//! Pool creation, idempotent migration of the registry tables and the
//! transaction helper every request runs under.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::registry::AttrKind;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{Client, NoTls, Transaction};
use tracing::{debug, info};

/// Create a connection pool, with TLS when the configuration asks for it
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if config.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    };

    pool.map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))
}

/// Open a transaction on a pooled or plain client
pub async fn begin(client: &mut Client) -> Result<Transaction<'_>, AppError> {
    Ok(client.transaction().await?)
}

/// Create all registry tables if they don't exist
pub async fn migrate(client: &mut Client) -> Result<(), AppError> {
    let tx = client.transaction().await?;
    tx.execute(queries::MIGRATION_LOCK, &[]).await?;

    for ddl in [
        queries::CREATE_SCHEMAS,
        queries::CREATE_ATTRIBUTES,
        queries::CREATE_ATTR_DEFINITIONS,
        queries::CREATE_ENTITIES,
        queries::CREATE_CHANGE_REQUESTS,
        queries::CREATE_CHANGES,
    ] {
        tx.batch_execute(ddl).await?;
    }

    for kind in AttrKind::ALL {
        for ddl in queries::create_value_table(kind) {
            tx.batch_execute(&ddl).await?;
        }
        tx.batch_execute(&queries::create_change_value_table(kind))
            .await?;
        debug!(%kind, table = kind.value_table(), "value tables ready");
    }

    for ddl in queries::CREATE_INDEXES {
        tx.batch_execute(ddl).await?;
    }

    tx.commit().await?;
    info!("Database tables initialized");
    Ok(())
}
