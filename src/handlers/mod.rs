//! NATS message handlers

pub mod ping;
pub mod roster;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

use crate::auth::CredentialCipher;
use crate::config::Config;
use crate::db::queries::region::PgRegionDirectory;
use crate::db::queries::roster::PgRosterStore;
use crate::services::area_resolver::RegionDirectory;
use crate::services::roster_import::RosterImporter;
use crate::services::store::RosterStore;

/// Start all message handlers
pub async fn start_handlers(client: Client, pool: PgPool, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let directory: Arc<dyn RegionDirectory> = Arc::new(PgRegionDirectory::new(pool.clone()));
    let store: Arc<dyn RosterStore> = Arc::new(PgRosterStore::new(pool.clone()));
    info!(
        "Import engine initialized: directory={}, store={}",
        directory.name(),
        store.name()
    );

    let cipher = CredentialCipher::new(&config.credential_key);
    let importer = Arc::new(RosterImporter::new(directory, store, cipher.clone()));

    // Subscribe to all subjects
    let ping_sub = client.subscribe("timses.ping").await?;
    let roster_import_sub = client.subscribe("timses.roster.import").await?;
    let credential_get_sub = client.subscribe("timses.roster.credential.get").await?;

    info!("Subscribed to NATS subjects");

    let client_ping = client.clone();
    let client_roster_import = client.clone();
    let client_credential_get = client.clone();
    let jwt_secret = config.jwt_secret.clone();
    let jwt_secret_credential = config.jwt_secret.clone();
    let credential_pool = pool.clone();

    let ping_handle = tokio::spawn(async move {
        if let Err(e) = ping::handle_ping(client_ping, ping_sub).await {
            error!("Ping handler error: {}", e);
        }
    });

    let roster_import_handle = tokio::spawn(async move {
        if let Err(e) =
            roster::handle_import(client_roster_import, roster_import_sub, importer, jwt_secret)
                .await
        {
            error!("Roster import handler error: {}", e);
        }
    });

    let credential_get_handle = tokio::spawn(async move {
        if let Err(e) = roster::handle_credential_get(
            client_credential_get,
            credential_get_sub,
            credential_pool,
            cipher,
            jwt_secret_credential,
        )
        .await
        {
            error!("Credential get handler error: {}", e);
        }
    });

    info!("All handlers started");

    // Handlers run until the NATS connection drops; whichever exits
    // first brings the worker down for a supervised restart.
    select! {
        _ = ping_handle => error!("Ping handler exited"),
        _ = roster_import_handle => error!("Roster import handler exited"),
        _ = credential_get_handle => error!("Credential get handler exited"),
    }

    Ok(())
}
