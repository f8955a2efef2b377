//! Roster import handler
//!
//! Accepts a pre-parsed spreadsheet (header row plus data rows) from the
//! web tier and runs the import engine over it. Only administrators may
//! import; everything else about the batch is reported row by row in the
//! response, never as a request-level failure.

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{extract_auth, CredentialCipher};
use crate::db::queries::credential::fetch_login_credential;
use crate::services::roster_import::RosterImporter;
use crate::types::{
    CredentialGetRequest, CredentialGetResponse, ErrorResponse, ImportVariant, Request,
    RosterImportRequest, SuccessResponse,
};

/// Handle timses.roster.import requests
pub async fn handle_import(
    client: Client,
    mut subscriber: Subscriber,
    importer: Arc<RosterImporter>,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                error!("Roster import message without reply subject");
                continue;
            }
        };

        let request: Request<RosterImportRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse roster import request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let auth = match extract_auth(&request, &jwt_secret) {
            Ok(auth) => auth,
            Err(e) => {
                warn!("Roster import rejected: {}", e);
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        if !auth.is_admin() {
            warn!(user_id = %auth.user_id, "Non-admin attempted roster import");
            let error = ErrorResponse::new(
                request.id,
                "FORBIDDEN",
                "Hanya admin yang dapat mengimpor roster".to_string(),
            );
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        let payload = request.payload;
        let variant = ImportVariant::for_role(payload.role);
        info!(
            user_id = %auth.user_id,
            role = payload.role.label(),
            rows = payload.rows.len(),
            "Roster import requested"
        );

        let report = importer
            .run(&variant, &payload.headers, &payload.rows)
            .await;

        let success = SuccessResponse::new(request.id, report);
        let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
    }

    Ok(())
}

/// Handle timses.roster.credential.get requests
///
/// Decrypts the stored copy of an account's generated password so an
/// administrator can relay it again. Admin-only; the plaintext goes only
/// into the reply, never into the logs.
pub async fn handle_credential_get(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    cipher: CredentialCipher,
    jwt_secret: String,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                error!("Credential get message without reply subject");
                continue;
            }
        };

        let request: Request<CredentialGetRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse credential get request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let auth = match extract_auth(&request, &jwt_secret) {
            Ok(auth) if auth.is_admin() => auth,
            Ok(auth) => {
                warn!(user_id = %auth.user_id, "Non-admin attempted credential lookup");
                let error = ErrorResponse::new(
                    request.id,
                    "FORBIDDEN",
                    "Hanya admin yang dapat membaca kredensial".to_string(),
                );
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
            Err(e) => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let account_id = request.payload.account_id;
        let response = match fetch_login_credential(&pool, account_id).await {
            Ok(Some((login_handle, Some(encrypted)))) => match cipher.decrypt(&encrypted) {
                Ok(password) => {
                    info!(user_id = %auth.user_id, %account_id, "Credential re-read by admin");
                    let success = SuccessResponse::new(
                        request.id,
                        CredentialGetResponse {
                            login_handle,
                            password,
                        },
                    );
                    serde_json::to_vec(&success)?
                }
                Err(e) => {
                    error!(%account_id, "Failed to decrypt stored credential: {}", e);
                    let error =
                        ErrorResponse::new(request.id, "DECRYPT_ERROR", e.to_string());
                    serde_json::to_vec(&error)?
                }
            },
            Ok(Some((_, None))) | Ok(None) => {
                let error = ErrorResponse::new(
                    request.id,
                    "NOT_FOUND",
                    "Kredensial tidak tersedia untuk akun ini".to_string(),
                );
                serde_json::to_vec(&error)?
            }
            Err(e) => {
                error!(%account_id, "Credential lookup failed: {}", e);
                let error = ErrorResponse::new(request.id, "DB_ERROR", e.to_string());
                serde_json::to_vec(&error)?
            }
        };

        let _ = client.publish(reply, response.into()).await;
    }

    Ok(())
}
