//! Postgres-backed roster store
//!
//! Identity lookups scan all three roster tables so NIK and phone
//! uniqueness holds across roles, not just within one. Creation and
//! reactivation each run as a single transaction covering the account
//! row and the roster row.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::store::RosterStore;
use crate::types::{IdentityHit, NewRosterRecord, RosterRole};

pub struct PgRosterStore {
    pool: PgPool,
}

impl PgRosterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_column(&self, column: &str, value: &str) -> Result<Vec<IdentityHit>> {
        let mut hits = Vec::new();

        for role in RosterRole::ALL {
            let table = role.table();
            let sql = format!(
                "SELECT r.id, r.user_id, r.name, u.username, r.deleted_at IS NOT NULL AS deleted \
                 FROM {table} r \
                 JOIN users u ON u.id = r.user_id \
                 WHERE r.{column} = $1"
            );

            let rows: Vec<(Uuid, Uuid, String, String, bool)> = sqlx::query_as(&sql)
                .bind(value)
                .fetch_all(&self.pool)
                .await?;

            hits.extend(rows.into_iter().map(
                |(record_id, account_id, display_name, login_handle, deleted)| IdentityHit {
                    role,
                    record_id,
                    account_id,
                    display_name,
                    login_handle,
                    deleted,
                },
            ));
        }

        Ok(hits)
    }
}

#[async_trait]
impl RosterStore for PgRosterStore {
    async fn find_by_nik(&self, nik: &str) -> Result<Vec<IdentityHit>> {
        self.find_by_column("nik", nik).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Vec<IdentityHit>> {
        self.find_by_column("phone", phone).await
    }

    async fn count_active_in_village(&self, role: RosterRole, village_code: &str) -> Result<u32> {
        let table = role.table();
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE village_code = $1 AND deleted_at IS NULL"
        );

        let count: (i64,) = sqlx::query_as(&sql)
            .bind(village_code)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0 as u32)
    }

    async fn login_handle_exists(&self, handle: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
                .bind(handle)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn create(&self, record: &NewRosterRecord) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        let account_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, password_enc, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW())",
        )
        .bind(account_id)
        .bind(&record.login_handle)
        .bind(&record.password_hash)
        .bind(&record.password_enc)
        .bind(record.role.account_role())
        .execute(&mut *tx)
        .await?;

        let table = record.role.table();
        let sql = format!(
            "INSERT INTO {table} \
             (id, user_id, name, nik, phone, tps, province_code, city_code, district_code, village_code, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())"
        );
        sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(account_id)
            .bind(&record.display_name)
            .bind(&record.nik)
            .bind(&record.phone)
            .bind(&record.tps)
            .bind(&record.province_code)
            .bind(&record.city_code)
            .bind(&record.district_code)
            .bind(&record.village_code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(account_id)
    }

    async fn restore(&self, hit: &IdentityHit, record: &NewRosterRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // The sheet is the source of truth for everything but the NIK
        // and the login handle; the record moves to the row's resolved
        // area so it lives in the village the quota check covered.
        let table = hit.role.table();
        let sql = format!(
            "UPDATE {table} SET deleted_at = NULL, name = $1, phone = $2, tps = $3, \
             province_code = $4, city_code = $5, district_code = $6, village_code = $7, \
             updated_at = NOW() WHERE id = $8"
        );
        sqlx::query(&sql)
            .bind(&record.display_name)
            .bind(&record.phone)
            .bind(&record.tps)
            .bind(&record.province_code)
            .bind(&record.city_code)
            .bind(&record.district_code)
            .bind(&record.village_code)
            .bind(hit.record_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE users SET password_hash = $1, password_enc = $2, deleted_at = NULL, updated_at = NOW() \
             WHERE id = $3",
        )
        .bind(&record.password_hash)
        .bind(&record.password_enc)
        .bind(hit.account_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
