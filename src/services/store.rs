//! Roster store abstraction
//!
//! Seam between the import engine and persistence. The Postgres
//! implementation lives in `db::queries::roster`; tests run against the
//! in-memory store in `services::memory`.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{IdentityHit, NewRosterRecord, RosterRole};

#[async_trait]
pub trait RosterStore: Send + Sync {
    /// All records matching this NIK across every roster table, active
    /// and soft-deleted alike.
    async fn find_by_nik(&self, nik: &str) -> Result<Vec<IdentityHit>>;

    /// All records matching this phone number across every roster table.
    async fn find_by_phone(&self, phone: &str) -> Result<Vec<IdentityHit>>;

    /// Persisted count of active assignees of `role` in a village.
    async fn count_active_in_village(&self, role: RosterRole, village_code: &str) -> Result<u32>;

    /// Whether a login handle is already taken (active or deleted).
    async fn login_handle_exists(&self, handle: &str) -> Result<bool>;

    /// Create the account, credential record and roster record as one
    /// atomic unit of work. Returns the new account id.
    async fn create(&self, record: &NewRosterRecord) -> Result<Uuid>;

    /// Reactivate a soft-deleted record and its account with the sheet's
    /// current attributes: name, phone, TPS and the resolved area are all
    /// taken from `record`, so the record becomes active in the village
    /// the quota check ran against. The NIK and login handle are
    /// preserved; `record.login_handle` is ignored.
    async fn restore(&self, hit: &IdentityHit, record: &NewRosterRecord) -> Result<()>;

    /// Name of this store implementation.
    fn name(&self) -> &'static str;
}
