//! Deterministic in-memory backends
//!
//! Used by the test suites (and local development without Postgres) in
//! place of the sqlx-backed implementations. Behavior mirrors the
//! Postgres queries: the region directory applies the same matching
//! cascade, the roster store enforces the same soft-delete semantics.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::services::area_resolver::{cascade_match, RegionDirectory};
use crate::services::store::RosterStore;
use crate::types::{IdentityHit, NewRosterRecord, RegionLevel, RegionRef, RosterRole};

// =============================================================================
// REGION DIRECTORY
// =============================================================================

struct RegionRow {
    level: RegionLevel,
    region: RegionRef,
    parent_code: Option<String>,
}

/// In-memory region directory with the exact/prefix/substring cascade.
#[derive(Default)]
pub struct MemoryRegionDirectory {
    rows: Mutex<Vec<RegionRow>>,
    lookups: Mutex<u32>,
}

impl MemoryRegionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, level: RegionLevel, code: &str, name: &str, parent_code: Option<&str>) {
        self.rows.lock().unwrap().push(RegionRow {
            level,
            region: RegionRef::new(code, name),
            parent_code: parent_code.map(|c| c.to_string()),
        });
    }

    /// Number of `resolve` calls made so far.
    pub fn lookups(&self) -> u32 {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl RegionDirectory for MemoryRegionDirectory {
    async fn resolve(
        &self,
        level: RegionLevel,
        search: &str,
        parent_code: Option<&str>,
    ) -> Result<Option<RegionRef>> {
        *self.lookups.lock().unwrap() += 1;

        let rows = self.rows.lock().unwrap();
        let candidates: Vec<RegionRef> = rows
            .iter()
            .filter(|r| r.level == level)
            .filter(|r| match parent_code {
                Some(parent) => r.parent_code.as_deref() == Some(parent),
                None => true,
            })
            .map(|r| r.region.clone())
            .collect();

        Ok(cascade_match(search, &candidates))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// ROSTER STORE
// =============================================================================

#[derive(Debug, Clone)]
struct StoredRecord {
    record_id: Uuid,
    account_id: Uuid,
    role: RosterRole,
    display_name: String,
    nik: String,
    phone: String,
    login_handle: String,
    village_code: String,
    deleted: bool,
}

impl StoredRecord {
    fn hit(&self) -> IdentityHit {
        IdentityHit {
            role: self.role,
            record_id: self.record_id,
            account_id: self.account_id,
            display_name: self.display_name.clone(),
            login_handle: self.login_handle.clone(),
            deleted: self.deleted,
        }
    }
}

/// In-memory roster store covering all three roster tables.
#[derive(Default)]
pub struct MemoryRosterStore {
    records: Mutex<Vec<StoredRecord>>,
    /// When set, the next `create` call fails with this message once.
    fail_next_create: Mutex<Option<String>>,
}

impl MemoryRosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing record, optionally soft-deleted.
    pub fn seed(
        &self,
        role: RosterRole,
        display_name: &str,
        nik: &str,
        phone: &str,
        login_handle: &str,
        village_code: &str,
        deleted: bool,
    ) -> Uuid {
        let record_id = Uuid::new_v4();
        self.records.lock().unwrap().push(StoredRecord {
            record_id,
            account_id: Uuid::new_v4(),
            role,
            display_name: display_name.to_string(),
            nik: nik.to_string(),
            phone: phone.to_string(),
            login_handle: login_handle.to_string(),
            village_code: village_code.to_string(),
            deleted,
        });
        record_id
    }

    /// Make the next `create` fail, to exercise the row-local
    /// system-error path.
    pub fn fail_next_create(&self, message: &str) {
        *self.fail_next_create.lock().unwrap() = Some(message.to_string());
    }

    pub fn active_count(&self, role: RosterRole, village_code: &str) -> u32 {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == role && r.village_code == village_code && !r.deleted)
            .count() as u32
    }

    /// Count of active records per NIK, across all roster tables.
    pub fn active_nik_counts(&self) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for record in self.records.lock().unwrap().iter().filter(|r| !r.deleted) {
            *counts.entry(record.nik.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl RosterStore for MemoryRosterStore {
    async fn find_by_nik(&self, nik: &str) -> Result<Vec<IdentityHit>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.nik == nik)
            .map(StoredRecord::hit)
            .collect())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Vec<IdentityHit>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.phone == phone)
            .map(StoredRecord::hit)
            .collect())
    }

    async fn count_active_in_village(&self, role: RosterRole, village_code: &str) -> Result<u32> {
        Ok(self.active_count(role, village_code))
    }

    async fn login_handle_exists(&self, handle: &str) -> Result<bool> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.login_handle == handle))
    }

    async fn create(&self, record: &NewRosterRecord) -> Result<Uuid> {
        if let Some(message) = self.fail_next_create.lock().unwrap().take() {
            bail!("{message}");
        }

        let account_id = Uuid::new_v4();
        self.records.lock().unwrap().push(StoredRecord {
            record_id: Uuid::new_v4(),
            account_id,
            role: record.role,
            display_name: record.display_name.clone(),
            nik: record.nik.clone(),
            phone: record.phone.clone(),
            login_handle: record.login_handle.clone(),
            village_code: record.village_code.clone(),
            deleted: false,
        });
        Ok(account_id)
    }

    async fn restore(&self, hit: &IdentityHit, record: &NewRosterRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.record_id == hit.record_id) {
            Some(stored) => {
                stored.display_name = record.display_name.clone();
                stored.phone = record.phone.clone();
                stored.village_code = record.village_code.clone();
                stored.deleted = false;
                Ok(())
            }
            None => bail!("record {} not found", hit.record_id),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
