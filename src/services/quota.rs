//! Quota guard
//!
//! Caps the headcount of a role per village. The effective count is the
//! persisted number of active assignees as of the first time a batch
//! touches the village, plus the counter accumulated in the current
//! batch. The persisted baseline is read once per village per batch:
//! rows commit before the next row starts, so re-querying it per row
//! would count earlier same-batch commits twice (once persisted, once
//! in the counter).

use std::collections::HashMap;

use crate::services::store::RosterStore;
use crate::types::{ImportError, RegionRef, RosterRole, VillageQuota};

/// Per-batch quota state, owned by the orchestrator for the lifetime of
/// one run; never persisted, never shared across batches. Holds the
/// persisted baseline snapshot per village and the count of assignees
/// provisioned so far in this run.
#[derive(Debug, Default)]
pub struct BatchQuotaState {
    baselines: HashMap<String, u32>,
    counts: HashMap<String, u32>,
}

impl BatchQuotaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assignees recorded for a village in this batch so far.
    pub fn taken(&self, village_code: &str) -> u32 {
        self.counts.get(village_code).copied().unwrap_or(0)
    }

    /// Record one successful provisioning for a village. Called only
    /// after the transactor commits.
    pub fn record(&mut self, village_code: &str) {
        *self.counts.entry(village_code.to_string()).or_insert(0) += 1;
    }

    fn baseline(&self, village_code: &str) -> Option<u32> {
        self.baselines.get(village_code).copied()
    }

    fn set_baseline(&mut self, village_code: &str, count: u32) {
        self.baselines.insert(village_code.to_string(), count);
    }
}

/// Reject the row when the village has no remaining capacity for the
/// role. The error names the village and the current effective count.
pub async fn check_quota(
    store: &dyn RosterStore,
    role: RosterRole,
    quota: VillageQuota,
    village: &RegionRef,
    state: &mut BatchQuotaState,
) -> Result<(), Vec<ImportError>> {
    let persisted = match state.baseline(&village.code) {
        Some(count) => count,
        None => {
            let count = store
                .count_active_in_village(role, &village.code)
                .await
                .map_err(|e| {
                    vec![ImportError::SystemError {
                        message: e.to_string(),
                    }]
                })?;
            state.set_baseline(&village.code, count);
            count
        }
    };

    let effective = persisted + state.taken(&village.code);
    if effective >= quota.ceiling {
        return Err(vec![ImportError::QuotaExceeded {
            role: role.label(),
            village: village.name.clone(),
            count: effective,
            ceiling: quota.ceiling,
        }]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryRosterStore;

    const CEILING: VillageQuota = VillageQuota { ceiling: 2 };

    fn village() -> RegionRef {
        RegionRef::new("3175021", "JATI")
    }

    fn seed_active(store: &MemoryRosterStore, count: u32) {
        for i in 0..count {
            store.seed(
                RosterRole::VillageCoordinator,
                &format!("Kordes {i}"),
                &format!("317506120490{i:04}"),
                &format!("0812345678{i:02}"),
                &format!("kordes{i}"),
                "3175021",
                false,
            );
        }
    }

    #[test]
    fn test_batch_state_counts_per_village() {
        let mut state = BatchQuotaState::new();
        assert_eq!(state.taken("3175021"), 0);

        state.record("3175021");
        state.record("3175021");
        state.record("3175022");

        assert_eq!(state.taken("3175021"), 2);
        assert_eq!(state.taken("3175022"), 1);
    }

    #[test]
    fn test_full_village_rejects_with_count() {
        // Scenario: village already has 2 active coordinators.
        let store = MemoryRosterStore::new();
        seed_active(&store, 2);
        let mut state = BatchQuotaState::new();

        let errors = tokio_test::block_on(check_quota(
            &store,
            RosterRole::VillageCoordinator,
            CEILING,
            &village(),
            &mut state,
        ))
        .unwrap_err();

        match &errors[0] {
            ImportError::QuotaExceeded { village, count, ceiling, .. } => {
                assert_eq!(village, "JATI");
                assert_eq!(*count, 2);
                assert_eq!(*ceiling, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_in_batch_counter_fills_empty_village() {
        // Scenario: empty village, three rows for it in one batch —
        // first two pass, the third hits the in-batch ceiling.
        let store = MemoryRosterStore::new();
        let mut state = BatchQuotaState::new();
        let role = RosterRole::VillageCoordinator;

        assert!(tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state
        ))
        .is_ok());
        state.record("3175021");

        assert!(tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state
        ))
        .is_ok());
        state.record("3175021");

        let errors = tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state,
        ))
        .unwrap_err();
        assert!(matches!(errors[0], ImportError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_committed_rows_not_double_counted() {
        // The orchestrator commits each row before the next one runs, so
        // an earlier same-batch row is already visible in the store when
        // the next row is checked. It must count once (via the in-batch
        // counter), not twice.
        let store = MemoryRosterStore::new();
        let mut state = BatchQuotaState::new();
        let role = RosterRole::VillageCoordinator;

        assert!(tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state
        ))
        .is_ok());
        state.record("3175021");
        seed_active(&store, 1); // the committed row, now in the store

        assert!(tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state
        ))
        .is_ok());
        state.record("3175021");

        let errors = tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state,
        ))
        .unwrap_err();
        match &errors[0] {
            ImportError::QuotaExceeded { count, .. } => assert_eq!(*count, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_persisted_and_in_batch_counts_combine() {
        let store = MemoryRosterStore::new();
        seed_active(&store, 1);
        let mut state = BatchQuotaState::new();
        let role = RosterRole::VillageCoordinator;

        assert!(tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state
        ))
        .is_ok());
        state.record("3175021");

        let errors = tokio_test::block_on(check_quota(
            &store,
            role,
            CEILING,
            &village(),
            &mut state,
        ))
        .unwrap_err();
        match &errors[0] {
            ImportError::QuotaExceeded { count, .. } => assert_eq!(*count, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_other_villages_unaffected() {
        let store = MemoryRosterStore::new();
        seed_active(&store, 2);
        let mut state = BatchQuotaState::new();

        let other = RegionRef::new("3175022", "RAWAMANGUN");
        assert!(tokio_test::block_on(check_quota(
            &store,
            RosterRole::VillageCoordinator,
            CEILING,
            &other,
            &mut state,
        ))
        .is_ok());
    }
}
