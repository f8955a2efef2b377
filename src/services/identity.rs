//! Identity checker
//!
//! Decides, for one normalized candidate, whether the row creates a
//! fresh identity, reactivates a soft-deleted one, or collides with an
//! active record. A NIK must be unique among active records across all
//! roster tables; NIK and phone duplicates are reported separately
//! because they may point at different existing records.
//!
//! Runs after location resolution (orchestrator ordering) and before the
//! quota check.

use std::collections::HashSet;

use crate::services::store::RosterStore;
use crate::types::{IdentityHit, ImportError};

/// Outcome of the identity check for an accepted row.
#[derive(Debug, Clone)]
pub enum IdentityDecision {
    /// No matching record anywhere: provision a new identity.
    Fresh,
    /// A soft-deleted record holds this NIK and no active record
    /// conflicts: reactivate it instead of creating a duplicate.
    Restore(IdentityHit),
}

fn describe(hit: &IdentityHit) -> String {
    format!("{} '{}'", hit.role.label(), hit.display_name)
}

/// Check a candidate's NIK and phone against every roster table plus the
/// NIKs already committed earlier in this batch.
pub async fn check_identity(
    store: &dyn RosterStore,
    nik: &str,
    phone: &str,
    committed_niks: &HashSet<String>,
) -> Result<IdentityDecision, Vec<ImportError>> {
    // Rows committed earlier in this run are already persisted, but the
    // in-batch set catches them without trusting query timing.
    if committed_niks.contains(nik) {
        return Err(vec![ImportError::DuplicateNik {
            existing: "baris sebelumnya pada berkas yang sama".to_string(),
        }]);
    }

    let system_error = |e: anyhow::Error| {
        vec![ImportError::SystemError {
            message: e.to_string(),
        }]
    };

    let nik_hits = store.find_by_nik(nik).await.map_err(system_error)?;
    let phone_hits = store.find_by_phone(phone).await.map_err(system_error)?;

    let mut errors = Vec::new();
    if let Some(active) = nik_hits.iter().find(|h| !h.deleted) {
        errors.push(ImportError::DuplicateNik {
            existing: describe(active),
        });
    }
    if let Some(active) = phone_hits.iter().find(|h| !h.deleted) {
        errors.push(ImportError::DuplicatePhone {
            existing: describe(active),
        });
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Restore eligibility is keyed on the NIK: reactivation must carry
    // the same national identity forward. A soft-deleted phone-only
    // match belongs to someone else's old record and is ignored.
    match nik_hits.into_iter().find(|h| h.deleted) {
        Some(hit) => Ok(IdentityDecision::Restore(hit)),
        None => Ok(IdentityDecision::Fresh),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryRosterStore;
    use crate::types::RosterRole;

    const NIK: &str = "3175061204900003";
    const PHONE: &str = "081234567890";

    #[tokio::test]
    async fn test_no_match_is_fresh() {
        let store = MemoryRosterStore::new();
        let decision = check_identity(&store, NIK, PHONE, &HashSet::new())
            .await
            .unwrap();
        assert!(matches!(decision, IdentityDecision::Fresh));
    }

    #[tokio::test]
    async fn test_active_nik_match_rejects() {
        let store = MemoryRosterStore::new();
        store.seed(
            RosterRole::Volunteer,
            "Siti Aminah",
            NIK,
            "089900112233",
            "siti.aminah101",
            "3175021",
            false,
        );

        let errors = check_identity(&store, NIK, PHONE, &HashSet::new())
            .await
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ImportError::DuplicateNik { .. }));
        assert!(errors[0].to_string().contains("Relawan 'Siti Aminah'"));
    }

    #[tokio::test]
    async fn test_nik_and_phone_duplicates_reported_separately() {
        let store = MemoryRosterStore::new();
        // Two different existing people: one holds the NIK, one the phone.
        store.seed(
            RosterRole::VillageCoordinator,
            "Agus",
            NIK,
            "089900112233",
            "agus456",
            "3175021",
            false,
        );
        store.seed(
            RosterRole::Volunteer,
            "Rina",
            "3175069901880007",
            PHONE,
            "rina789",
            "3175022",
            false,
        );

        let errors = check_identity(&store, NIK, PHONE, &HashSet::new())
            .await
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ImportError::DuplicateNik { .. }));
        assert!(matches!(errors[1], ImportError::DuplicatePhone { .. }));
    }

    #[tokio::test]
    async fn test_soft_deleted_nik_routes_to_restore() {
        let store = MemoryRosterStore::new();
        let record_id = store.seed(
            RosterRole::Volunteer,
            "Budi Santoso",
            NIK,
            PHONE,
            "budi.santoso831",
            "3175021",
            true,
        );

        let decision = check_identity(&store, NIK, PHONE, &HashSet::new())
            .await
            .unwrap();
        match decision {
            IdentityDecision::Restore(hit) => {
                assert_eq!(hit.record_id, record_id);
                assert_eq!(hit.login_handle, "budi.santoso831");
            }
            IdentityDecision::Fresh => panic!("expected restore"),
        }
    }

    #[tokio::test]
    async fn test_restore_and_reject_are_disjoint() {
        // Soft-deleted NIK match plus an *active* phone match elsewhere:
        // the active conflict wins and the row is rejected, never restored.
        let store = MemoryRosterStore::new();
        store.seed(
            RosterRole::Volunteer,
            "Budi Santoso",
            NIK,
            "089900112233",
            "budi.santoso831",
            "3175021",
            true,
        );
        store.seed(
            RosterRole::ApkCoordinator,
            "Dewi",
            "3175069901880007",
            PHONE,
            "dewi204",
            "3175022",
            false,
        );

        let errors = check_identity(&store, NIK, PHONE, &HashSet::new())
            .await
            .unwrap_err();
        assert!(errors
            .iter()
            .all(|e| matches!(e, ImportError::DuplicatePhone { .. })));
    }

    #[tokio::test]
    async fn test_soft_deleted_phone_only_match_is_fresh() {
        let store = MemoryRosterStore::new();
        store.seed(
            RosterRole::Volunteer,
            "Lama",
            "3175069901880007",
            PHONE,
            "lama321",
            "3175021",
            true,
        );

        let decision = check_identity(&store, NIK, PHONE, &HashSet::new())
            .await
            .unwrap();
        assert!(matches!(decision, IdentityDecision::Fresh));
    }

    #[tokio::test]
    async fn test_in_batch_nik_duplicate_rejected() {
        let store = MemoryRosterStore::new();
        let committed: HashSet<String> = [NIK.to_string()].into();

        let errors = check_identity(&store, NIK, PHONE, &committed)
            .await
            .unwrap_err();
        assert!(matches!(errors[0], ImportError::DuplicateNik { .. }));
    }
}
