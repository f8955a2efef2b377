//! Batch orchestrator
//!
//! Drives one roster sheet through the full pipeline: header mapping,
//! per-row validation and normalization, location resolution, identity
//! and quota checks, provisioning. Rows are processed strictly in sheet
//! order; every failure is row-local and the batch always runs to the
//! end, so the report accounts for every non-blank input row exactly
//! once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::CredentialCipher;
use crate::services::area_resolver::{AreaInput, AreaResolver, RegionDirectory};
use crate::services::headers::{map_headers, HeaderMapping};
use crate::services::identity::{check_identity, IdentityDecision};
use crate::services::normalize::{normalize_phone, normalize_tps, validate_nik};
use crate::services::provisioning::{Candidate, Provisioner};
use crate::services::quota::{check_quota, BatchQuotaState};
use crate::services::store::RosterStore;
use crate::types::{
    BatchReport, CreatedEntry, FailedEntry, Field, ImportError, ImportRow, ImportVariant,
};

pub struct RosterImporter {
    resolver: AreaResolver,
    store: Arc<dyn RosterStore>,
    provisioner: Provisioner,
}

impl RosterImporter {
    pub fn new(
        directory: Arc<dyn RegionDirectory>,
        store: Arc<dyn RosterStore>,
        cipher: CredentialCipher,
    ) -> Self {
        Self {
            resolver: AreaResolver::new(directory),
            store: Arc::clone(&store),
            provisioner: Provisioner::new(store, cipher),
        }
    }

    /// Run one batch. Never fails as a whole: problems surface as failed
    /// entries in the report.
    pub async fn run(
        &self,
        variant: &ImportVariant,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> BatchReport {
        info!(
            role = variant.role.label(),
            rows = rows.len(),
            "Memulai impor roster"
        );

        let mapping = map_headers(headers);
        let mut report = BatchReport::default();

        if let Err(header_error) = mapping.require(variant.required) {
            // The sheet is structurally unusable, but the contract is one
            // report entry per non-blank row, so each gets the rejection.
            warn!(error = %header_error, "Kolom wajib tidak ditemukan, semua baris ditolak");
            for (idx, cells) in rows.iter().enumerate() {
                if is_blank(cells) {
                    continue;
                }
                let row = build_row(&mapping, idx, cells);
                report.failed.push(FailedEntry {
                    row_ordinal: row.ordinal,
                    display_name: row.display_name(),
                    errors: vec![header_error.to_string()],
                });
            }
            return report;
        }

        let mut quota_state = BatchQuotaState::new();
        let mut committed_niks: HashSet<String> = HashSet::new();

        for (idx, cells) in rows.iter().enumerate() {
            if is_blank(cells) {
                continue;
            }
            let row = build_row(&mapping, idx, cells);

            match self
                .process_row(variant, &row, &mut quota_state, &mut committed_niks)
                .await
            {
                Ok(entry) => {
                    report.success_count += 1;
                    report.created.push(entry);
                }
                Err(errors) => {
                    report.failed.push(FailedEntry {
                        row_ordinal: row.ordinal,
                        display_name: row.display_name(),
                        errors: errors.iter().map(|e| e.to_string()).collect(),
                    });
                }
            }
        }

        info!(
            role = variant.role.label(),
            success = report.success_count,
            failed = report.failed.len(),
            "Impor roster selesai"
        );
        report
    }

    async fn process_row(
        &self,
        variant: &ImportVariant,
        row: &ImportRow,
        quota_state: &mut BatchQuotaState,
        committed_niks: &mut HashSet<String>,
    ) -> Result<CreatedEntry, Vec<ImportError>> {
        let mut errors: Vec<ImportError> = Vec::new();
        fn missing(field: Field) -> ImportError {
            ImportError::MissingField {
                label: field.label(),
            }
        }

        if row.get(Field::Name).is_none() {
            errors.push(missing(Field::Name));
        }

        let phone = match row.get(Field::Phone) {
            Some(raw) => normalize_phone(raw).map_err(|e| errors.push(e)).ok(),
            None => {
                errors.push(missing(Field::Phone));
                None
            }
        };

        let nik = match row.get(Field::Nik) {
            Some(raw) => validate_nik(raw).map_err(|e| errors.push(e)).ok(),
            None => {
                errors.push(missing(Field::Nik));
                None
            }
        };

        // An unmapped or empty TPS cell is legal on coordinator sheets;
        // the policy decides between the sentinel and a rejection.
        let tps = normalize_tps(row.get(Field::Tps).unwrap_or(""), variant.tps)
            .map_err(|e| errors.push(e))
            .ok();

        for field in [Field::Province, Field::City, Field::District, Field::Village] {
            if row.get(field).is_none() {
                errors.push(missing(field));
            }
        }

        // Validation problems are reported together; nothing below runs
        // against half-validated values.
        let (Some(phone), Some(nik), Some(tps)) = (phone, nik, tps) else {
            return Err(errors);
        };
        if !errors.is_empty() {
            return Err(errors);
        }
        let display_name = row.display_name();

        let area_input = AreaInput {
            province: row.get(Field::Province).unwrap_or("").to_string(),
            city: row.get(Field::City).unwrap_or("").to_string(),
            district: row.get(Field::District).unwrap_or("").to_string(),
            village: row.get(Field::Village).unwrap_or("").to_string(),
        };
        let area = self.resolver.resolve(&area_input).await.map_err(|e| vec![e])?;

        let decision =
            check_identity(self.store.as_ref(), &nik, &phone, committed_niks).await?;

        // Reactivations occupy village capacity like fresh creations.
        if let Some(quota) = variant.quota {
            check_quota(
                self.store.as_ref(),
                variant.role,
                quota,
                &area.village,
                quota_state,
            )
            .await?;
        }

        let candidate = Candidate {
            role: variant.role,
            display_name,
            nik: nik.clone(),
            phone,
            tps,
            area,
        };
        let entry = match decision {
            IdentityDecision::Fresh => {
                self.provisioner.create(&candidate).await.map_err(|e| vec![e])?
            }
            // A reactivated record adopts the row's area, so it counts
            // against the same village the quota check just covered.
            IdentityDecision::Restore(hit) => {
                self.provisioner.restore(&hit, &candidate).await.map_err(|e| vec![e])?
            }
        };

        quota_state.record(&candidate.area.village.code);
        committed_niks.insert(nik);
        Ok(entry)
    }
}

/// True when every cell in the raw row is blank; such rows are skipped
/// without a report entry.
fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

/// Project one raw row onto canonical fields. `idx` is zero-based over
/// the data rows; the sheet ordinal counts the header as row 1.
fn build_row(mapping: &HeaderMapping, idx: usize, cells: &[String]) -> ImportRow {
    let mut values = HashMap::new();
    for field in Field::ALL {
        if let Some(column) = mapping.column(field) {
            if let Some(cell) = cells.get(column) {
                values.insert(field, cell.clone());
            }
        }
    }
    ImportRow::new(idx + 2, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{MemoryRegionDirectory, MemoryRosterStore};
    use crate::types::{RegionLevel, RosterRole};

    const HEADERS: [&str; 8] = [
        "Nama",
        "NIK",
        "No. HP",
        "Provinsi",
        "Kota/Kabupaten",
        "Kecamatan",
        "Kelurahan/Desa",
        "TPS",
    ];

    fn headers() -> Vec<String> {
        HEADERS.iter().map(|s| s.to_string()).collect()
    }

    fn row(cells: [&str; 8]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn jakarta_directory() -> Arc<MemoryRegionDirectory> {
        let dir = MemoryRegionDirectory::new();
        dir.insert(RegionLevel::Province, "31", "DKI JAKARTA", None);
        dir.insert(RegionLevel::City, "3175", "JAKARTA TIMUR", Some("31"));
        dir.insert(RegionLevel::District, "317502", "PULO GADUNG", Some("3175"));
        dir.insert(RegionLevel::Village, "3175021", "JATI", Some("317502"));
        dir.insert(RegionLevel::Village, "3175022", "RAWAMANGUN", Some("317502"));
        Arc::new(dir)
    }

    fn importer(store: Arc<MemoryRosterStore>) -> RosterImporter {
        RosterImporter::new(
            jakarta_directory(),
            store,
            CredentialCipher::new("kunci-kredensial-untuk-pengujian"),
        )
    }

    fn volunteer_row(name: &str, nik: &str, phone: &str, village: &str, tps: &str) -> Vec<String> {
        row([
            name,
            nik,
            phone,
            "DKI Jakarta",
            "Jakarta Timur",
            "Pulo Gadung",
            village,
            tps,
        ])
    }

    #[tokio::test]
    async fn test_mixed_batch_accounts_for_every_row() {
        // One good row, one bad phone, one duplicate NIK of the first.
        let store = Arc::new(MemoryRosterStore::new());
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::Volunteer);

        let rows = vec![
            volunteer_row("Budi Santoso", "3175061204900003", "+6281234567890", "Jati", "17"),
            volunteer_row("Siti Aminah", "3175064505910002", "021555", "Jati", "18"),
            volunteer_row("Budi Palsu", "3175061204900003", "089900112233", "Jati", "19"),
        ];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.success_count, 1);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failed.len(), 2);

        assert_eq!(report.created[0].display_name, "Budi Santoso");
        assert!(report.created[0].login_handle.starts_with("budi.santoso"));

        assert_eq!(report.failed[0].row_ordinal, 3);
        assert!(report.failed[0].errors[0].contains("Nomor HP tidak valid"));
        assert_eq!(report.failed[1].row_ordinal, 4);
        assert!(report.failed[1].errors[0].contains("NIK sudah terdaftar"));
    }

    #[tokio::test]
    async fn test_missing_required_header_rejects_every_row() {
        let store = Arc::new(MemoryRosterStore::new());
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::Volunteer);

        let headers = vec!["Nama".to_string(), "No. HP".to_string()];
        let rows = vec![
            vec!["Budi Santoso".to_string(), "081234567890".to_string()],
            vec!["".to_string(), "".to_string()],
            vec!["Siti Aminah".to_string(), "081234567891".to_string()],
        ];
        let report = importer.run(&variant, &headers, &rows).await;

        assert_eq!(report.success_count, 0);
        // The blank row produces no entry.
        assert_eq!(report.failed.len(), 2);
        for failed in &report.failed {
            assert!(failed.errors[0].contains("Kolom wajib tidak ditemukan"));
            assert!(failed.errors[0].contains("NIK"));
        }
        assert_eq!(report.failed[0].display_name, "Budi Santoso");
        assert_eq!(report.failed[1].row_ordinal, 4);
    }

    #[tokio::test]
    async fn test_blank_rows_are_skipped_silently() {
        let store = Arc::new(MemoryRosterStore::new());
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::Volunteer);

        let rows = vec![
            row(["", "", "", "", "", "", "", ""]),
            volunteer_row("Budi Santoso", "3175061204900003", "081234567890", "Jati", "17"),
            row(["  ", "", "", "", "", "", "", ""]),
        ];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.success_count, 1);
        assert!(report.failed.is_empty());
        // Ordinal reflects the sheet position, not a compacted index.
        assert_eq!(report.created.len(), 1);
    }

    #[tokio::test]
    async fn test_validation_errors_collected_together() {
        let store = Arc::new(MemoryRosterStore::new());
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::Volunteer);

        // Bad phone AND bad NIK AND missing TPS on one row.
        let rows = vec![volunteer_row("Budi", "12345", "nomor", "Jati", "")];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.failed.len(), 1);
        let errors = &report.failed[0].errors;
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("Nomor HP")));
        assert!(errors.iter().any(|e| e.contains("NIK")));
        assert!(errors.iter().any(|e| e.contains("TPS")));
    }

    #[tokio::test]
    async fn test_unknown_village_reports_resolved_parent() {
        let store = Arc::new(MemoryRosterStore::new());
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::Volunteer);

        let rows = vec![volunteer_row(
            "Budi Santoso",
            "3175061204900003",
            "081234567890",
            "Kampung Hilang",
            "17",
        )];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.failed.len(), 1);
        let message = &report.failed[0].errors[0];
        assert!(message.contains("Kelurahan/Desa 'Kampung Hilang'"));
        assert!(message.contains("Kecamatan 'PULO GADUNG'"));
    }

    #[tokio::test]
    async fn test_coordinator_quota_full_village_rejects() {
        // Village already holds two active coordinators.
        let store = Arc::new(MemoryRosterStore::new());
        store.seed(
            RosterRole::VillageCoordinator,
            "Kordes Satu",
            "3175061204900101",
            "081200000101",
            "kordes.satu101",
            "3175021",
            false,
        );
        store.seed(
            RosterRole::VillageCoordinator,
            "Kordes Dua",
            "3175061204900102",
            "081200000102",
            "kordes.dua102",
            "3175021",
            false,
        );
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::VillageCoordinator);

        let rows = vec![volunteer_row(
            "Kordes Tiga",
            "3175061204900103",
            "081200000103",
            "Jati",
            "",
        )];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.success_count, 0);
        assert!(report.failed[0].errors[0].contains("Kuota Koordinator Desa untuk JATI"));
        assert!(report.failed[0].errors[0].contains("(2/2)"));
    }

    #[tokio::test]
    async fn test_coordinator_quota_fills_within_one_batch() {
        // Empty village, three coordinator rows: two pass, third rejected.
        let store = Arc::new(MemoryRosterStore::new());
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::VillageCoordinator);

        let rows = vec![
            volunteer_row("Kordes Satu", "3175061204900101", "081200000101", "Jati", ""),
            volunteer_row("Kordes Dua", "3175061204900102", "081200000102", "Jati", ""),
            volunteer_row("Kordes Tiga", "3175061204900103", "081200000103", "Jati", ""),
        ];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].row_ordinal, 4);
        assert!(report.failed[0].errors[0].contains("sudah penuh"));
        assert_eq!(store.active_count(RosterRole::VillageCoordinator, "3175021"), 2);
    }

    #[tokio::test]
    async fn test_empty_coordinator_tps_gets_sentinel() {
        let store = Arc::new(MemoryRosterStore::new());
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::ApkCoordinator);

        let rows = vec![volunteer_row(
            "Kordes Satu",
            "3175061204900101",
            "081200000101",
            "Jati",
            "",
        )];
        let report = importer.run(&variant, &headers(), &rows).await;
        assert_eq!(report.success_count, 1);
    }

    #[tokio::test]
    async fn test_soft_deleted_identity_is_reactivated() {
        let store = Arc::new(MemoryRosterStore::new());
        store.seed(
            RosterRole::Volunteer,
            "Budi Santoso",
            "3175061204900003",
            "081234567890",
            "budi.santoso831",
            "3175021",
            true,
        );
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::Volunteer);

        let rows = vec![volunteer_row(
            "Budi Santoso",
            "3175061204900003",
            "081234567890",
            "Jati",
            "17",
        )];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.success_count, 1);
        assert!(report.created[0].reactivated);
        assert_eq!(report.created[0].login_handle, "budi.santoso831");
        // No second record was created.
        assert_eq!(store.active_nik_counts()["3175061204900003"], 1);
    }

    #[tokio::test]
    async fn test_reactivation_counts_against_row_village_quota() {
        // JATI is full (2 active coordinators); a third coordinator for
        // JATI exists only as a soft-deleted record. Reactivating them
        // into JATI must be rejected, and reactivating them into another
        // village must leave JATI at its ceiling.
        let store = Arc::new(MemoryRosterStore::new());
        store.seed(
            RosterRole::VillageCoordinator,
            "Kordes Satu",
            "3175061204900101",
            "081200000101",
            "kordes.satu101",
            "3175021",
            false,
        );
        store.seed(
            RosterRole::VillageCoordinator,
            "Kordes Dua",
            "3175061204900102",
            "081200000102",
            "kordes.dua102",
            "3175021",
            false,
        );
        store.seed(
            RosterRole::VillageCoordinator,
            "Kordes Lama",
            "3175061204900103",
            "081200000103",
            "kordes.lama103",
            "3175021",
            true,
        );
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::VillageCoordinator);

        let into_full = vec![volunteer_row(
            "Kordes Lama",
            "3175061204900103",
            "081200000103",
            "Jati",
            "",
        )];
        let report = importer.run(&variant, &headers(), &into_full).await;
        assert_eq!(report.success_count, 0);
        assert!(report.failed[0].errors[0].contains("sudah penuh"));
        assert_eq!(store.active_count(RosterRole::VillageCoordinator, "3175021"), 2);

        let into_other = vec![volunteer_row(
            "Kordes Lama",
            "3175061204900103",
            "081200000103",
            "Rawamangun",
            "",
        )];
        let report = importer.run(&variant, &headers(), &into_other).await;
        assert_eq!(report.success_count, 1);
        assert!(report.created[0].reactivated);
        assert_eq!(store.active_count(RosterRole::VillageCoordinator, "3175021"), 2);
        assert_eq!(store.active_count(RosterRole::VillageCoordinator, "3175022"), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_row_local() {
        let store = Arc::new(MemoryRosterStore::new());
        store.fail_next_create("koneksi terputus");
        let importer = importer(Arc::clone(&store));
        let variant = ImportVariant::for_role(RosterRole::Volunteer);

        let rows = vec![
            volunteer_row("Budi Santoso", "3175061204900003", "081234567890", "Jati", "17"),
            volunteer_row("Siti Aminah", "3175064505910002", "081234567891", "Jati", "18"),
        ];
        let report = importer.run(&variant, &headers(), &rows).await;

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].errors[0].contains("Kesalahan sistem"));
        // The batch kept going.
        assert_eq!(report.success_count, 1);
        assert_eq!(report.created[0].display_name, "Siti Aminah");
    }
}
