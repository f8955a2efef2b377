//! Roster import types: canonical fields, import variants, row errors
//! and the batch report returned to the administrator UI.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::region::RegionLevel;

// =============================================================================
// CANONICAL FIELDS
// =============================================================================

/// Canonical spreadsheet fields recognized by the header mapper.
///
/// `ALL` fixes the declaration order; header mapping scans fields in this
/// order and lets each sheet header satisfy at most one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Nik,
    Phone,
    Province,
    City,
    District,
    Village,
    Tps,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Name,
        Field::Nik,
        Field::Phone,
        Field::Province,
        Field::City,
        Field::District,
        Field::Village,
        Field::Tps,
    ];

    /// Display label shown in error messages when a header is missing.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "Nama",
            Field::Nik => "NIK",
            Field::Phone => "No. HP",
            Field::Province => "Provinsi",
            Field::City => "Kota/Kabupaten",
            Field::District => "Kecamatan",
            Field::Village => "Kelurahan/Desa",
            Field::Tps => "TPS",
        }
    }
}

// =============================================================================
// ROLES AND IMPORT VARIANTS
// =============================================================================

/// Field-worker role, one roster table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterRole {
    VillageCoordinator,
    ApkCoordinator,
    Volunteer,
}

impl RosterRole {
    pub const ALL: [RosterRole; 3] = [
        RosterRole::VillageCoordinator,
        RosterRole::ApkCoordinator,
        RosterRole::Volunteer,
    ];

    /// Indonesian display label.
    pub fn label(&self) -> &'static str {
        match self {
            RosterRole::VillageCoordinator => "Koordinator Desa",
            RosterRole::ApkCoordinator => "Koordinator APK",
            RosterRole::Volunteer => "Relawan",
        }
    }

    /// Roster table backing this role.
    pub fn table(&self) -> &'static str {
        match self {
            RosterRole::VillageCoordinator => "village_coordinators",
            RosterRole::ApkCoordinator => "apk_coordinators",
            RosterRole::Volunteer => "volunteers",
        }
    }

    /// Account role string stored on the `users` row.
    pub fn account_role(&self) -> &'static str {
        match self {
            RosterRole::VillageCoordinator | RosterRole::ApkCoordinator => "coordinator",
            RosterRole::Volunteer => "volunteer",
        }
    }
}

/// How an empty TPS cell is treated for a given import variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpsPolicy {
    /// Empty TPS defaults to the `"000"` sentinel (coordinator sheets).
    DefaultSentinel,
    /// Empty TPS rejects the row (volunteer sheets are TPS-scoped).
    Required,
}

/// Per-village headcount ceiling for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VillageQuota {
    pub ceiling: u32,
}

/// Static configuration for one import path: which fields the sheet must
/// carry, the quota rule and the TPS policy.
#[derive(Debug, Clone)]
pub struct ImportVariant {
    pub role: RosterRole,
    pub required: &'static [Field],
    pub quota: Option<VillageQuota>,
    pub tps: TpsPolicy,
}

const COORDINATOR_REQUIRED: &[Field] = &[
    Field::Name,
    Field::Nik,
    Field::Phone,
    Field::Province,
    Field::City,
    Field::District,
    Field::Village,
];

const VOLUNTEER_REQUIRED: &[Field] = &[
    Field::Name,
    Field::Nik,
    Field::Phone,
    Field::Province,
    Field::City,
    Field::District,
    Field::Village,
    Field::Tps,
];

impl ImportVariant {
    /// Variant for a role, with the quotas and TPS policy used in production.
    pub fn for_role(role: RosterRole) -> Self {
        match role {
            RosterRole::VillageCoordinator => Self {
                role,
                required: COORDINATOR_REQUIRED,
                quota: Some(VillageQuota { ceiling: 2 }),
                tps: TpsPolicy::DefaultSentinel,
            },
            RosterRole::ApkCoordinator => Self {
                role,
                required: COORDINATOR_REQUIRED,
                quota: Some(VillageQuota { ceiling: 2 }),
                tps: TpsPolicy::DefaultSentinel,
            },
            RosterRole::Volunteer => Self {
                role,
                required: VOLUNTEER_REQUIRED,
                quota: None,
                tps: TpsPolicy::Required,
            },
        }
    }
}

// =============================================================================
// ROW ERRORS
// =============================================================================

/// Row-local import error. Every variant terminates the current row only;
/// the orchestrator records it and moves on to the next row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImportError {
    #[error("Kolom wajib tidak ditemukan: {labels}")]
    MissingRequiredHeader { labels: String },

    #[error("Kolom {label} wajib diisi")]
    MissingField { label: &'static str },

    #[error("{message}")]
    FieldValidationFailed { message: String },

    #[error("Nomor HP tidak valid: '{value}'")]
    InvalidPhone { value: String },

    #[error("NIK harus 16 digit angka: '{value}'")]
    InvalidNationalId { value: String },

    #[error("{0}")]
    LocationNotFound(LocationNotFound),

    #[error("NIK sudah terdaftar aktif sebagai {existing}")]
    DuplicateNik { existing: String },

    #[error("Nomor HP sudah terdaftar aktif sebagai {existing}")]
    DuplicatePhone { existing: String },

    #[error("Kuota {role} untuk {village} sudah penuh ({count}/{ceiling})")]
    QuotaExceeded {
        role: &'static str,
        village: String,
        count: u32,
        ceiling: u32,
    },

    #[error("Kesalahan sistem: {message}")]
    SystemError { message: String },
}

/// Resolution failure at one level, with the resolved-ancestor context
/// when it is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationNotFound {
    pub level: RegionLevel,
    pub input: String,
    pub parent: Option<String>,
}

impl std::fmt::Display for LocationNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.parent, self.level.parent()) {
            (Some(parent), Some(parent_level)) => write!(
                f,
                "{} '{}' tidak ditemukan di {} '{}'",
                self.level.label(),
                self.input,
                parent_level.label(),
                parent
            ),
            _ => write!(f, "{} '{}' tidak ditemukan", self.level.label(), self.input),
        }
    }
}

// =============================================================================
// ROWS
// =============================================================================

/// One spreadsheet row mapped onto canonical fields.
///
/// `ordinal` is the 1-based position in the source sheet (the header row
/// is row 1, so data rows start at 2), used for error reporting.
#[derive(Debug, Clone)]
pub struct ImportRow {
    pub ordinal: usize,
    values: HashMap<Field, String>,
}

impl ImportRow {
    pub fn new(ordinal: usize, values: HashMap<Field, String>) -> Self {
        Self { ordinal, values }
    }

    /// Trimmed cell value; `None` when the cell is absent or blank.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values
            .get(&field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Best-available display name for report entries.
    pub fn display_name(&self) -> String {
        self.get(Field::Name).unwrap_or("-").to_string()
    }
}

// =============================================================================
// IDENTITY STORE RECORDS
// =============================================================================

/// A record matching a candidate's NIK or phone in some roster table.
#[derive(Debug, Clone)]
pub struct IdentityHit {
    pub role: RosterRole,
    pub record_id: Uuid,
    pub account_id: Uuid,
    pub display_name: String,
    pub login_handle: String,
    /// Soft-delete marker; active records have `deleted == false`.
    pub deleted: bool,
}

/// Everything the store needs to provision one account + roster record
/// as a single unit of work.
#[derive(Debug, Clone)]
pub struct NewRosterRecord {
    pub role: RosterRole,
    pub display_name: String,
    pub nik: String,
    pub phone: String,
    pub tps: String,
    pub province_code: String,
    pub city_code: String,
    pub district_code: String,
    pub village_code: String,
    pub login_handle: String,
    pub password_hash: String,
    /// AES-GCM encrypted copy of the generated password, base64 encoded.
    pub password_enc: String,
}

// =============================================================================
// BATCH REPORT
// =============================================================================

/// NATS payload submitted by the spreadsheet-parsing collaborator:
/// the header row plus data rows as cell values aligned to the headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterImportRequest {
    pub role: RosterRole,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Admin request to re-read the stored generated password of one
/// account, for relaying it to a field worker who lost it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialGetRequest {
    pub account_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialGetResponse {
    pub login_handle: String,
    pub password: String,
}

/// A provisioned row: the only place the plaintext generated password is
/// surfaced. Administrators relay it to the worker out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEntry {
    pub display_name: String,
    pub login_handle: String,
    pub generated_password: String,
    /// True when a soft-deleted identity was reactivated instead of created.
    pub reactivated: bool,
}

/// A rejected row with its human-readable reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntry {
    pub row_ordinal: usize,
    pub display_name: String,
    pub errors: Vec<String>,
}

/// Consolidated result of one import run. Every non-blank input row maps
/// to exactly one entry: a success or a rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success_count: u32,
    pub created: Vec<CreatedEntry>,
    pub failed: Vec<FailedEntry>,
}
