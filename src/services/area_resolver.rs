//! Location resolver
//!
//! Source sheets carry free-text region names with inconsistent
//! capitalization, abbreviations and administrative-prefix variants
//! ("Kota Jakarta Timur" vs. the registry's "JAKARTA TIMUR"). Exact-only
//! matching would reject a large share of legitimate rows, so each level
//! goes through: normalize → alias substitution → directory lookup with
//! an exact/prefix/substring cascade, restricted to the resolved parent.
//!
//! Resolution is strictly top-down; a failed level stops the levels below
//! it and the error names the level plus the resolved parent.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::types::{ImportError, LocationNotFound, RegionLevel, RegionRef, ResolvedArea};

/// Minimum search-string length before the substring fallback is tried.
/// Short fragments ("UT", "KOT") produce too many false positives.
const SUBSTRING_MIN_LEN: usize = 4;

/// Directory over the pre-populated geographic reference tables.
///
/// `resolve` applies the exact → prefix → substring cascade against the
/// level's table, restricted to `parent_code` (ignored for provinces).
/// The search string is already normalized and alias-corrected.
#[async_trait]
pub trait RegionDirectory: Send + Sync {
    async fn resolve(
        &self,
        level: RegionLevel,
        search: &str,
        parent_code: Option<&str>,
    ) -> Result<Option<RegionRef>>;

    /// Name of this directory implementation.
    fn name(&self) -> &'static str;
}

// =============================================================================
// ALIAS TABLES
// =============================================================================

/// Per-level spelling/format corrections applied before lookup. These
/// pre-correct common variants only; the reference tables stay
/// authoritative. Loaded once, read-only.
static PROVINCE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("DKI", "DKI JAKARTA"),
        ("JAKARTA", "DKI JAKARTA"),
        ("JABAR", "JAWA BARAT"),
        ("JATENG", "JAWA TENGAH"),
        ("JATIM", "JAWA TIMUR"),
        ("DIY", "DI YOGYAKARTA"),
        ("JOGJA", "DI YOGYAKARTA"),
        ("YOGYAKARTA", "DI YOGYAKARTA"),
    ])
});

static CITY_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("JAKTIM", "JAKARTA TIMUR"),
        ("JAKBAR", "JAKARTA BARAT"),
        ("JAKSEL", "JAKARTA SELATAN"),
        ("JAKUT", "JAKARTA UTARA"),
        ("JAKPUS", "JAKARTA PUSAT"),
        ("KOTA JAKARTA TIMUR", "JAKARTA TIMUR"),
        ("KOTA JAKARTA BARAT", "JAKARTA BARAT"),
        ("KOTA JAKARTA SELATAN", "JAKARTA SELATAN"),
        ("KOTA JAKARTA UTARA", "JAKARTA UTARA"),
        ("KOTA JAKARTA PUSAT", "JAKARTA PUSAT"),
    ])
});

static DISTRICT_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // Registry spelling differs from everyday usage by one letter.
        ("GROGOL PETAMBURAN", "GROGOL PERTAMBURAN"),
        ("SETIABUDI", "SETIA BUDI"),
        ("PULOGADUNG", "PULO GADUNG"),
    ])
});

static VILLAGE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("PAL MERIAM", "PALMERIAM"),
        ("BALIMESTER", "BALI MESTER"),
    ])
});

fn alias_table(level: RegionLevel) -> &'static HashMap<&'static str, &'static str> {
    match level {
        RegionLevel::Province => &PROVINCE_ALIASES,
        RegionLevel::City => &CITY_ALIASES,
        RegionLevel::District => &DISTRICT_ALIASES,
        RegionLevel::Village => &VILLAGE_ALIASES,
    }
}

/// Uppercase, collapse internal whitespace, trim.
pub fn normalize_region_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Free-text region names from one roster row, province down to village.
#[derive(Debug, Clone)]
pub struct AreaInput {
    pub province: String,
    pub city: String,
    pub district: String,
    pub village: String,
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Cascading resolver over a [`RegionDirectory`].
pub struct AreaResolver {
    directory: Arc<dyn RegionDirectory>,
}

impl AreaResolver {
    pub fn new(directory: Arc<dyn RegionDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve all four levels top-down. The first failed level aborts
    /// the rest and reports the resolved parent when one exists.
    pub async fn resolve(&self, input: &AreaInput) -> Result<ResolvedArea, ImportError> {
        let province = self
            .resolve_level(RegionLevel::Province, &input.province, None)
            .await?;
        let city = self
            .resolve_level(RegionLevel::City, &input.city, Some(&province))
            .await?;
        let district = self
            .resolve_level(RegionLevel::District, &input.district, Some(&city))
            .await?;
        let village = self
            .resolve_level(RegionLevel::Village, &input.village, Some(&district))
            .await?;

        Ok(ResolvedArea {
            province,
            city,
            district,
            village,
        })
    }

    async fn resolve_level(
        &self,
        level: RegionLevel,
        raw: &str,
        parent: Option<&RegionRef>,
    ) -> Result<RegionRef, ImportError> {
        let normalized = normalize_region_name(raw);
        let search = alias_table(level)
            .get(normalized.as_str())
            .map(|canonical| canonical.to_string())
            .unwrap_or(normalized);

        let not_found = || {
            ImportError::LocationNotFound(LocationNotFound {
                level,
                input: raw.trim().to_string(),
                parent: parent.map(|p| p.name.clone()),
            })
        };

        if search.is_empty() {
            return Err(not_found());
        }

        let parent_code = parent.map(|p| p.code.as_str());
        match self.directory.resolve(level, &search, parent_code).await {
            Ok(Some(region)) => Ok(region),
            Ok(None) => Err(not_found()),
            Err(e) => Err(ImportError::SystemError {
                message: e.to_string(),
            }),
        }
    }
}

/// The matching cascade over an in-memory candidate set: exact equality
/// first, then prefix, then substring (only for searches of at least
/// [`SUBSTRING_MIN_LEN`] characters). First hit wins. The Postgres
/// directory runs the same cascade as three ordered queries.
pub fn cascade_match(search: &str, candidates: &[RegionRef]) -> Option<RegionRef> {
    if let Some(hit) = candidates.iter().find(|r| r.name.to_uppercase() == search) {
        return Some(hit.clone());
    }
    if let Some(hit) = candidates
        .iter()
        .find(|r| r.name.to_uppercase().starts_with(search))
    {
        return Some(hit.clone());
    }
    if search.len() >= SUBSTRING_MIN_LEN {
        if let Some(hit) = candidates
            .iter()
            .find(|r| r.name.to_uppercase().contains(search))
        {
            return Some(hit.clone());
        }
    }
    None
}
