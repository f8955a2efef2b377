//! Geographic reference types
//!
//! The administrative hierarchy is province → city/regency → district →
//! village. Each level is keyed by the official BPS-style code; a child's
//! `parent_code` always points at the code of the level above it.

use serde::{Deserialize, Serialize};

/// Administrative level, resolved top-down.
///
/// An explicit enum so the resolver and the alias tables dispatch on the
/// level instead of on record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    Province,
    City,
    District,
    Village,
}

impl RegionLevel {
    /// Indonesian display label used in operator-facing error messages.
    pub fn label(&self) -> &'static str {
        match self {
            RegionLevel::Province => "Provinsi",
            RegionLevel::City => "Kota/Kabupaten",
            RegionLevel::District => "Kecamatan",
            RegionLevel::Village => "Kelurahan/Desa",
        }
    }

    /// The level above this one, if any.
    pub fn parent(&self) -> Option<RegionLevel> {
        match self {
            RegionLevel::Province => None,
            RegionLevel::City => Some(RegionLevel::Province),
            RegionLevel::District => Some(RegionLevel::City),
            RegionLevel::Village => Some(RegionLevel::District),
        }
    }
}

/// A resolved geographic unit: canonical code and registry display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRef {
    pub code: String,
    pub name: String,
}

impl RegionRef {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Fully resolved location for one roster row, all four levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedArea {
    pub province: RegionRef,
    pub city: RegionRef,
    pub district: RegionRef,
    pub village: RegionRef,
}
