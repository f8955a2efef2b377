//! Header mapper
//!
//! Field coordinators mail in sheets with wildly inconsistent column
//! titles ("No HP / WA", "NIK KTP", "Kel/Desa", ...). Each canonical field
//! carries a list of lowercase substrings; the first sheet header that
//! contains one of them wins. A header can satisfy at most one field,
//! scanned in field-declaration order. Pure function of the header set.

use std::collections::HashMap;

use crate::types::{Field, ImportError};

/// Lowercase substrings recognized as a field's header. Static
/// configuration, immutable at runtime.
fn aliases(field: Field) -> &'static [&'static str] {
    match field {
        Field::Name => &["nama"],
        Field::Nik => &["nik", "no ktp", "no. ktp", "nomor induk"],
        Field::Phone => &["hp", "telp", "telepon", "whatsapp", "wa"],
        Field::Province => &["provinsi", "prov"],
        Field::City => &["kota", "kabupaten", "kab"],
        Field::District => &["kecamatan", "kec"],
        Field::Village => &["kelurahan", "desa", "kel"],
        Field::Tps => &["tps"],
    }
}

/// Result of mapping one sheet's header row: canonical field → column index.
#[derive(Debug, Clone, Default)]
pub struct HeaderMapping {
    columns: HashMap<Field, usize>,
}

impl HeaderMapping {
    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Checks that every required field found a header. The error names the
    /// display labels of everything that is missing.
    pub fn require(&self, required: &[Field]) -> Result<(), ImportError> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|f| !self.columns.contains_key(f))
            .map(|f| f.label())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ImportError::MissingRequiredHeader {
                labels: missing.join(", "),
            })
        }
    }
}

/// Map sheet headers onto canonical fields.
///
/// Fields are scanned in `Field::ALL` order; for each field the first
/// not-yet-claimed header containing one of its aliases is taken.
pub fn map_headers(headers: &[String]) -> HeaderMapping {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut claimed = vec![false; headers.len()];
    let mut columns = HashMap::new();

    for field in Field::ALL {
        'search: for (idx, header) in lowered.iter().enumerate() {
            if claimed[idx] || header.is_empty() {
                continue;
            }
            for alias in aliases(field) {
                if header.contains(alias) {
                    columns.insert(field, idx);
                    claimed[idx] = true;
                    break 'search;
                }
            }
        }
    }

    HeaderMapping { columns }
}
