//! Provisioning transactor
//!
//! Turns a fully validated candidate into a live account: generates a
//! unique login handle and a random password, hashes and encrypts the
//! password, then asks the store to persist everything as one unit of
//! work. A soft-deleted identity is reactivated under its original
//! handle with fresh credentials instead of being recreated.
//!
//! Store failures here are row-local like every other stage: the row is
//! reported as failed and the batch continues.

use std::sync::Arc;

use rand::Rng;

use crate::auth::{hash_password, CredentialCipher};
use crate::services::store::RosterStore;
use crate::types::{CreatedEntry, IdentityHit, ImportError, NewRosterRecord, ResolvedArea, RosterRole};

/// Attempts before handle generation gives up. With a three-digit suffix
/// space the retry loop only matters for very common names.
const HANDLE_ATTEMPTS: u32 = 20;

const PASSWORD_LEN: usize = 10;

/// Unambiguous alphanumerics — no 0/O, 1/l/I. Passwords are relayed to
/// field workers verbally or over WhatsApp, often retyped from paper.
const PASSWORD_CHARSET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// A row that passed validation, resolution, identity and quota checks.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub role: RosterRole,
    pub display_name: String,
    pub nik: String,
    pub phone: String,
    pub tps: String,
    pub area: ResolvedArea,
}

impl Candidate {
    fn record(
        &self,
        login_handle: String,
        password_hash: String,
        password_enc: String,
    ) -> NewRosterRecord {
        NewRosterRecord {
            role: self.role,
            display_name: self.display_name.clone(),
            nik: self.nik.clone(),
            phone: self.phone.clone(),
            tps: self.tps.clone(),
            province_code: self.area.province.code.clone(),
            city_code: self.area.city.code.clone(),
            district_code: self.area.district.code.clone(),
            village_code: self.area.village.code.clone(),
            login_handle,
            password_hash,
            password_enc,
        }
    }
}

pub struct Provisioner {
    store: Arc<dyn RosterStore>,
    cipher: CredentialCipher,
}

impl Provisioner {
    pub fn new(store: Arc<dyn RosterStore>, cipher: CredentialCipher) -> Self {
        Self { store, cipher }
    }

    /// Provision a fresh identity. Returns the report entry carrying the
    /// plaintext generated password.
    pub async fn create(&self, candidate: &Candidate) -> Result<CreatedEntry, ImportError> {
        let login_handle = self.unique_handle(&candidate.display_name).await?;
        let password = generate_password();
        let (password_hash, password_enc) = self.seal(&password)?;
        let record = candidate.record(login_handle.clone(), password_hash, password_enc);

        self.store.create(&record).await.map_err(system_error)?;

        Ok(CreatedEntry {
            display_name: candidate.display_name.clone(),
            login_handle,
            generated_password: password,
            reactivated: false,
        })
    }

    /// Reactivate a soft-deleted identity with fresh credentials. The
    /// original login handle is kept so returning workers recognize it;
    /// everything else (name, phone, TPS, area) is adopted from the
    /// sheet, so the record reappears in the row's village.
    pub async fn restore(
        &self,
        hit: &IdentityHit,
        candidate: &Candidate,
    ) -> Result<CreatedEntry, ImportError> {
        let password = generate_password();
        let (password_hash, password_enc) = self.seal(&password)?;
        let record = candidate.record(hit.login_handle.clone(), password_hash, password_enc);

        self.store
            .restore(hit, &record)
            .await
            .map_err(system_error)?;

        Ok(CreatedEntry {
            display_name: candidate.display_name.clone(),
            login_handle: hit.login_handle.clone(),
            generated_password: password,
            reactivated: true,
        })
    }

    fn seal(&self, password: &str) -> Result<(String, String), ImportError> {
        let hash = hash_password(password).map_err(system_error)?;
        let enc = self.cipher.encrypt(password).map_err(system_error)?;
        Ok((hash, enc))
    }

    /// Slug of the display name plus a random three-digit suffix, retried
    /// against the store until unused.
    async fn unique_handle(&self, display_name: &str) -> Result<String, ImportError> {
        let slug = slugify(display_name);

        for _ in 0..HANDLE_ATTEMPTS {
            let suffix = rand::thread_rng().gen_range(100..1000);
            let handle = format!("{slug}{suffix}");

            let taken = self
                .store
                .login_handle_exists(&handle)
                .await
                .map_err(system_error)?;
            if !taken {
                return Ok(handle);
            }
        }

        Err(ImportError::SystemError {
            message: format!("Gagal membuat nama pengguna unik untuk '{display_name}'"),
        })
    }
}

fn system_error(e: anyhow::Error) -> ImportError {
    ImportError::SystemError {
        message: e.to_string(),
    }
}

/// Lowercase the first two name words, strip everything that is not
/// alphanumeric, join with a dot. "Budi Santoso Wijaya" → "budi.santoso".
fn slugify(display_name: &str) -> String {
    let words: Vec<String> = display_name
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .take(2)
        .collect();

    if words.is_empty() {
        "pengguna".to_string()
    } else {
        words.join(".")
    }
}

fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LEN)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}
