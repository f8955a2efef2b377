//! Authentication utilities: JWT validation, password hashing and the
//! reversible cipher for the admin-visible copy of generated passwords.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::Request;

/// JWT claims issued by the platform's web tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User role (admin, coordinator, volunteer)
    pub role: String,
    /// Issued at (unix timestamp)
    pub iat: usize,
    /// Expiration (unix timestamp)
    pub exp: usize,
}

/// Authentication result from extract_auth
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthInfo {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Validate a JWT token issued by the web tier and return its claims.
/// The worker never issues tokens itself.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("Invalid token: {}", e))?;

    Ok(token_data.claims)
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Extract authentication info from a NATS request. A valid JWT is
/// required; there is no legacy fallback.
pub fn extract_auth<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthInfo> {
    let token = request
        .token
        .as_ref()
        .ok_or_else(|| anyhow!("No authentication provided — JWT token is required"))?;

    let claims = validate_token(token, jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|e| anyhow!("Invalid user_id in token: {}", e))?;

    Ok(AuthInfo {
        user_id,
        role: claims.role,
    })
}

// =============================================================================
// Credential cipher
// =============================================================================

use aes_gcm::aead::{Aead, KeyInit, OsRng as AeadOsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};

/// Nonce size for AES-256-GCM.
const NONCE_LEN: usize = 12;

/// Reversible cipher for generated passwords.
///
/// Import stores an encrypted copy of each generated password so an
/// administrator can re-read and relay it; login itself only ever checks
/// the Argon2 hash. The key is derived from `CREDENTIAL_KEY` with
/// SHA-256; ciphertexts are stored as base64(nonce ‖ ciphertext).
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(key_phrase: &str) -> Self {
        let digest = Sha256::digest(key_phrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| anyhow!("Failed to encrypt credential"))?;

        let mut buf = nonce.to_vec();
        buf.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(buf))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let buf = BASE64
            .decode(encoded)
            .map_err(|e| anyhow!("Invalid credential encoding: {}", e))?;
        if buf.len() <= NONCE_LEN {
            return Err(anyhow!("Credential ciphertext too short"));
        }

        let (nonce, ciphertext) = buf.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt credential"))?;

        String::from_utf8(plaintext).map_err(|e| anyhow!("Credential is not UTF-8: {}", e))
    }
}

// =============================================================================
// Tests
// =============================================================================
