use argon2::{
    Algorithm, Argon2, Params, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier,
    Version, password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

/// argon2id hashing and verification for stored user credentials.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    decoy_hash: String,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        Self::with_params(19 * 1024, 2, 1) // 19 MiB
    }

    /// Custom cost parameters; `m_cost` is in KiB.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(m_cost);
        builder.t_cost(t_cost);
        builder.p_cost(p_cost);
        let params: Params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut service = Self {
            argon2,
            decoy_hash: String::new(),
        };

        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        service.decoy_hash = service.hash_password(&format!("{secret:?}"))?;
        Ok(service)
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::from)?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on a mismatch; `Err` only when the stored hash is unusable.
    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// Burns the same work as a real verification so a login for an unknown
    /// username takes as long as one with a wrong password.
    pub fn verify_decoy(&self, password: &str) {
        if let Ok(parsed) = PasswordHash::new(&self.decoy_hash) {
            let _ = self.argon2.verify_password(password.as_bytes(), &parsed);
        }
    }
}
