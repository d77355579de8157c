use anyhow::anyhow;
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
/// Seconds per time step.
pub const STEP: u64 = 30;
/// Neighbouring steps accepted on either side of the current one.
const SKEW: u64 = 1;

/// A freshly generated second-factor secret and its `otpauth://` URI.
#[derive(Debug, Clone)]
pub struct Provisioning {
    pub secret_base32: String,
    pub uri: String,
}

/// TOTP helper bound to the issuer label shown in authenticator apps.
#[derive(Debug, Clone)]
pub struct Authenticator {
    issuer: String,
}

impl Authenticator {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    fn totp(&self, secret: Vec<u8>, account: &str) -> anyhow::Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            0,
            STEP,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }

    fn totp_from_base32(&self, secret_base32: &str, account: &str) -> anyhow::Result<TOTP> {
        let bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("invalid TOTP secret: {e:?}"))?;
        self.totp(bytes, account)
    }

    /// Generates a new random secret for `email`.
    pub fn provision(&self, email: &str) -> anyhow::Result<Provisioning> {
        let bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| anyhow!("Secret gen error: {e:?}"))?;
        let secret_base32 = self.totp(bytes, email)?.get_secret_base32();
        let uri = format!(
            "otpauth://totp/{issuer}:{email}?secret={secret_base32}&issuer={issuer}",
            issuer = self.issuer,
        );
        Ok(Provisioning { secret_base32, uri })
    }

    /// Returns the time step `code` belongs to, if it is valid at `unix_time`
    /// within the accepted skew.
    pub fn matching_step(
        &self,
        secret_base32: &str,
        email: &str,
        code: &str,
        unix_time: u64,
    ) -> anyhow::Result<Option<u64>> {
        let code = code.trim();
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(None);
        }
        let totp = self.totp_from_base32(secret_base32, email)?;
        let current = unix_time / STEP;
        Ok((current.saturating_sub(SKEW)..=current + SKEW).find(|s| totp.check(code, s * STEP)))
    }

    /// Code for `unix_time`; used by clients in tests.
    #[cfg(test)]
    pub fn code_at(&self, secret_base32: &str, email: &str, unix_time: u64) -> String {
        self.totp_from_base32(secret_base32, email)
            .expect("valid secret")
            .generate(unix_time)
    }
}
