//! ACME account identity.
//!
//! Binds a local P-256 key pair to a remote account (the `kid` URL the server
//! assigns). The key is what every key authorization is derived from; the
//! rest of the account is bookkeeping refreshed after protocol round trips.

use base64::prelude::*;
use eyre::WrapErr as _;
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use time::OffsetDateTime;
use zeroize::Zeroizing;

use crate::api;

/// The account's elliptic curve key pair.
///
/// P-256, same as the signing key the transport collaborator uses for JWS.
/// The public key thumbprint feeds into every challenge's key authorization.
#[derive(Clone, Debug)]
pub struct AccountKey {
    signing_key: p256::ecdsa::SigningKey,
}

impl AccountKey {
    /// Generate a fresh random key.
    pub fn generate() -> AccountKey {
        let csprng = &mut rand::thread_rng();
        AccountKey {
            signing_key: ecdsa::SigningKey::from(p256::SecretKey::random(csprng)),
        }
    }

    /// Load a key from PKCS#8 PEM.
    pub fn from_pem(pem: &str) -> eyre::Result<AccountKey> {
        let signing_key = ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(pem)
            .context("failed to read account key PEM")?;
        Ok(AccountKey { signing_key })
    }

    /// The key in PKCS#8 PEM format.
    pub fn to_pem(&self) -> eyre::Result<Zeroizing<String>> {
        self.signing_key
            .to_pkcs8_pem(der::pem::LineEnding::LF)
            .context("account key to PEM")
    }

    pub fn signing_key(&self) -> &p256::ecdsa::SigningKey {
        &self.signing_key
    }

    /// RFC 7638 JWK thumbprint, base64url encoded.
    pub fn thumbprint(&self) -> eyre::Result<String> {
        // Lexical order of the fields matters for the digest.
        #[derive(Serialize)]
        struct JwkThumb<'a> {
            crv: &'a str,
            kty: &'a str,
            x: String,
            y: String,
        }

        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| eyre::eyre!("missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| eyre::eyre!("missing y coordinate"))?;

        let jwk = JwkThumb {
            crv: "P-256",
            kty: "EC",
            x: BASE64_URL_SAFE_NO_PAD.encode(x),
            y: BASE64_URL_SAFE_NO_PAD.encode(y),
        };

        let jwk_json = serde_json::to_string(&jwk)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(jwk_json)))
    }

    /// Key authorization for a challenge token: `<token>.<thumbprint>`.
    ///
    /// This is the value an HTTP-01 responder serves verbatim; the DNS-01
    /// record value is a further digest of it (see
    /// [`crate::challenge::dns01_txt_value`]).
    pub fn key_authorization(&self, token: &str) -> eyre::Result<String> {
        Ok(format!("{token}.{}", self.thumbprint()?))
    }
}

/// Local representation of a remote ACME account.
///
/// Created once per operator identity. Only [`Account::refresh_from`]
/// mutates it, and only with what the server reported.
#[derive(Clone, Debug)]
pub struct Account {
    key: AccountKey,
    /// Remote account URL, used as the JWS `kid` by the transport.
    kid: Option<String>,
    status: Option<api::AccountStatus>,
    contact: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl Account {
    /// A new local account with `contact` email, not yet bound to a remote
    /// identity.
    pub fn new(key: AccountKey, contact: Option<String>) -> Account {
        let now = OffsetDateTime::now_utc();
        Account {
            key,
            kid: None,
            status: None,
            contact,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    /// Remote account URL, once known.
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn status(&self) -> Option<api::AccountStatus> {
        self.status
    }

    pub fn contact(&self) -> Option<&str> {
        self.contact.as_deref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    /// Update kid/status from a successful account round trip.
    pub fn refresh_from(&mut self, api_account: &api::Account, kid: String) {
        self.kid = Some(kid);
        self.status = Some(api_account.status);
        self.updated_at = OffsetDateTime::now_utc();
    }
}
