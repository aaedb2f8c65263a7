//! Certificate keys, CSR construction and the issued certificate wrapper.

use std::io::{BufReader, Cursor};

use der::{
    asn1::Ia5String,
    time::{OffsetDateTime, PrimitiveDateTime},
    Decode as _, Encode as _,
};
use eyre::{eyre, WrapErr as _};
use pkcs8::EncodePrivateKey as _;
use x509_cert::{
    builder::{Builder, RequestBuilder as CsrBuilder},
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::Name,
};
use zeroize::Zeroizing;

/// Make a P-256 private key for a certificate.
pub fn create_p256_key() -> p256::ecdsa::SigningKey {
    let csprng = &mut rand::thread_rng();
    ecdsa::SigningKey::from(p256::SecretKey::random(csprng))
}

/// Build a DER-encoded CSR for `domains`, signed with `signer`.
///
/// The first domain becomes the CN; all domains go into a SAN extension.
pub(crate) fn create_csr_der(
    signer: &p256::ecdsa::SigningKey,
    domains: &[&str],
) -> eyre::Result<Vec<u8>> {
    let primary_domain = domains
        .first()
        .ok_or_else(|| eyre!("cannot build a CSR without domains"))?;

    let subject = format!("CN={primary_domain}")
        .parse::<Name>()
        .map_err(|err| eyre!("invalid CSR subject: {err}"))?;

    let mut csr =
        CsrBuilder::new(subject, signer).map_err(|err| eyre!("CSR builder: {err}"))?;

    let san = domains
        .iter()
        .map(|domain| {
            Ia5String::new(domain)
                .map(GeneralName::DnsName)
                .map_err(|err| eyre!("domain '{domain}' not valid in SAN: {err}"))
        })
        .collect::<eyre::Result<Vec<_>>>()?;

    csr.add_extension(&SubjectAltName(san))
        .map_err(|err| eyre!("adding SAN extension: {err}"))?;

    let req = csr
        .build::<p256::ecdsa::DerSignature>()
        .context("build csr")?;

    Ok(req.to_der()?)
}

/// An issued certificate bundled with its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    private_key_pem: Zeroizing<String>,
    certificate_pem: String,
}

impl Certificate {
    pub(crate) fn new(private_key_pem: Zeroizing<String>, certificate_pem: String) -> Self {
        Certificate {
            private_key_pem,
            certificate_pem,
        }
    }

    /// The private key in PEM format.
    pub fn private_key(&self) -> &str {
        &self.private_key_pem
    }

    /// The issued certificate chain in PEM format, end-entity first.
    pub fn certificate(&self) -> &str {
        &self.certificate_pem
    }

    /// The certificate chain as DER blobs, end-entity first.
    pub fn certificate_chain_der(&self) -> eyre::Result<Vec<Vec<u8>>> {
        let mut rdr = BufReader::new(Cursor::new(self.certificate()));

        rustls_pemfile::certs(&mut rdr)
            .map(|res| res.map(|cert| cert.to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// The `notAfter` instant of the end-entity certificate.
    pub fn not_after(&self) -> eyre::Result<OffsetDateTime> {
        let cert_chain = self.certificate_chain_der()?;
        let cert_ee = cert_chain
            .first()
            .ok_or_else(|| eyre!("no certificates in chain"))?;

        let cert = x509_cert::Certificate::from_der(cert_ee)?;

        let not_after = cert.tbs_certificate.validity.not_after.to_date_time();
        let not_after = PrimitiveDateTime::try_from(not_after)
            .map_err(|err| eyre!("notAfter out of range: {err}"))?
            .assume_utc();

        Ok(not_after)
    }

    /// Whole days of validity remaining; negative once expired.
    pub fn valid_days_left(&self) -> eyre::Result<i64> {
        let diff = self.not_after()? - OffsetDateTime::now_utc();
        Ok(diff.whole_days())
    }
}
