//! DVSNI challenge validation.
//!
//! Opens a TLS connection whose SNI carries the challenge nonce and checks
//! that the peer's leaf certificate names the challenge-derived
//! `{hex(SHA-256(R ‖ S))}.acme.invalid` among its DNS SANs.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::aws_lc_rs;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::parse_x509_certificate;

use super::{dnssec_precheck, reject, ValidationOutcome};
use crate::audit::AuditLogger;
use crate::authority::VaConfig;
use crate::problem::{classify_connection_error, ProblemDetails, ProblemType};
use crate::resolver::DnsResolver;
use crate::types::{Challenge, Identifier};

const DVSNI_SUFFIX: &str = ".acme.invalid";
const DVSNI_PORT: u16 = 443;
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[allow(clippy::too_many_arguments)]
pub(crate) async fn validate(
    resolver: &dyn DnsResolver,
    config: &VaConfig,
    log: &dyn AuditLogger,
    identifier: &Identifier,
    mut challenge: Challenge,
    nonce: &str,
    r_b64: &str,
    s_b64: &str,
) -> ValidationOutcome {
    if !identifier.is_dns() {
        return reject(
            challenge,
            log,
            ProblemDetails::malformed("identifier type for DVSNI was not DNS"),
        );
    }

    let Ok(r) = URL_SAFE_NO_PAD.decode(r_b64) else {
        return reject(
            challenge,
            log,
            ProblemDetails::malformed("failed to decode R value from DVSNI challenge"),
        );
    };
    let Ok(s) = URL_SAFE_NO_PAD.decode(s_b64) else {
        return reject(
            challenge,
            log,
            ProblemDetails::malformed("failed to decode S value from DVSNI challenge"),
        );
    };

    let nonce_name = format!("{nonce}{DVSNI_SUFFIX}");
    let expected_san = z_name(&r, &s);

    if let Err(problem) = dnssec_precheck(resolver, &identifier.value).await {
        log.debug(&format!("DVSNI [{identifier}] DNS failure: {problem}"));
        let detail = problem.to_string();
        challenge.fail(problem);
        return (challenge, Some(detail));
    }

    let server_name = match ServerName::try_from(nonce_name.clone()) {
        Ok(name) => name,
        Err(_) => {
            return reject(
                challenge,
                log,
                ProblemDetails::malformed("DVSNI nonce does not form a valid SNI host name"),
            );
        }
    };

    let host_port = if config.test_mode {
        config.test_addr.to_string()
    } else {
        format!("{}:{DVSNI_PORT}", identifier.value)
    };

    log.notice(&format!(
        "DVSNI [{identifier}] attempting to validate for {host_port} {expected_san}"
    ));

    let tls_config = match insecure_client_config() {
        Ok(tls_config) => tls_config,
        Err(e) => {
            return reject(
                challenge,
                log,
                ProblemDetails::server_internal(format!("failed to build TLS configuration: {e}")),
            );
        }
    };
    let connector = TlsConnector::from(Arc::new(tls_config));

    let connect = async {
        let tcp = TcpStream::connect(&host_port).await?;
        connector.connect(server_name, tcp).await
    };
    let stream = match timeout(DIAL_TIMEOUT, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            let problem = ProblemDetails::new(
                classify_connection_error(&e),
                "failed to connect to host for DVSNI challenge",
            );
            log.debug(&format!("DVSNI [{identifier}] TLS connection failure: {e}"));
            let detail = problem.to_string();
            challenge.fail(problem);
            return (challenge, Some(detail));
        }
        Err(_) => {
            return reject(
                challenge,
                log,
                ProblemDetails::new(
                    ProblemType::Connection,
                    format!("timed out connecting to {host_port}"),
                ),
            );
        }
    };

    let (_, session) = stream.get_ref();
    let outcome = match session.peer_certificates().and_then(|certs| certs.first()) {
        None => reject(
            challenge,
            log,
            ProblemDetails::unauthorized("no certificates presented for DVSNI challenge"),
        ),
        Some(leaf) if !san_matches(leaf, &expected_san) => reject(
            challenge,
            log,
            ProblemDetails::unauthorized("correct zName not found for DVSNI challenge"),
        ),
        Some(_) => {
            challenge.pass();
            (challenge, None)
        }
    };
    drop(stream);
    outcome
}

/// Derive the expected SAN: exactly 64 lowercase hex characters of
/// SHA-256(R ‖ S), under the DVSNI suffix.
fn z_name(r: &[u8], s: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(r);
    hasher.update(s);
    let digest = hasher.finalize();
    let mut name = String::with_capacity(digest.len() * 2 + DVSNI_SUFFIX.len());
    for byte in digest {
        name.push_str(&format!("{byte:02x}"));
    }
    name.push_str(DVSNI_SUFFIX);
    name
}

/// True when the leaf certificate carries a dNSName SAN equal to
/// `expected`, compared in constant time.
fn san_matches(leaf: &CertificateDer<'_>, expected: &str) -> bool {
    let Ok((_, cert)) = parse_x509_certificate(leaf.as_ref()) else {
        return false;
    };
    let mut matched = false;
    for extension in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = extension.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns_name) = name {
                    matched |= bool::from(dns_name.as_bytes().ct_eq(expected.as_bytes()));
                }
            }
        }
    }
    matched
}

/// TLS configuration that records the peer chain without verifying it; the
/// peer being validated has no trusted certificate yet.
fn insecure_client_config() -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    Ok(ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier { provider }))
        .with_no_client_auth())
}

#[derive(Debug)]
struct InsecureVerifier {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
