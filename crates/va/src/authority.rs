//! The validation authority: dispatches challenge validation and answers
//! CAA queries for the configured issuer.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::Jwk;
use thiserror::Error;

use crate::audit::{AuditLogger, ValidationRecord};
use crate::caa::{check_caa, CaaOutcome};
use crate::problem::ProblemDetails;
use crate::resolver::{DnsError, DnsResolver};
use crate::suffix::PublicSuffixSet;
use crate::types::{Authorization, ChallengeParams, Identifier};
use crate::validate;

/// Validation authority configuration.
#[derive(Debug, Clone)]
pub struct VaConfig {
    /// Issuer identity expected in matching CAA records.
    pub issuer_domain: String,
    /// Rewrite network targets to `test_addr`; SimpleHTTP additionally
    /// forces plain HTTP. Logical identifiers used in payload and SAN
    /// comparisons are never rewritten.
    pub test_mode: bool,
    /// Where rewritten connections go in test mode.
    pub test_addr: SocketAddr,
}

impl VaConfig {
    pub fn new(issuer_domain: impl Into<String>) -> Self {
        Self {
            issuer_domain: issuer_domain.into(),
            test_mode: false,
            test_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 5001)),
        }
    }

    pub fn test_mode(issuer_domain: impl Into<String>) -> Self {
        Self {
            test_mode: true,
            ..Self::new(issuer_domain)
        }
    }
}

/// Callback surface of the registration authority.
#[async_trait]
pub trait RegistrationAuthority: Send + Sync {
    /// Receive the authorization after a validation attempt concludes.
    /// Called exactly once per attempt, whatever the outcome.
    async fn on_validation_update(&self, authz: Authorization);
}

/// Errors surfaced synchronously by the validation authority.
#[derive(Debug, Error)]
pub enum VaError {
    #[error("challenge index {index} out of range for authorization '{id}' ({count} challenges)")]
    BadChallengeIndex {
        id: String,
        index: usize,
        count: usize,
    },

    #[error(transparent)]
    Dns(#[from] DnsError),
}

/// Executes challenges and CAA checks.
///
/// Cheap to clone: every collaborator is a shared handle that must be safe
/// for concurrent use. The authority itself keeps no mutable state; each
/// validation task owns its authorization for the duration of the attempt.
#[derive(Clone)]
pub struct ValidationAuthority {
    resolver: Arc<dyn DnsResolver>,
    ra: Arc<dyn RegistrationAuthority>,
    log: Arc<dyn AuditLogger>,
    public_suffixes: Arc<PublicSuffixSet>,
    config: VaConfig,
}

impl fmt::Debug for ValidationAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationAuthority")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ValidationAuthority {
    /// Create an authority and announce it.
    pub fn new(
        config: VaConfig,
        resolver: Arc<dyn DnsResolver>,
        ra: Arc<dyn RegistrationAuthority>,
        log: Arc<dyn AuditLogger>,
        public_suffixes: Arc<PublicSuffixSet>,
    ) -> Self {
        log.notice("validation authority starting");
        Self {
            resolver,
            ra,
            log,
            public_suffixes,
            config,
        }
    }

    pub fn config(&self) -> &VaConfig {
        &self.config
    }

    /// Kick off validation of the indexed challenge and return immediately.
    ///
    /// The attempt runs in its own task; its outcome is reported through the
    /// audit log and the registration authority callback, never to the
    /// caller. Exactly one audit record and one RA callback occur per
    /// accepted invocation. Must be called within a Tokio runtime.
    pub fn update_validations(
        &self,
        authz: Authorization,
        challenge_index: usize,
        account_key: Jwk,
    ) -> Result<(), VaError> {
        if challenge_index >= authz.challenges.len() {
            return Err(VaError::BadChallengeIndex {
                count: authz.challenges.len(),
                id: authz.id,
                index: challenge_index,
            });
        }
        let this = self.clone();
        tokio::spawn(async move { this.validate(authz, challenge_index, account_key).await });
        Ok(())
    }

    /// Check whether CAA records permit the configured issuer to sign for
    /// `identifier`.
    pub async fn check_caa_records(&self, identifier: &Identifier) -> Result<CaaOutcome, VaError> {
        let domain = identifier.value.to_ascii_lowercase();
        let outcome = check_caa(
            self.resolver.as_ref(),
            &self.public_suffixes,
            &domain,
            &self.config.issuer_domain,
        )
        .await?;
        Ok(outcome)
    }

    async fn validate(&self, mut authz: Authorization, challenge_index: usize, account_key: Jwk) {
        let mut record = ValidationRecord::start(authz.id.as_str(), authz.registration_id);
        let identifier = authz.identifier.clone();
        let challenge = authz.challenges[challenge_index].clone();

        let outcome = match challenge.params.clone() {
            ChallengeParams::Unknown => {
                // Unrecognized type: the challenge stays untouched; the
                // audit record and RA callback still happen.
                self.log.notice(&format!(
                    "skipping unrecognized challenge type for {identifier}"
                ));
                record.challenge = Some(challenge);
                record.error = Some("unrecognized challenge type".to_string());
                None
            }
            _ if !challenge.is_sane() => {
                let mut failed = challenge;
                let problem = ProblemDetails::malformed("challenge failed sanity check");
                let detail = problem.to_string();
                failed.fail(problem);
                Some((failed, Some(detail)))
            }
            ChallengeParams::SimpleHttp { path, tls } => Some(
                validate::simple_http::validate(
                    self.resolver.as_ref(),
                    &self.config,
                    self.log.as_ref(),
                    &identifier,
                    challenge,
                    &path,
                    tls,
                    &account_key,
                )
                .await,
            ),
            ChallengeParams::Dvsni { nonce, r, s } => Some(
                validate::dvsni::validate(
                    self.resolver.as_ref(),
                    &self.config,
                    self.log.as_ref(),
                    &identifier,
                    challenge,
                    &nonce,
                    &r,
                    &s,
                )
                .await,
            ),
            ChallengeParams::Dns => Some(
                validate::dns::validate(
                    self.resolver.as_ref(),
                    self.log.as_ref(),
                    &identifier,
                    challenge,
                )
                .await,
            ),
        };

        if let Some((updated, audit_error)) = outcome {
            authz.challenges[challenge_index] = updated.clone();
            record.challenge = Some(updated);
            record.error = audit_error;
        }
        record.response_time = Some(Utc::now());

        self.log.audit_object("validation result", &record);
        self.log.notice(&format!(
            "validation of challenge {challenge_index} for authorization '{}' complete",
            authz.id
        ));
        self.ra.on_validation_update(authz).await;
    }
}
