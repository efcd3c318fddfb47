//! DNS-01 challenge validation.
//!
//! Looks for the challenge token among the TXT records published at
//! `_acme-challenge.{identifier}`.

use subtle::ConstantTimeEq;

use super::{reject, ValidationOutcome};
use crate::audit::AuditLogger;
use crate::problem::ProblemDetails;
use crate::resolver::{DnsError, DnsResolver};
use crate::types::{Challenge, Identifier};

const CHALLENGE_PREFIX: &str = "_acme-challenge";

pub(crate) async fn validate(
    resolver: &dyn DnsResolver,
    log: &dyn AuditLogger,
    identifier: &Identifier,
    mut challenge: Challenge,
) -> ValidationOutcome {
    if !identifier.is_dns() {
        return reject(
            challenge,
            log,
            ProblemDetails::malformed("identifier type for DNS challenge was not DNS"),
        );
    }

    let subdomain = format!("{CHALLENGE_PREFIX}.{}", identifier.value);
    let (txts, _) = match resolver.lookup_txt(&subdomain).await {
        Ok(result) => result,
        Err(err) => {
            let problem = match &err {
                DnsError::Dnssec { .. } => ProblemDetails::dnssec(err.to_string()),
                DnsError::Communication { .. } => {
                    ProblemDetails::server_internal("unable to communicate with DNS server")
                }
            };
            log.debug(&format!("DNS [{identifier}] DNS failure: {err}"));
            let detail = problem.to_string();
            challenge.fail(problem);
            return (challenge, Some(detail));
        }
    };

    let expected = challenge.token.clone();
    if txts
        .iter()
        .any(|txt| bool::from(txt.as_bytes().ct_eq(expected.as_bytes())))
    {
        challenge.pass();
        return (challenge, None);
    }

    reject(
        challenge,
        log,
        ProblemDetails::unauthorized("correct value not found for DNS challenge"),
    )
}
