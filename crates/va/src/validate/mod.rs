//! Challenge validators.
//!
//! Each validator consumes the challenge it was handed and returns it with a
//! terminal status. Failures are recorded on the challenge as problem
//! details, alongside a companion detail string destined for the audit
//! record. One attempt, one verdict: nothing here retries.

pub(crate) mod dns;
pub(crate) mod dvsni;
pub(crate) mod simple_http;

use crate::audit::AuditLogger;
use crate::problem::ProblemDetails;
use crate::resolver::{DnsError, DnsResolver};
use crate::types::Challenge;

/// The finished challenge plus the error detail for the audit record.
pub(crate) type ValidationOutcome = (Challenge, Option<String>);

/// Fail `challenge` with `problem`, logging the detail.
pub(crate) fn reject(
    mut challenge: Challenge,
    log: &dyn AuditLogger,
    problem: ProblemDetails,
) -> ValidationOutcome {
    let detail = problem.to_string();
    log.debug(&detail);
    challenge.fail(problem);
    (challenge, Some(detail))
}

/// Look up `name` before talking to the peer, so resolver-reported DNSSEC
/// failures surface as `dnssec` rather than a connection-level verdict.
pub(crate) async fn dnssec_precheck(
    resolver: &dyn DnsResolver,
    name: &str,
) -> Result<(), ProblemDetails> {
    match resolver.lookup_host(name).await {
        Ok(_) => Ok(()),
        Err(err @ DnsError::Dnssec { .. }) => Err(ProblemDetails::dnssec(err.to_string())),
        Err(DnsError::Communication { .. }) => Err(ProblemDetails::server_internal(
            "unable to communicate with DNS server",
        )),
    }
}
