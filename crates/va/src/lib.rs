//! Domain-control validation for the Basalt issuance pipeline.
//!
//! Before the pipeline signs a certificate for a DNS identifier, this crate
//! proves that the requester controls it and checks that the identifier's
//! CAA records permit the configured issuer to sign.
//!
//! # Components
//!
//! - [`ValidationAuthority`]: dispatches challenge validation and answers
//!   CAA queries
//! - [`DnsResolver`]: the DNS adapter capability; [`HickoryResolver`] is
//!   the production implementation
//! - validators for the three challenge types: SimpleHTTP, DVSNI, DNS
//! - [`caa`]: RFC 6844 record retrieval and issuance decision
//! - [`AuditLogger`]: audit sink; [`TracingAuditLogger`] is the production
//!   implementation
//!
//! # Validation flow
//!
//! 1. A caller invokes [`ValidationAuthority::update_validations`], naming
//!    one challenge of an authorization. The call returns as soon as the
//!    attempt is scheduled.
//! 2. The attempt sanity-checks the challenge, then runs exactly one
//!    validator, which queries DNS and possibly the network under 5-second
//!    ceilings. One attempt, one verdict; nothing is retried.
//! 3. The finished challenge is written back at the same index, an audit
//!    record is emitted, and the registration authority is notified,
//!    exactly once each, in that order.
//!
//! CAA checking is separate, typically invoked just before signing:
//! [`ValidationAuthority::check_caa_records`] climbs the identifier's DNS
//! tree per RFC 6844 and reports whether records exist and whether they
//! authorize the configured issuer.

pub mod audit;
pub mod authority;
pub mod caa;
pub mod jws;
pub mod problem;
pub mod resolver;
pub mod suffix;
pub mod types;
pub(crate) mod validate;

pub use audit::{AuditLogger, TracingAuditLogger, ValidationRecord};
pub use authority::{RegistrationAuthority, VaConfig, VaError, ValidationAuthority};
pub use caa::{CaaOutcome, CaaSet};
pub use problem::{classify_connection_error, ProblemDetails, ProblemType};
pub use resolver::{CaaRecord, DnsError, DnsResolver, DnsResult, HickoryResolver};
pub use suffix::PublicSuffixSet;
pub use types::{
    Authorization, Challenge, ChallengeParams, ChallengeStatus, Identifier, IdentifierKind,
};
