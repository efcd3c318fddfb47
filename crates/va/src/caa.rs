//! RFC 6844 CAA retrieval and issuance decision.
//!
//! The governing record set for a domain is found by climbing the DNS tree:
//! `x.y.z.com`, `y.z.com`, `z.com`. The climb stops at a configured public
//! suffix, each label is retried at its CNAME target when the direct answer
//! is empty, and the first non-empty answer governs.

use tracing::debug;

use crate::resolver::{CaaRecord, DnsResolver, DnsResult};
use crate::suffix::PublicSuffixSet;

/// Retrieved CAA records partitioned by property tag.
#[derive(Debug, Clone, Default)]
pub struct CaaSet {
    pub issue: Vec<CaaRecord>,
    pub issuewild: Vec<CaaRecord>,
    pub iodef: Vec<CaaRecord>,
    pub unknown: Vec<CaaRecord>,
}

impl CaaSet {
    pub fn new(records: Vec<CaaRecord>) -> Self {
        let mut set = Self::default();
        for record in records {
            match record.tag.as_str() {
                "issue" => set.issue.push(record),
                "issuewild" => set.issuewild.push(record),
                "iodef" => set.iodef.push(record),
                _ => set.unknown.push(record),
            }
        }
        set
    }

    /// True when any record with an unrecognized tag is flagged critical.
    /// RFC 6844: any non-zero flag byte is critical today.
    pub fn critical_unknown(&self) -> bool {
        self.unknown.iter().any(CaaRecord::is_critical)
    }

    /// True when the set carries records that restrict issuance at all.
    pub fn restricts_issuance(&self) -> bool {
        !self.issue.is_empty() || !self.issuewild.is_empty()
    }
}

/// Outcome of a CAA check: whether records were found, and whether they
/// permit the configured issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaaOutcome {
    pub present: bool,
    pub valid: bool,
}

/// Find the CAA record set governing `domain`, if any.
pub async fn governing_caa_set(
    resolver: &dyn DnsResolver,
    suffixes: &PublicSuffixSet,
    domain: &str,
) -> DnsResult<Option<CaaSet>> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    let labels: Vec<&str> = domain.split('.').collect();
    for start in 0..labels.len() {
        let candidate = labels[start..].join(".");
        if suffixes.contains(&candidate) {
            break;
        }
        for follow_cname in [false, true] {
            let records = resolver.lookup_caa(&candidate, follow_cname).await?;
            if !records.is_empty() {
                debug!(domain = %candidate, count = records.len(), "found governing CAA records");
                return Ok(Some(CaaSet::new(records)));
            }
        }
    }
    Ok(None)
}

/// Decide whether `issuer_domain` may issue for `domain`.
pub async fn check_caa(
    resolver: &dyn DnsResolver,
    suffixes: &PublicSuffixSet,
    domain: &str,
    issuer_domain: &str,
) -> DnsResult<CaaOutcome> {
    let domain = domain.to_ascii_lowercase();
    let Some(set) = governing_caa_set(resolver, suffixes, &domain).await? else {
        return Ok(CaaOutcome {
            present: false,
            valid: true,
        });
    };

    if set.critical_unknown() {
        return Ok(CaaOutcome {
            present: true,
            valid: false,
        });
    }
    if !set.restricts_issuance() {
        // Records exist but none of them constrain issuance.
        return Ok(CaaOutcome {
            present: true,
            valid: true,
        });
    }

    let wildcard = domain.split('.').next() == Some("*");
    let bucket = if wildcard { &set.issuewild } else { &set.issue };
    for record in bucket {
        if record.value == issuer_domain {
            return Ok(CaaOutcome {
                present: true,
                valid: true,
            });
        }
        if record.is_critical() {
            break;
        }
    }
    Ok(CaaOutcome {
        present: true,
        valid: false,
    })
}
