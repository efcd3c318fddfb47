//! DNS adapter: the only module that performs DNS I/O.
//!
//! Validators and the CAA checker consume the [`DnsResolver`] capability and
//! never parse wire packets themselves. The adapter reports DNSSEC
//! validation failures as a distinct error kind; every other failure
//! collapses into a generic communication error. Absent records are empty
//! results, not errors.

use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::rdata::caa::Value;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use thiserror::Error;
use tracing::debug;

/// Result type for DNS adapter operations.
pub type DnsResult<T> = Result<T, DnsError>;

/// Failures surfaced by the DNS adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    /// The resolver reported a DNSSEC validation failure. Distinct from a
    /// communication failure so callers can report the `dnssec` problem
    /// type without inspecting messages.
    #[error("DNSSEC validation failed for '{name}': {detail}")]
    Dnssec { name: String, detail: String },

    /// Any other failure talking to DNS.
    #[error("DNS communication failure for '{name}': {detail}")]
    Communication { name: String, detail: String },
}

impl DnsError {
    pub fn is_dnssec(&self) -> bool {
        matches!(self, Self::Dnssec { .. })
    }
}

/// A single CAA record as retrieved from DNS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaaRecord {
    /// Raw flag byte. RFC 6844: any non-zero value is treated as critical.
    pub flag: u8,
    /// Property tag, lowercased: "issue", "issuewild", "iodef", or other.
    pub tag: String,
    /// Property value.
    pub value: String,
}

impl CaaRecord {
    pub fn new(flag: u8, tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag,
            tag: tag.into().to_ascii_lowercase(),
            value: value.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.flag != 0
    }
}

/// Capability for the DNS lookups validation needs.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait DnsResolver: Send + Sync + Debug {
    /// A and AAAA lookup. Returns the addresses and the smallest TTL seen.
    async fn lookup_host(&self, name: &str) -> DnsResult<(Vec<IpAddr>, u32)>;

    /// TXT lookup. Character strings within one record are concatenated.
    async fn lookup_txt(&self, name: &str) -> DnsResult<(Vec<String>, u32)>;

    /// CAA lookup. With `follow_cname` the query goes to the target of a
    /// CNAME at `name` instead (empty when there is no such CNAME).
    async fn lookup_caa(&self, name: &str, follow_cname: bool) -> DnsResult<Vec<CaaRecord>>;
}

/// Production adapter backed by `hickory-resolver`.
///
/// Lookups run against the configured nameservers with DNSSEC validation
/// enabled and caching disabled, under a 5-second query timeout. The handle
/// is cheap to clone.
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    inner: TokioResolver,
}

impl HickoryResolver {
    /// Build a resolver against the given nameservers; defaults apply when
    /// the list is empty.
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let config = if nameservers.is_empty() {
            ResolverConfig::default()
        } else {
            let mut config = ResolverConfig::new();
            for ip in nameservers {
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(*ip, 53),
                    Protocol::Udp,
                ));
            }
            config
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;
        opts.cache_size = 0;
        opts.validate = true;

        let inner = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Self { inner }
    }

    async fn cname_target(&self, name: &str) -> DnsResult<Option<String>> {
        match self.inner.lookup(name, RecordType::CNAME).await {
            Ok(lookup) => Ok(lookup.iter().find_map(|rdata| match rdata {
                RData::CNAME(cname) => Some(cname.to_utf8()),
                _ => None,
            })),
            Err(err) => absent_or_error(name, &err).map(|()| None),
        }
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn lookup_host(&self, name: &str) -> DnsResult<(Vec<IpAddr>, u32)> {
        let fqdn = to_fqdn(name);
        match self.inner.lookup_ip(fqdn.as_str()).await {
            Ok(lookup) => {
                let ttl = min_ttl(lookup.as_lookup());
                Ok((lookup.iter().collect(), ttl))
            }
            Err(err) => absent_or_error(name, &err).map(|()| (Vec::new(), 0)),
        }
    }

    async fn lookup_txt(&self, name: &str) -> DnsResult<(Vec<String>, u32)> {
        let fqdn = to_fqdn(name);
        match self.inner.txt_lookup(fqdn.as_str()).await {
            Ok(lookup) => {
                let strings = lookup
                    .iter()
                    .map(|txt| {
                        txt.txt_data()
                            .iter()
                            .map(|data| String::from_utf8_lossy(data))
                            .collect::<String>()
                    })
                    .collect();
                let ttl = min_ttl(lookup.as_lookup());
                Ok((strings, ttl))
            }
            Err(err) => absent_or_error(name, &err).map(|()| (Vec::new(), 0)),
        }
    }

    async fn lookup_caa(&self, name: &str, follow_cname: bool) -> DnsResult<Vec<CaaRecord>> {
        let mut target = to_fqdn(name);
        if follow_cname {
            match self.cname_target(&target).await? {
                Some(alias) => target = to_fqdn(&alias),
                None => return Ok(Vec::new()),
            }
        }
        match self.inner.lookup(target.as_str(), RecordType::CAA).await {
            Ok(lookup) => {
                let records: Vec<CaaRecord> = lookup
                    .iter()
                    .filter_map(|rdata| match rdata {
                        RData::CAA(caa) => Some(CaaRecord::new(
                            if caa.issuer_critical() { 128 } else { 0 },
                            caa.tag().as_str(),
                            caa_value_string(caa.value()),
                        )),
                        _ => None,
                    })
                    .collect();
                debug!(name = %target, count = records.len(), "CAA lookup complete");
                Ok(records)
            }
            Err(err) => absent_or_error(name, &err).map(|()| Vec::new()),
        }
    }
}

fn to_fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

fn min_ttl(lookup: &hickory_resolver::lookup::Lookup) -> u32 {
    lookup
        .record_iter()
        .map(|record| record.ttl())
        .min()
        .unwrap_or(0)
}

fn caa_value_string(value: &Value) -> String {
    match value {
        Value::Issuer(Some(name), _) => name.to_utf8().trim_end_matches('.').to_string(),
        Value::Issuer(None, _) => String::new(),
        Value::Url(url) => url.as_str().to_string(),
        Value::Unknown(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Sort a failed lookup into "the record is absent" (an empty success),
/// a DNSSEC validation failure, or a communication failure, based on how
/// the resolver reports it.
fn absent_or_error(name: &str, err: &dyn std::fmt::Display) -> DnsResult<()> {
    let rendered = err.to_string();
    let lowered = rendered.to_ascii_lowercase();
    if is_dnssec_failure(&lowered) {
        Err(DnsError::Dnssec {
            name: name.to_string(),
            detail: rendered,
        })
    } else if is_absent_response(&lowered) {
        Ok(())
    } else {
        Err(DnsError::Communication {
            name: name.to_string(),
            detail: rendered,
        })
    }
}

fn is_dnssec_failure(message: &str) -> bool {
    message.contains("bogus")
        || message.contains("rrsig")
        || message.contains("dnskey")
        || message.contains("indeterminate")
}

fn is_absent_response(message: &str) -> bool {
    message.contains("no records found")
        || message.contains("nxdomain")
        || message.contains("record not found")
        || message.contains("negative record response")
}
