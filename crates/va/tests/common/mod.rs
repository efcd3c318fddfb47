//! Shared fixtures for the integration tests: scripted collaborators in
//! place of the DNS adapter, registration authority, and audit log.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use basalt_va::{
    AuditLogger, Authorization, CaaRecord, DnsError, DnsResolver, DnsResult, PublicSuffixSet,
    RegistrationAuthority, VaConfig, ValidationAuthority, ValidationRecord,
};

/// Resolver answering from fixed tables, counting lookups, and optionally
/// holding them at a gate so tests can observe scheduling boundaries.
#[derive(Debug, Default)]
pub struct StaticResolver {
    pub hosts: HashMap<String, Vec<IpAddr>>,
    pub txt: HashMap<String, Vec<String>>,
    pub caa: HashMap<String, Vec<CaaRecord>>,
    pub host_error: Option<DnsError>,
    pub txt_error: Option<DnsError>,
    pub gate: Option<Arc<Notify>>,
    pub host_lookups: AtomicUsize,
    pub txt_lookups: AtomicUsize,
    pub caa_lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn with_host(mut self, name: &str, addrs: Vec<IpAddr>) -> Self {
        self.hosts.insert(name.to_string(), addrs);
        self
    }

    pub fn with_txt(mut self, name: &str, strings: Vec<&str>) -> Self {
        self.txt.insert(
            name.to_string(),
            strings.into_iter().map(str::to_string).collect(),
        );
        self
    }

    pub fn with_caa(mut self, name: &str, records: Vec<CaaRecord>) -> Self {
        self.caa.insert(name.to_string(), records);
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    async fn wait_at_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn lookup_host(&self, name: &str) -> DnsResult<(Vec<IpAddr>, u32)> {
        self.wait_at_gate().await;
        self.host_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.host_error {
            return Err(err.clone());
        }
        Ok((self.hosts.get(name).cloned().unwrap_or_default(), 300))
    }

    async fn lookup_txt(&self, name: &str) -> DnsResult<(Vec<String>, u32)> {
        self.wait_at_gate().await;
        self.txt_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.txt_error {
            return Err(err.clone());
        }
        Ok((self.txt.get(name).cloned().unwrap_or_default(), 300))
    }

    async fn lookup_caa(&self, name: &str, follow_cname: bool) -> DnsResult<Vec<CaaRecord>> {
        self.caa_lookups.fetch_add(1, Ordering::SeqCst);
        if follow_cname {
            return Ok(Vec::new());
        }
        Ok(self.caa.get(name).cloned().unwrap_or_default())
    }
}

/// Registration authority that forwards every callback into a channel.
#[derive(Debug)]
pub struct ChannelRa {
    sender: mpsc::UnboundedSender<Authorization>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl RegistrationAuthority for ChannelRa {
    async fn on_validation_update(&self, authz: Authorization) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(authz);
    }
}

/// Audit logger that counts emissions and keeps the structured records.
#[derive(Debug, Default)]
pub struct CountingLogger {
    pub audit_objects: AtomicUsize,
    pub audit_lines: AtomicUsize,
    pub records: Mutex<Vec<ValidationRecord>>,
}

impl AuditLogger for CountingLogger {
    fn audit_object(&self, _summary: &str, record: &ValidationRecord) {
        self.audit_objects.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(record.clone());
    }

    fn audit(&self, _message: &str) {
        self.audit_lines.fetch_add(1, Ordering::SeqCst);
    }

    fn notice(&self, _message: &str) {}

    fn debug(&self, _message: &str) {}
}

pub struct Harness {
    pub va: ValidationAuthority,
    pub ra: Arc<ChannelRa>,
    pub log: Arc<CountingLogger>,
    pub resolver: Arc<StaticResolver>,
    pub updates: mpsc::UnboundedReceiver<Authorization>,
}

/// Wire an authority around scripted collaborators.
pub fn harness(config: VaConfig, resolver: StaticResolver) -> Harness {
    let (sender, updates) = mpsc::unbounded_channel();
    let ra = Arc::new(ChannelRa {
        sender,
        calls: AtomicUsize::new(0),
    });
    let log = Arc::new(CountingLogger::default());
    let resolver = Arc::new(resolver);
    let va = ValidationAuthority::new(
        config,
        resolver.clone(),
        ra.clone(),
        log.clone(),
        Arc::new(PublicSuffixSet::new()),
    );
    Harness {
        va,
        ra,
        log,
        resolver,
        updates,
    }
}
