//! Dispatcher behavior: fire-and-forget scheduling, exactly-once audit and
//! registration-authority notification, DNS-01 validation, and CAA checks
//! through the authority.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::Jwk;
use serde_json::json;
use tokio::sync::Notify;

use basalt_va::{
    Authorization, CaaOutcome, CaaRecord, Challenge, ChallengeParams, ChallengeStatus, DnsError,
    Identifier, ProblemType, VaConfig, VaError,
};
use common::{harness, StaticResolver};

fn account_key() -> Jwk {
    serde_json::from_value(json!({
        "kty": "oct",
        "k": URL_SAFE_NO_PAD.encode(b"account-key-0123456789abcdefghij"),
    }))
    .unwrap()
}

fn dns_authz(token: &str) -> Authorization {
    Authorization {
        id: "authz-dns".to_string(),
        registration_id: 23,
        identifier: Identifier::dns("d.example"),
        challenges: vec![Challenge::pending(token, ChallengeParams::Dns)],
    }
}

#[tokio::test]
async fn update_validations_returns_before_any_network_io() {
    let gate = Arc::new(Notify::new());
    let resolver = StaticResolver::default()
        .with_txt("_acme-challenge.d.example", vec!["expected-token"])
        .gated(gate.clone());
    let mut fixture = harness(VaConfig::new("my-ca.example"), resolver);

    fixture
        .va
        .update_validations(dns_authz("expected-token"), 0, account_key())
        .unwrap();

    // The call has returned while the lookup is still held at the gate:
    // no lookup has completed and no callback has fired.
    assert_eq!(fixture.resolver.txt_lookups.load(Ordering::SeqCst), 0);
    assert!(fixture.updates.try_recv().is_err());

    gate.notify_one();
    let updated = fixture.updates.recv().await.unwrap();
    assert_eq!(updated.challenges[0].status, ChallengeStatus::Valid);
    assert_eq!(fixture.resolver.txt_lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finds_the_token_among_several_txt_strings() {
    let resolver = StaticResolver::default().with_txt(
        "_acme-challenge.d.example",
        vec!["not-the-token", "expected-token"],
    );
    let mut fixture = harness(VaConfig::new("my-ca.example"), resolver);

    fixture
        .va
        .update_validations(dns_authz("expected-token"), 0, account_key())
        .unwrap();
    let updated = fixture.updates.recv().await.unwrap();
    let challenge = &updated.challenges[0];
    assert_eq!(challenge.status, ChallengeStatus::Valid);
    assert!(challenge.error.is_none());
    assert_eq!(fixture.ra.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.log.audit_objects.load(Ordering::SeqCst), 1);

    // Unchanged records: a second attempt reaches the same verdict.
    fixture
        .va
        .update_validations(dns_authz("expected-token"), 0, account_key())
        .unwrap();
    let again = fixture.updates.recv().await.unwrap();
    assert_eq!(again.challenges[0].status, ChallengeStatus::Valid);
}

#[tokio::test]
async fn a_missing_token_is_unauthorized() {
    let resolver = StaticResolver::default()
        .with_txt("_acme-challenge.d.example", vec!["something-else"]);
    let mut fixture = harness(VaConfig::new("my-ca.example"), resolver);

    fixture
        .va
        .update_validations(dns_authz("expected-token"), 0, account_key())
        .unwrap();
    let updated = fixture.updates.recv().await.unwrap();
    let challenge = &updated.challenges[0];
    assert_eq!(challenge.status, ChallengeStatus::Invalid);
    assert_eq!(
        challenge.error.as_ref().unwrap().kind,
        ProblemType::Unauthorized
    );
}

#[tokio::test]
async fn dnssec_failures_surface_with_their_own_problem_type() {
    let resolver = StaticResolver {
        txt_error: Some(DnsError::Dnssec {
            name: "_acme-challenge.d.example".to_string(),
            detail: "bogus RRSIG".to_string(),
        }),
        ..Default::default()
    };
    let mut fixture = harness(VaConfig::new("my-ca.example"), resolver);

    fixture
        .va
        .update_validations(dns_authz("expected-token"), 0, account_key())
        .unwrap();
    let updated = fixture.updates.recv().await.unwrap();
    assert_eq!(
        updated.challenges[0].error.as_ref().unwrap().kind,
        ProblemType::Dnssec
    );
}

#[tokio::test]
async fn other_dns_failures_are_server_internal() {
    let resolver = StaticResolver {
        txt_error: Some(DnsError::Communication {
            name: "_acme-challenge.d.example".to_string(),
            detail: "server unreachable".to_string(),
        }),
        ..Default::default()
    };
    let mut fixture = harness(VaConfig::new("my-ca.example"), resolver);

    fixture
        .va
        .update_validations(dns_authz("expected-token"), 0, account_key())
        .unwrap();
    let updated = fixture.updates.recv().await.unwrap();
    assert_eq!(
        updated.challenges[0].error.as_ref().unwrap().kind,
        ProblemType::ServerInternal
    );
}

#[tokio::test]
async fn insane_challenges_fail_malformed_without_touching_the_network() {
    let mut fixture = harness(VaConfig::new("my-ca.example"), StaticResolver::default());

    // Empty token fails the sanity check.
    fixture
        .va
        .update_validations(dns_authz(""), 0, account_key())
        .unwrap();
    let updated = fixture.updates.recv().await.unwrap();
    let challenge = &updated.challenges[0];
    assert_eq!(challenge.status, ChallengeStatus::Invalid);
    assert_eq!(
        challenge.error.as_ref().unwrap().kind,
        ProblemType::Malformed
    );
    assert_eq!(fixture.resolver.txt_lookups.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.resolver.host_lookups.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.ra.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.log.audit_objects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unrecognized_challenge_types_are_left_untouched() {
    let mut fixture = harness(VaConfig::new("my-ca.example"), StaticResolver::default());

    let mut authz = dns_authz("tok");
    authz.challenges[0] = serde_json::from_str(
        r#"{"type":"tls-alpn-01","status":"pending","token":"tok"}"#,
    )
    .unwrap();

    fixture
        .va
        .update_validations(authz, 0, account_key())
        .unwrap();
    let updated = fixture.updates.recv().await.unwrap();

    // No state change, but the attempt was recorded and reported.
    let challenge = &updated.challenges[0];
    assert_eq!(challenge.status, ChallengeStatus::Pending);
    assert!(challenge.error.is_none());
    assert_eq!(fixture.ra.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.log.audit_objects.load(Ordering::SeqCst), 1);
    let records = fixture.log.records.lock().unwrap();
    assert_eq!(
        records[0].error.as_deref(),
        Some("unrecognized challenge type")
    );
}

#[tokio::test]
async fn an_out_of_range_index_is_rejected_synchronously() {
    let fixture = harness(VaConfig::new("my-ca.example"), StaticResolver::default());

    let result = fixture
        .va
        .update_validations(dns_authz("tok"), 5, account_key());
    assert!(matches!(
        result,
        Err(VaError::BadChallengeIndex { index: 5, .. })
    ));
    assert_eq!(fixture.ra.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.log.audit_objects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn only_the_indexed_challenge_is_touched() {
    let resolver = StaticResolver::default().with_txt(
        "_acme-challenge.d.example",
        vec!["expected-token"],
    );
    let mut fixture = harness(VaConfig::new("my-ca.example"), resolver);

    let mut authz = dns_authz("expected-token");
    authz
        .challenges
        .push(Challenge::pending("expected-token", ChallengeParams::Dns));

    fixture
        .va
        .update_validations(authz, 1, account_key())
        .unwrap();
    let updated = fixture.updates.recv().await.unwrap();
    assert_eq!(updated.challenges[0].status, ChallengeStatus::Pending);
    assert_eq!(updated.challenges[1].status, ChallengeStatus::Valid);
}

#[tokio::test]
async fn caa_mismatch_denies_issuance() {
    let resolver = StaticResolver::default().with_caa(
        "d.example",
        vec![CaaRecord::new(0, "issue", "other-ca.example")],
    );
    let fixture = harness(VaConfig::new("my-ca.example"), resolver);

    let outcome = fixture
        .va
        .check_caa_records(&Identifier::dns("d.example"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CaaOutcome {
            present: true,
            valid: false
        }
    );
}

#[tokio::test]
async fn caa_climbs_to_the_parent_domain() {
    let resolver = StaticResolver::default().with_caa(
        "d.example",
        vec![CaaRecord::new(0, "issue", "my-ca.example")],
    );
    let fixture = harness(VaConfig::new("my-ca.example"), resolver);

    let outcome = fixture
        .va
        .check_caa_records(&Identifier::dns("sub.d.example"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CaaOutcome {
            present: true,
            valid: true
        }
    );
}
