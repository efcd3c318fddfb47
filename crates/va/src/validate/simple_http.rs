//! SimpleHTTP challenge validation.
//!
//! Fetches a signed validation document from the identifier's well-known
//! challenge path and checks it: the JWS must be signed by the account key,
//! and its payload must repeat the challenge exactly.

use std::time::Duration;

use jsonwebtoken::jwk::Jwk;
use reqwest::header;
use serde_json::Value;
use subtle::ConstantTimeEq;

use super::{dnssec_precheck, reject, ValidationOutcome};
use crate::audit::AuditLogger;
use crate::authority::VaConfig;
use crate::jws::{keys_match, CompactJws};
use crate::problem::{classify_connection_error, ProblemDetails};
use crate::resolver::DnsResolver;
use crate::types::{Challenge, Identifier};

const WELL_KNOWN_PREFIX: &str = "/.well-known/acme-challenge/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[allow(clippy::too_many_arguments)]
pub(crate) async fn validate(
    resolver: &dyn DnsResolver,
    config: &VaConfig,
    log: &dyn AuditLogger,
    identifier: &Identifier,
    mut challenge: Challenge,
    path: &str,
    tls: Option<bool>,
    account_key: &Jwk,
) -> ValidationOutcome {
    if path.is_empty() {
        return reject(
            challenge,
            log,
            ProblemDetails::malformed("no path provided for SimpleHTTP challenge"),
        );
    }
    if !identifier.is_dns() {
        return reject(
            challenge,
            log,
            ProblemDetails::malformed("identifier type for SimpleHTTP was not DNS"),
        );
    }

    if let Err(problem) = dnssec_precheck(resolver, &identifier.value).await {
        log.debug(&format!("SimpleHTTP [{identifier}] DNS failure: {problem}"));
        let detail = problem.to_string();
        challenge.fail(problem);
        return (challenge, Some(detail));
    }

    let use_tls = tls.unwrap_or(true);
    let (scheme, host) = if config.test_mode {
        ("http", config.test_addr.to_string())
    } else if use_tls {
        ("https", identifier.value.clone())
    } else {
        ("http", identifier.value.clone())
    };
    let url = format!("{scheme}://{host}{WELL_KNOWN_PREFIX}{path}");

    log.audit(&format!(
        "attempting to validate Simple{} for {}",
        scheme.to_ascii_uppercase(),
        url
    ));

    // The peer has no trusted certificate yet, so any certificate is
    // accepted; the signed document supplies the assurance. One request per
    // peer, so no connection reuse.
    let client = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .pool_max_idle_per_host(0)
        .timeout(REQUEST_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            return reject(
                challenge,
                log,
                ProblemDetails::server_internal(format!("failed to build HTTP client: {e}")),
            );
        }
    };

    let response = match client
        .get(&url)
        .header(header::HOST, identifier.value.as_str())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let problem = ProblemDetails::new(
                classify_connection_error(&e),
                format!("could not connect to {url}"),
            );
            log.debug(&format!("{problem}: {e}"));
            let detail = problem.to_string();
            challenge.fail(problem);
            return (challenge, Some(detail));
        }
    };

    let status = response.status();
    if !status.is_success() {
        return reject(
            challenge,
            log,
            ProblemDetails::unauthorized(format!(
                "invalid response from {url}: {}",
                status.as_u16()
            )),
        );
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            let problem = ProblemDetails::new(
                classify_connection_error(&e),
                format!("failed to read response from {url}"),
            );
            log.debug(&format!("{problem}: {e}"));
            let detail = problem.to_string();
            challenge.fail(problem);
            return (challenge, Some(detail));
        }
    };

    // From here on the peer answered; anything wrong with the document is
    // a failed proof.
    let jws = match CompactJws::parse(&body) {
        Ok(jws) => jws,
        Err(e) => {
            return reject(
                challenge,
                log,
                ProblemDetails::unauthorized(format!(
                    "validation response failed to parse as JWS: {e}"
                )),
            );
        }
    };

    let signer = match jws.signer() {
        Ok(signer) => signer,
        Err(e) => {
            return reject(
                challenge,
                log,
                ProblemDetails::unauthorized(format!("validation JWS rejected: {e}")),
            );
        }
    };
    if !keys_match(signer, account_key) {
        return reject(
            challenge,
            log,
            ProblemDetails::unauthorized(
                "validation JWS signed with a key other than the account key",
            ),
        );
    }
    if let Err(e) = jws.verify() {
        return reject(
            challenge,
            log,
            ProblemDetails::unauthorized(format!("validation response failed to verify: {e}")),
        );
    }

    log.debug(&format!(
        "validation response payload: {}",
        String::from_utf8_lossy(jws.payload())
    ));

    let payload: Value = match serde_json::from_slice(jws.payload()) {
        Ok(payload) => payload,
        Err(e) => {
            return reject(
                challenge,
                log,
                ProblemDetails::unauthorized(format!(
                    "validation payload failed to parse as JSON: {e}"
                )),
            );
        }
    };
    let Some(fields) = payload.as_object() else {
        return reject(
            challenge,
            log,
            ProblemDetails::unauthorized("validation payload was not a JSON object"),
        );
    };
    if fields.len() != 4 {
        return reject(
            challenge,
            log,
            ProblemDetails::unauthorized("validation payload did not have exactly the expected fields"),
        );
    }

    let type_ok = fields.get("type").and_then(Value::as_str) == Some("simpleHttp");
    let token_ok = fields
        .get("token")
        .and_then(Value::as_str)
        .map(|token| bool::from(token.as_bytes().ct_eq(challenge.token.as_bytes())))
        .unwrap_or(false);
    let path_ok = fields.get("path").and_then(Value::as_str) == Some(path);
    let tls_ok = fields.get("tls").and_then(Value::as_bool) == Some(use_tls);

    if !(type_ok && token_ok && path_ok && tls_ok) {
        return reject(
            challenge,
            log,
            ProblemDetails::unauthorized(format!(
                "validation payload did not match the challenge: \
                 type={type_ok} token={token_ok} path={path_ok} tls={tls_ok}"
            )),
        );
    }

    challenge.pass();
    (challenge, None)
}
