//! Core data model: identifiers, challenges, and authorizations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::problem::ProblemDetails;

/// The kind of identifier a certificate may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IdentifierKind {
    Dns,
    /// Anything this authority does not support.
    Unsupported,
}

impl From<String> for IdentifierKind {
    fn from(kind: String) -> Self {
        if kind == "dns" {
            Self::Dns
        } else {
            Self::Unsupported
        }
    }
}

impl From<IdentifierKind> for String {
    fn from(kind: IdentifierKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns => f.write_str("dns"),
            Self::Unsupported => f.write_str("unsupported"),
        }
    }
}

/// A subject a requester wants a certificate for.
///
/// `value` is a lowercase DNS name, optionally starting with the wildcard
/// label `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: IdentifierKind,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::Dns,
            value: value.into(),
        }
    }

    pub fn is_dns(&self) -> bool {
        matches!(self.kind, IdentifierKind::Dns)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Lifecycle state of a challenge. Transitions only run
/// `pending -> {valid, invalid}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Valid,
    Invalid,
}

/// Type-specific challenge parameters, tagged by the ACME challenge type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChallengeParams {
    #[serde(rename = "simpleHttp")]
    SimpleHttp {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tls: Option<bool>,
    },
    #[serde(rename = "dvsni")]
    Dvsni {
        nonce: String,
        r: String,
        s: String,
    },
    #[serde(rename = "dns")]
    Dns,
    /// A challenge type this authority does not recognize. The dispatcher
    /// never mutates such a challenge.
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl ChallengeParams {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SimpleHttp { .. } => "simpleHttp",
            Self::Dvsni { .. } => "dvsni",
            Self::Dns => "dns",
            Self::Unknown => "unknown",
        }
    }
}

/// One proof-of-control mechanism offered to a requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub status: ChallengeStatus,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProblemDetails>,
    #[serde(flatten)]
    pub params: ChallengeParams,
}

impl Challenge {
    /// Build a fresh pending challenge.
    pub fn pending(token: impl Into<String>, params: ChallengeParams) -> Self {
        Self {
            status: ChallengeStatus::Pending,
            token: token.into(),
            error: None,
            params,
        }
    }

    /// A challenge is sane when it is still pending and every required
    /// type-specific field is present and non-empty. Insane challenges are
    /// failed without contacting the network.
    pub fn is_sane(&self) -> bool {
        if self.status != ChallengeStatus::Pending || self.token.is_empty() {
            return false;
        }
        match &self.params {
            ChallengeParams::SimpleHttp { path, .. } => !path.is_empty(),
            ChallengeParams::Dvsni { nonce, r, s } => {
                !nonce.is_empty() && !r.is_empty() && !s.is_empty()
            }
            ChallengeParams::Dns => true,
            ChallengeParams::Unknown => false,
        }
    }

    pub(crate) fn fail(&mut self, problem: ProblemDetails) {
        self.error = Some(problem);
        self.status = ChallengeStatus::Invalid;
    }

    pub(crate) fn pass(&mut self) {
        self.error = None;
        self.status = ChallengeStatus::Valid;
    }
}

/// A pending binding between an account and an identifier, proved through
/// one of its challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub id: String,
    pub registration_id: i64,
    pub identifier: Identifier,
    pub challenges: Vec<Challenge>,
}
