//! Per-request authorization
//!
//! The gate runs before anything touches the build slot so that callers
//! without a valid token can neither occupy it nor observe whether a build
//! is in progress.

use crate::review::AccessReviewer;
use std::fmt;
use std::sync::Arc;

/// Scheme prefix accepted in the `Authorization` header (case-sensitive)
pub const BEARER_PREFIX: &str = "Bearer ";

/// Verb/resource used as the stand-in privilege check for "cluster operator"
pub const REVIEW_VERB: &str = "list";
pub const REVIEW_RESOURCE: &str = "namespaces";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    MissingToken,
    CheckFailed,
    InsufficientPermissions,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DenialReason::MissingToken => "Missing bearer token",
            DenialReason::CheckFailed => "Failed to verify permissions",
            DenialReason::InsufficientPermissions => "Insufficient permissions to list namespaces",
        };
        f.write_str(message)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// `credential` is the verified token, or `None` when enforcement is off
    Permitted { credential: Option<String> },
    Denied { reason: DenialReason },
}

impl AuthorizationDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, AuthorizationDecision::Permitted { .. })
    }

    pub fn credential(&self) -> Option<&str> {
        match self {
            AuthorizationDecision::Permitted { credential } => credential.as_deref(),
            AuthorizationDecision::Denied { .. } => None,
        }
    }

    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            AuthorizationDecision::Permitted { .. } => None,
            AuthorizationDecision::Denied { reason } => Some(*reason),
        }
    }
}

impl fmt::Debug for AuthorizationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationDecision::Permitted { credential } => f
                .debug_struct("Permitted")
                .field("credential", &credential.as_ref().map(|_| "***"))
                .finish(),
            AuthorizationDecision::Denied { reason } => {
                f.debug_struct("Denied").field("reason", reason).finish()
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .filter(|token| !token.is_empty())
}

pub struct AuthorizationGate {
    require_auth: bool,
    reviewer: Arc<dyn AccessReviewer>,
}

impl AuthorizationGate {
    pub fn new(require_auth: bool, reviewer: Arc<dyn AccessReviewer>) -> Self {
        Self {
            require_auth,
            reviewer,
        }
    }

    /// Decide whether a request carrying `authorization_header` may proceed
    pub async fn authorize(&self, authorization_header: Option<&str>) -> AuthorizationDecision {
        if !self.require_auth {
            return AuthorizationDecision::Permitted { credential: None };
        }

        let Some(token) = bearer_token(authorization_header) else {
            tracing::info!("Request denied: missing bearer token");
            return AuthorizationDecision::Denied {
                reason: DenialReason::MissingToken,
            };
        };

        match self
            .reviewer
            .check_access(token, REVIEW_VERB, REVIEW_RESOURCE)
            .await
        {
            Ok(true) => AuthorizationDecision::Permitted {
                credential: Some(token.to_string()),
            },
            Ok(false) => {
                tracing::info!("Request denied: insufficient permissions");
                AuthorizationDecision::Denied {
                    reason: DenialReason::InsufficientPermissions,
                }
            }
            Err(e) => {
                tracing::warn!("Request denied: permission check failed: {}", e);
                AuthorizationDecision::Denied {
                    reason: DenialReason::CheckFailed,
                }
            }
        }
    }
}
