//! Authorization for vddk-builder requests
//!
//! A bearer token is accepted when its identity may list namespaces in the
//! cluster. The same token is later reused as the registry push credential.

pub mod error;
pub mod gate;
pub mod review;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{AuthError, Result};
pub use gate::{AuthorizationDecision, AuthorizationGate, DenialReason, bearer_token};
pub use review::{AccessReviewer, KubeAccessReviewer};
