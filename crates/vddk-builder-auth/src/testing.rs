//! In-memory `AccessReviewer` for tests

use crate::error::{AuthError, Result};
use crate::review::AccessReviewer;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Grants access to a fixed set of tokens and records every check
#[derive(Debug, Default)]
pub struct StaticReviewer {
    allowed: HashSet<String>,
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl StaticReviewer {
    pub fn allowing<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Checks for `token` fail as if the API server were unreachable
    pub fn failing_on(mut self, token: impl Into<String>) -> Self {
        self.failing.insert(token.into());
        self
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AccessReviewer for StaticReviewer {
    async fn check_access(&self, token: &str, verb: &str, resource: &str) -> Result<bool> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((token.to_string(), verb.to_string(), resource.to_string()));

        if self.failing.contains(token) {
            return Err(AuthError::UnexpectedStatus(503));
        }

        Ok(self.allowed.contains(token))
    }
}
