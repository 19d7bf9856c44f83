//! Access-token collaborators.
//!
//! The login flow lives outside this workspace; it only has to hand the
//! current bearer token to whatever implements [`TokenProvider`].

use std::sync::{Arc, PoisonError, RwLock};

/// Source of the bearer credential used by HTTP requests and the progress socket.
pub trait TokenProvider: Send + Sync {
    /// Returns the current access token, or `None` when the user is signed out.
    fn access_token(&self) -> Option<String>;
}

/// A token fixed at construction time (CLI flags, tests).
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Token slot updated by the login/logout flow and read on every connect attempt.
#[derive(Debug, Clone, Default)]
pub struct SharedTokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl SharedTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TokenProvider for SharedTokenStore {
    fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_store_reflects_login_and_logout() {
        let store = SharedTokenStore::new();
        assert_eq!(store.access_token(), None);

        let reader = store.clone();
        store.set("abc");
        assert_eq!(reader.access_token().as_deref(), Some("abc"));

        store.clear();
        assert_eq!(reader.access_token(), None);
    }

    #[test]
    fn blank_token_counts_as_signed_out() {
        let store = SharedTokenStore::new();
        store.set("   ");
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn static_provider_signed_out_has_no_token() {
        assert_eq!(StaticTokenProvider::signed_out().access_token(), None);
        assert_eq!(
            StaticTokenProvider::new("t").access_token().as_deref(),
            Some("t")
        );
    }
}
