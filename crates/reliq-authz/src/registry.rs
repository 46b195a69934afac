//! Context registry correlating evaluation tokens to request contexts.
//!
//! The decision evaluator's callback interface only carries attribute ids
//! and values, so the enforcement point smuggles a correlation token through
//! the action attributes. Finder modules that need request-scoped data
//! extract the token and look the original [`RequestContext`] up here.
//!
//! Entries live strictly for the duration of one `enforce` call:
//! registration returns a [`RegistrationGuard`] that unregisters on drop, so
//! cleanup happens even when evaluation fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::context::RequestContext;

/// Concurrent token → context table.
///
/// Safe for concurrent registration, lookup, and removal from independent
/// evaluation tasks; callers need no external locking. Tokens are
/// monotonically increasing integers rendered as strings; uniqueness is the
/// only property readers rely on.
pub struct ContextRegistry {
    entries: DashMap<String, Arc<RequestContext>>,
    next_token: AtomicU64,
}

impl ContextRegistry {
    /// An empty registry. Token minting starts at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_token: AtomicU64::new(1),
        }
    }

    /// Mint a fresh, process-unique token.
    #[must_use]
    pub fn mint_token(&self) -> String {
        self.next_token.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Store a context under a token.
    ///
    /// A duplicate token fails silently, leaving the existing entry in
    /// place (tokens are generator-unique, so this is not expected in
    /// practice).
    pub fn register(&self, token: impl Into<String>, context: Arc<RequestContext>) {
        self.entries.entry(token.into()).or_insert(context);
    }

    /// Mint a token, register the context under it, and return a guard that
    /// unregisters on drop.
    #[must_use]
    pub fn register_guarded(&self, context: Arc<RequestContext>) -> RegistrationGuard<'_> {
        let token = self.mint_token();
        self.register(token.clone(), context);
        RegistrationGuard {
            registry: self,
            token,
        }
    }

    /// Remove the entry for a token, returning the context if it was present.
    pub fn unregister(&self, token: &str) -> Option<Arc<RequestContext>> {
        self.entries.remove(token).map(|(_, ctx)| ctx)
    }

    /// Look the context for a token up.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<Arc<RequestContext>> {
        self.entries.get(token).map(|entry| entry.value().clone())
    }

    /// Number of currently registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no contexts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters its token when dropped.
pub struct RegistrationGuard<'a> {
    registry: &'a ContextRegistry,
    token: String,
}

impl RegistrationGuard<'_> {
    /// The token this guard owns.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.registry.unregister(&self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContextBuilder;

    #[test]
    fn test_register_lookup_unregister() {
        let registry = ContextRegistry::new();
        let ctx = Arc::new(RequestContextBuilder::new().no_op(true).build());

        let token = registry.mint_token();
        registry.register(token.clone(), ctx.clone());

        let found = registry.lookup(&token).unwrap();
        assert!(Arc::ptr_eq(&found, &ctx));

        registry.unregister(&token);
        assert!(registry.lookup(&token).is_none());
    }

    #[test]
    fn test_tokens_are_unique() {
        let registry = ContextRegistry::new();
        let a = registry.mint_token();
        let b = registry.mint_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_duplicate_register_keeps_first() {
        let registry = ContextRegistry::new();
        let first = Arc::new(RequestContextBuilder::new().no_op(true).build());
        let second = Arc::new(RequestContextBuilder::new().build());

        registry.register("t", first.clone());
        registry.register("t", second);

        let found = registry.lookup("t").unwrap();
        assert!(found.no_op());
        assert!(Arc::ptr_eq(&found, &first));
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let registry = ContextRegistry::new();
        let ctx = Arc::new(RequestContext::empty());

        let token = {
            let guard = registry.register_guarded(ctx);
            let token = guard.token().to_string();
            assert!(registry.lookup(&token).is_some());
            token
        };

        assert!(registry.lookup(&token).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let registry = Arc::new(ContextRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let ctx = Arc::new(RequestContext::empty());
                let token = registry.mint_token();
                registry.register(token.clone(), ctx);
                assert!(registry.lookup(&token).is_some());
                registry.unregister(&token);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
