//! Reentrancy guard for resolve operations.

use std::cell::Cell;

use crate::error::ResolveError;

/// Marks one logical thread of control through the resolver.
///
/// A resolve call acquires the token for its whole duration; a second call
/// through the same token (e.g. a hook calling back into the resolver)
/// fails fast with [`ResolveError::Reentrant`] instead of deadlocking or
/// corrupting state. The token is deliberately `!Sync`; concurrent
/// resolves on other threads use their own tokens.
#[derive(Debug, Default)]
pub struct ResolveToken {
    resolving: Cell<bool>,
}

impl ResolveToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a resolve call through this token is in flight.
    pub fn is_resolving(&self) -> bool {
        self.resolving.get()
    }

    /// Acquire the token for the lifetime of the returned guard.
    pub(crate) fn acquire(&self) -> Result<TokenGuard<'_>, ResolveError> {
        if self.resolving.replace(true) {
            return Err(ResolveError::Reentrant);
        }
        Ok(TokenGuard { token: self })
    }
}

pub(crate) struct TokenGuard<'a> {
    token: &'a ResolveToken,
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        self.token.resolving.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_exclusive() {
        let token = ResolveToken::new();
        let guard = token.acquire().unwrap();
        assert!(token.is_resolving());
        assert!(matches!(token.acquire(), Err(ResolveError::Reentrant)));
        drop(guard);
        assert!(!token.is_resolving());
        assert!(token.acquire().is_ok());
    }
}
