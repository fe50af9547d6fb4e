//! Message provider chain
//!
//! Providers are consulted in registration order and the first one that
//! answers wins, so registration order is the priority policy.

use std::fmt;
use std::sync::Arc;

use crate::envelope::Envelope;

/// A responder for one or more request kinds.
///
/// `try_answer` must not block; providers whose work is slow hand it to a
/// background task and answer immediately.
pub trait MessageProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Answer `request`, or `None` if this provider does not handle it
    fn try_answer(&self, request: &Envelope) -> Option<Envelope>;
}

/// Ordered provider sequence with first-match-wins semantics
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn MessageProvider>>,
}

impl ProviderChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider (builder style)
    pub fn with(mut self, provider: Arc<dyn MessageProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Append a provider
    pub fn push(&mut self, provider: Arc<dyn MessageProvider>) {
        self.providers.push(provider);
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain has no providers
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in priority order
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// First answer from the chain, with the name of the provider that gave it
    pub fn answer(&self, request: &Envelope) -> Option<(&str, Envelope)> {
        self.providers
            .iter()
            .find_map(|p| p.try_answer(request).map(|answer| (p.name(), answer)))
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("providers", &self.names())
            .finish()
    }
}
