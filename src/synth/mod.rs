//! Speech synthesis clients.
//!
//! A [`Synthesizer`] turns one chunk of text into one WAV payload with a
//! single call. Implementations hold no per-call state and are shared across
//! dispatcher workers; retries and timeouts are the dispatcher's business.

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

#[cfg(feature = "http")]
pub use http::{BackendHealth, HttpConfig, HttpSynthesizer};
pub use mock::MockSynthesizer;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for text-to-speech backends.
///
/// This trait allows swapping implementations (remote HTTP backend vs mock).
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into a complete WAV payload.
    ///
    /// # Errors
    /// Returns [`crate::ReadaloudError::Synthesis`] on transport failure,
    /// a non-success response, or an empty/malformed audio payload.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Implement Synthesizer for Arc<T> to allow sharing one client across runs.
#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        (**self).synthesize(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthesizer_trait_is_object_safe() {
        let synth: Box<dyn Synthesizer> = Box::new(MockSynthesizer::new("boxed"));
        assert_eq!(synth.name(), "boxed");
        assert!(synth.synthesize("hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_arc_forwards_to_inner() {
        let inner = Arc::new(MockSynthesizer::new("shared"));
        let shared: Arc<dyn Synthesizer> = inner.clone();

        shared.synthesize("one").await.unwrap();
        Arc::clone(&inner).synthesize("two").await.unwrap();

        assert_eq!(shared.name(), "shared");
        assert_eq!(inner.calls(), 2);
    }
}
