//! Token stream abstraction over one in-progress generation

use futures::stream::{BoxStream, Stream, StreamExt};
use kiln_types::Result;

/// A lazy, finite, non-restartable sequence of generated tokens.
///
/// Exactly one generation backs each stream. `next()` past
/// end-of-stream is a no-op that keeps returning `None`; after an error
/// the stream is likewise finished and yields nothing further. Dropping
/// a partially consumed stream drops the underlying generation state,
/// so abandonment releases model resources on every exit path.
pub struct TokenStream {
    inner: BoxStream<'static, Result<String>>,
    finished: bool,
}

impl TokenStream {
    /// Wrap a raw token stream produced by a model runtime
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            inner: inner.boxed(),
            finished: false,
        }
    }

    /// A stream that is already at end-of-stream
    pub fn empty() -> Self {
        Self::new(futures::stream::empty())
    }

    /// Pull the next token.
    ///
    /// Returns `None` at end-of-stream, idempotently. An `Err` item is
    /// terminal: the stream is fused and all later calls return `None`.
    pub async fn next(&mut self) -> Option<Result<String>> {
        if self.finished {
            return None;
        }
        match self.inner.next().await {
            Some(Ok(token)) => Some(Ok(token)),
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Whether end-of-stream (or a terminal error) has been observed
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("finished", &self.finished)
            .finish()
    }
}
