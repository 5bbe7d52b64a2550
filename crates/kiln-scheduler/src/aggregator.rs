//! Response aggregation over a request's event channel
//!
//! The aggregator is the only consumer of a [`RequestHandle`]. It
//! offers the two client-visible shapes of a reply: a buffered final
//! text, or an ordered chunk stream that ends with exactly one
//! terminal marker. The shape is chosen by the gateway's configuration
//! or the request's `stream` flag, not inferred from the payload.

use chrono::Utc;
use futures::stream::Stream;
use kiln_types::{AggregatedResponse, CompletionStatus, KilnError};

use crate::handle::{RequestHandle, StreamEvent};

pub struct ResponseAggregator;

impl ResponseAggregator {
    /// Buffered mode: accumulate every token, deliver once the stream
    /// resolves. A mid-stream cancellation or failure still delivers
    /// the accumulated prefix together with its status marker; partial
    /// output is never dropped.
    pub async fn buffer(mut handle: RequestHandle) -> AggregatedResponse {
        let request_id = handle.id();
        let submitted_at = handle.submitted_at();
        let mut text = String::new();
        let mut completion_tokens = 0;

        let (status, error) = loop {
            match handle.recv().await {
                Some(StreamEvent::Token(token)) => {
                    text.push_str(&token);
                    completion_tokens += 1;
                }
                Some(StreamEvent::End { status, error }) => break (status, error),
                // Channel closed without a terminal marker: the entry
                // was dropped, which only happens on scheduler faults.
                None => break (
                    CompletionStatus::Failed,
                    Some(KilnError::internal("response channel closed unexpectedly")),
                ),
            }
        };

        AggregatedResponse {
            request_id,
            text,
            status,
            completion_tokens,
            error: error.map(|e| e.to_string()),
            latency_ms: (Utc::now() - submitted_at).num_milliseconds().max(0) as u64,
        }
    }

    /// Streaming mode: forward each event in arrival order. The
    /// returned stream always yields exactly one `End` marker and then
    /// terminates, even if the underlying channel closes early.
    pub fn stream(handle: RequestHandle) -> impl Stream<Item = StreamEvent> + Send {
        futures::stream::unfold((handle, false), |(mut handle, terminated)| async move {
            if terminated {
                return None;
            }
            match handle.recv().await {
                Some(event) => {
                    let is_end = matches!(event, StreamEvent::End { .. });
                    Some((event, (handle, is_end)))
                }
                None => {
                    let end = StreamEvent::End {
                        status: CompletionStatus::Failed,
                        error: Some(KilnError::internal("response channel closed unexpectedly")),
                    };
                    Some((end, (handle, true)))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueEntry;
    use futures::StreamExt;
    use kiln_types::ChatRequest;

    #[tokio::test]
    async fn buffer_collects_tokens_and_status() {
        let (entry, handle) = QueueEntry::new(ChatRequest::new("hi"), 8);
        entry.events.send(StreamEvent::Token("a ".into())).await.unwrap();
        entry.events.send(StreamEvent::Token("b".into())).await.unwrap();
        entry
            .events
            .send(StreamEvent::End {
                status: CompletionStatus::Complete,
                error: None,
            })
            .await
            .unwrap();

        let response = ResponseAggregator::buffer(handle).await;
        assert_eq!(response.text, "a b");
        assert_eq!(response.completion_tokens, 2);
        assert_eq!(response.status, CompletionStatus::Complete);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn buffer_preserves_partial_output_on_cancel() {
        let (entry, handle) = QueueEntry::new(ChatRequest::new("hi"), 8);
        entry.events.send(StreamEvent::Token("part".into())).await.unwrap();
        entry
            .events
            .send(StreamEvent::End {
                status: CompletionStatus::Cancelled,
                error: None,
            })
            .await
            .unwrap();

        let response = ResponseAggregator::buffer(handle).await;
        assert_eq!(response.text, "part");
        assert_eq!(response.status, CompletionStatus::Cancelled);
    }

    #[tokio::test]
    async fn buffer_reports_dropped_entry_as_failure() {
        let (entry, handle) = QueueEntry::new(ChatRequest::new("hi"), 8);
        drop(entry);

        let response = ResponseAggregator::buffer(handle).await;
        assert_eq!(response.status, CompletionStatus::Failed);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn stream_terminates_after_end_marker() {
        let (entry, handle) = QueueEntry::new(ChatRequest::new("hi"), 8);
        entry.events.send(StreamEvent::Token("x".into())).await.unwrap();
        entry
            .events
            .send(StreamEvent::End {
                status: CompletionStatus::Complete,
                error: None,
            })
            .await
            .unwrap();

        let events: Vec<_> = ResponseAggregator::stream(handle).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Token("x".into()));
        assert!(matches!(events[1], StreamEvent::End { .. }));
    }

    #[tokio::test]
    async fn stream_injects_terminal_marker_when_channel_drops() {
        let (entry, handle) = QueueEntry::new(ChatRequest::new("hi"), 8);
        drop(entry);

        let events: Vec<_> = ResponseAggregator::stream(handle).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            StreamEvent::End {
                status: CompletionStatus::Failed,
                ..
            }
        ));
    }
}
