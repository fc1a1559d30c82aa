//! Handles one accepted connection: decode, validate, ack, route to the
//! unranked or ranked queue, close. Per-connection errors are reported on
//! the connection itself and never tear down the server.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::error::{AdmissionError, PostAckError};
use crate::priority::Priority;
use crate::queue::{RankedQueue, UnrankedQueue};
use crate::task::{RankedTask, UnrankedTask, DEFAULT_MAX_TOKENS};
use crate::transport::Channel;
use crate::wire::{self, AckEnvelope, ErrorEnvelope, RequestEnvelope};

pub struct QueueRouter<'a> {
    pub unranked: &'a UnrankedQueue,
    pub ranked: &'a RankedQueue,
}

/// Read, decode, validate, ack, and route one request. Returns nothing —
/// all outcomes are communicated on `conn`, except an enqueue failure after
/// ack: the connection is already closed by then, so that failure is
/// reported asynchronously via the callback endpoint instead.
pub fn handle<C: Channel>(mut conn: C, router: QueueRouter<'_>) {
    let mut buf = vec![0u8; wire::REQUEST_RECEIVE_WINDOW];
    let n = match conn.read(&mut buf) {
        Ok(0) => return, // empty read: close silently
        Ok(n) => n,
        Err(e) => {
            debug!(error = %e, "connection read failed");
            return;
        }
    };

    let envelope: RequestEnvelope = match wire::decode(&buf[..n]) {
        Ok(e) => e,
        Err(e) => {
            let err = AdmissionError::Malformed(e.to_string());
            debug!(error = %err, "envelope decode failed");
            send_error(&mut conn, "unknown", &err);
            return;
        }
    };

    let id = match envelope.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            send_error(&mut conn, "unknown", &AdmissionError::MissingField("id"));
            return;
        }
    };

    let text = match envelope.text {
        Some(t) => t,
        None => {
            send_error(&mut conn, &id, &AdmissionError::MissingField("text"));
            return;
        }
    };

    let callback = match envelope.callback {
        Some(c) => c,
        None => {
            send_error(&mut conn, &id, &AdmissionError::MissingField("callback"));
            return;
        }
    };

    // Duplicate every string field into owned storage before enqueueing —
    // `buf` does not outlive this function, but the task must.
    let task_id = id.clone();
    let payload = text.clone();
    let callback_endpoint = callback.clone();
    let model_id = envelope.model_id;
    let max_tokens = envelope.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

    send_ack(&mut conn, &id);

    let ranked = envelope.ranked.unwrap_or(true);
    if ranked {
        router.unranked.push(UnrankedTask {
            task_id,
            payload,
            callback_endpoint,
            model_id,
            max_tokens,
        });
    } else {
        let priority = envelope
            .priority
            .as_deref()
            .map(Priority::from_string)
            .unwrap_or_default();
        let task = RankedTask {
            task_id,
            payload,
            callback_endpoint: callback_endpoint.clone(),
            model_id,
            max_tokens,
            priority,
            arrival_sequence: 0,
        };
        if let Err(_rejected) = router.ranked.push(task) {
            let post_ack_err = PostAckError::QueueFull;
            warn!(id = %id, error = %post_ack_err, "ranked queue full on direct-to-ranked submission");
            let (token, _code) = post_ack_err.token_and_code();
            let err = ErrorEnvelope::new(id, token);
            crate::callback::deliver_best_effort(&callback_endpoint, &err);
        }
    }
}

fn send_ack<C: Write>(conn: &mut C, id: &str) {
    let ack = AckEnvelope::new(id);
    if let Ok(bytes) = wire::encode(&ack) {
        let _ = conn.write_all(&bytes);
    }
}

fn send_error<C: Write>(conn: &mut C, id: &str, err: &AdmissionError) {
    let (token, _code) = err.token_and_code();
    let envelope = ErrorEnvelope::new(id, token);
    if let Ok(bytes) = wire::encode(&envelope) {
        let _ = conn.write_all(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// An in-memory duplex stream good enough to drive `handle` in tests:
    /// reads come from a fixed buffer, writes accumulate into a `Vec`.
    struct MockConn {
        read: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for MockConn {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.read.read(buf)
        }
    }
    impl Write for MockConn {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn mock(bytes: Vec<u8>) -> MockConn {
        MockConn {
            read: Cursor::new(bytes),
            written: Vec::new(),
        }
    }

    #[test]
    fn missing_text_rejected_before_ack() {
        let req = RequestEnvelope {
            id: Some("x".to_string()),
            text: None,
            callback: Some("/tmp/cb.sock".to_string()),
            model_id: None,
            ranked: None,
            max_tokens: None,
            priority: None,
        };
        let bytes = wire::encode(&req).unwrap();
        let conn = mock(bytes);
        let unranked = UnrankedQueue::new();
        let ranked = RankedQueue::new(10);
        handle(
            conn,
            QueueRouter {
                unranked: &unranked,
                ranked: &ranked,
            },
        );
        assert_eq!(unranked.len(), 0);
        assert_eq!(ranked.len(), 0);
    }

    #[test]
    fn happy_path_enqueues_to_unranked() {
        let req = RequestEnvelope {
            id: Some("a".to_string()),
            text: Some("hello".to_string()),
            callback: Some("/tmp/cb.sock".to_string()),
            model_id: None,
            ranked: None,
            max_tokens: None,
            priority: None,
        };
        let bytes = wire::encode(&req).unwrap();
        let conn = mock(bytes);
        let unranked = UnrankedQueue::new();
        let ranked = RankedQueue::new(10);
        handle(
            conn,
            QueueRouter {
                unranked: &unranked,
                ranked: &ranked,
            },
        );
        assert_eq!(unranked.len(), 1);
        assert_eq!(ranked.len(), 0);
    }

    #[test]
    fn ranked_false_routes_directly_with_normal_default() {
        let req = RequestEnvelope {
            id: Some("b".to_string()),
            text: Some("hi".to_string()),
            callback: Some("/tmp/cb.sock".to_string()),
            model_id: None,
            ranked: Some(false),
            max_tokens: None,
            priority: None,
        };
        let bytes = wire::encode(&req).unwrap();
        let conn = mock(bytes);
        let unranked = UnrankedQueue::new();
        let ranked = RankedQueue::new(10);
        handle(
            conn,
            QueueRouter {
                unranked: &unranked,
                ranked: &ranked,
            },
        );
        assert_eq!(unranked.len(), 0);
        let task = ranked.pop_best().unwrap();
        assert_eq!(task.priority, Priority::Normal);
    }

    #[test]
    fn ranked_false_honors_explicit_priority() {
        let req = RequestEnvelope {
            id: Some("c".to_string()),
            text: Some("hi".to_string()),
            callback: Some("/tmp/cb.sock".to_string()),
            model_id: None,
            ranked: Some(false),
            max_tokens: None,
            priority: Some("critical".to_string()),
        };
        let bytes = wire::encode(&req).unwrap();
        let conn = mock(bytes);
        let unranked = UnrankedQueue::new();
        let ranked = RankedQueue::new(10);
        handle(
            conn,
            QueueRouter {
                unranked: &unranked,
                ranked: &ranked,
            },
        );
        let task = ranked.pop_best().unwrap();
        assert_eq!(task.priority, Priority::Critical);
    }

    #[test]
    fn empty_read_closes_silently() {
        let conn = mock(Vec::new());
        let unranked = UnrankedQueue::new();
        let ranked = RankedQueue::new(10);
        handle(
            conn,
            QueueRouter {
                unranked: &unranked,
                ranked: &ranked,
            },
        );
        assert_eq!(unranked.len(), 0);
    }
}
