//! Worker pool: N symmetric threads that drain the ranked queue, dispatch
//! to a model, and deliver the outcome to the submitter's callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PostAckError;
use crate::pool::Pool;
use crate::queue::RankedQueue;
use crate::wire::{CHAT_TOOL_ID, ErrorEnvelope, ResultEnvelope};

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Responses longer than this are truncated before framing rather than
/// failing the task — generation succeeding but being verbose is not an
/// `internal_error`.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024;

pub struct Worker {
    pool: Arc<Pool>,
    ranked: Arc<RankedQueue>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(pool: Arc<Pool>, ranked: Arc<RankedQueue>, running: Arc<AtomicBool>) -> Self {
        Self {
            pool,
            ranked,
            running,
        }
    }

    pub fn run(&self) {
        while self.running.load(Ordering::Relaxed) {
            let Some(task) = self.ranked.pop_best() else {
                std::thread::sleep(IDLE_SLEEP);
                continue;
            };

            match self.dispatch(&task) {
                Ok(result) => {
                    crate::callback::deliver_best_effort(&task.callback_endpoint, &result);
                }
                Err(post_ack_err) => {
                    warn!(id = %task.task_id, error = %post_ack_err, "task failed after ack");
                    let (token, _code) = post_ack_err.token_and_code();
                    let err = ErrorEnvelope::new(task.task_id.clone(), token);
                    crate::callback::deliver_best_effort(&task.callback_endpoint, &err);
                }
            }
        }
    }

    fn dispatch(&self, task: &crate::task::RankedTask) -> Result<ResultEnvelope, PostAckError> {
        let guard = match task.model_id {
            Some(id) => self
                .pool
                .acquire_guarded_by_id(id)
                .ok_or(PostAckError::ModelNotFound(id))?,
            None => self
                .pool
                .acquire_guarded(None)
                .ok_or(PostAckError::NoModelAvailable)?,
        };

        let generation = self.pool.generate(guard.id, &task.payload, task.max_tokens);
        // `guard` releases on drop regardless of which branch below runs.
        let response = generation.map_err(|e| PostAckError::InferenceFailed(e.to_string()))?;

        let (body, was_truncated) = truncate_utf8(&response, MAX_RESPONSE_BYTES);
        if was_truncated {
            debug!(id = %task.task_id, "response truncated before framing");
        }

        let tool_input_json =
            serde_json::to_string(&[body]).map_err(|_| PostAckError::ResponseOverflow(response.len()))?;

        Ok(ResultEnvelope {
            id: task.task_id.clone(),
            model_id: guard.id,
            tool_id: CHAT_TOOL_ID,
            tool_input_json,
            priority: task.priority.to_string(),
        })
    }
}

/// Truncate `s` to at most `max_bytes`, respecting UTF-8 char boundaries.
/// Returns the (possibly truncated) owned string and whether truncation
/// happened.
fn truncate_utf8(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    (s[..end].to_string(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, StubBackend};
    use crate::model::ModelSpec;
    use crate::priority::Priority;
    use crate::task::RankedTask;

    fn pool_with_stub() -> Arc<Pool> {
        let backend: Arc<dyn Backend> = Arc::new(StubBackend::new());
        let pool = Arc::new(Pool::new(backend));
        let spec: ModelSpec = "models/fake.gguf".parse().unwrap();
        pool.load(&spec).unwrap();
        pool
    }

    fn task(model_id: Option<u64>) -> RankedTask {
        RankedTask {
            task_id: "t".to_string(),
            payload: "hello".to_string(),
            callback_endpoint: "/tmp/cb.sock".to_string(),
            model_id,
            max_tokens: 256,
            priority: Priority::Normal,
            arrival_sequence: 0,
        }
    }

    #[test]
    fn happy_path_wraps_response_in_json_array() {
        let pool = pool_with_stub();
        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(Arc::clone(&pool), Arc::new(RankedQueue::new(10)), running);
        let result = worker.dispatch(&task(None)).unwrap();
        assert_eq!(result.tool_input_json, "[\"hello\"]");
        assert_eq!(result.model_id, 1);
        assert_eq!(result.priority, "normal");
        assert_eq!(pool.active_requests(1), Some(0));
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        let backend: Arc<dyn Backend> =
            Arc::new(StubBackend::with_responder(|_| Ok("he said \"hi\\bye\"".to_string())));
        let pool = Arc::new(Pool::new(backend));
        pool.load(&"a.gguf".parse().unwrap()).unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(Arc::clone(&pool), Arc::new(RankedQueue::new(10)), running);
        let result = worker.dispatch(&task(None)).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&result.tool_input_json).unwrap();
        assert_eq!(parsed[0], "he said \"hi\\bye\"");
    }

    #[test]
    fn missing_model_id_fails_with_model_not_found() {
        let pool = pool_with_stub();
        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(Arc::clone(&pool), Arc::new(RankedQueue::new(10)), running);
        let err = worker.dispatch(&task(Some(99))).unwrap_err();
        assert!(matches!(err, PostAckError::ModelNotFound(99)));
    }

    #[test]
    fn empty_pool_fails_with_no_model_available() {
        let backend: Arc<dyn Backend> = Arc::new(StubBackend::new());
        let pool = Arc::new(Pool::new(backend));
        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(Arc::clone(&pool), Arc::new(RankedQueue::new(10)), running);
        let err = worker.dispatch(&task(None)).unwrap_err();
        assert!(matches!(err, PostAckError::NoModelAvailable));
    }

    #[test]
    fn model_released_even_on_inference_failure() {
        let backend: Arc<dyn Backend> =
            Arc::new(StubBackend::with_responder(|_| Err(crate::backend::BackendError::GenerationFailed)));
        let pool = Arc::new(Pool::new(backend));
        pool.load(&"a.gguf".parse().unwrap()).unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(Arc::clone(&pool), Arc::new(RankedQueue::new(10)), running);
        let err = worker.dispatch(&task(None)).unwrap_err();
        assert!(matches!(err, PostAckError::InferenceFailed(_)));
        assert_eq!(pool.active_requests(1), Some(0));
    }

    #[test]
    fn truncates_long_response() {
        let (truncated, was_truncated) = truncate_utf8(&"x".repeat(100), 10);
        assert_eq!(truncated.len(), 10);
        assert!(was_truncated);
    }
}
