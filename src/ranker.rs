//! The ranker loop: the one place the kernel uses the model on itself,
//! turning raw payload text into a priority judgment before the task is
//! allowed into the dispatch queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ErrorToken;
use crate::pool::Pool;
use crate::priority::Priority;
use crate::queue::{RankedQueue, UnrankedQueue};
use crate::wire::ErrorEnvelope;

const IDLE_SLEEP: Duration = Duration::from_millis(10);
const RANKING_MAX_TOKENS: u32 = 24;
const CLASSIFICATION_RESPONSE_SCAN_BYTES: usize = 64;

const PROMPT_TEMPLATE: &str = "Classify the urgency of the following message and \
redact any personally identifying information.\nRespond with exactly two lines:\n\
PRIORITY: one of CRITICAL, HIGH, NORMAL, LOW\n\
REDACTED: the message with PII replaced by [EMAIL], [PHONE], [SSN], [NAME], \
[ADDRESS], or [CARD] placeholders\n\nMessage:\n";

fn build_prompt(payload: &str) -> String {
    let mut prompt = String::with_capacity(PROMPT_TEMPLATE.len() + payload.len());
    prompt.push_str(PROMPT_TEMPLATE);
    prompt.push_str(payload);
    prompt
}

/// Parse a classifier response for its `PRIORITY:` line. Folds the first
/// `CLASSIFICATION_RESPONSE_SCAN_BYTES` bytes to uppercase and returns the
/// first of CRITICAL/HIGH/LOW found, in that search order; anything else
/// (including a missing token) maps to `Normal`.
fn parse_priority(response: &str) -> Priority {
    let scan_len = response.len().min(CLASSIFICATION_RESPONSE_SCAN_BYTES);
    let folded = response[..scan_len].to_ascii_uppercase();
    for (token, priority) in [
        ("CRITICAL", Priority::Critical),
        ("HIGH", Priority::High),
        ("LOW", Priority::Low),
    ] {
        if folded.contains(token) {
            return priority;
        }
    }
    Priority::Normal
}

pub struct Ranker {
    pool: Arc<Pool>,
    unranked: Arc<UnrankedQueue>,
    ranked: Arc<RankedQueue>,
    running: Arc<AtomicBool>,
}

impl Ranker {
    pub fn new(
        pool: Arc<Pool>,
        unranked: Arc<UnrankedQueue>,
        ranked: Arc<RankedQueue>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool,
            unranked,
            ranked,
            running,
        }
    }

    /// Runs until `running` is cleared, finishing whatever task is in hand
    /// first. Intended to be spawned on its own thread.
    pub fn run(&self) {
        while self.running.load(Ordering::Relaxed) {
            let Some(task) = self.unranked.pop() else {
                std::thread::sleep(IDLE_SLEEP);
                continue;
            };

            let priority = self.classify(&task.payload);

            // Decision: the REDACTED line is produced by the prompt but not
            // substituted here — the forwarded payload is the original
            // input, matching the documented current behavior rather than
            // the prompt's nominal intent.
            let ranked_task = task.into_ranked(priority, 0);
            let callback = ranked_task.callback_endpoint.clone();
            let id = ranked_task.task_id.clone();

            if let Err(_rejected) = self.ranked.push(ranked_task) {
                warn!(id = %id, "ranked queue full after classification");
                let err = ErrorEnvelope::new(id, ErrorToken::QueueFull);
                crate::callback::deliver_best_effort(&callback, &err);
            }
        }
    }

    /// Best-effort classification: any inference failure degrades to
    /// `Normal` rather than dropping the task.
    fn classify(&self, payload: &str) -> Priority {
        let Some(model_id) = self.pool.acquire_least_busy(None) else {
            debug!("no model available for ranking, defaulting to normal");
            return Priority::Normal;
        };
        let prompt = build_prompt(payload);
        let result = self.pool.generate(model_id, &prompt, RANKING_MAX_TOKENS);
        self.pool.release(model_id);
        match result {
            Ok(response) => parse_priority(&response),
            Err(e) => {
                debug!(error = ?e, "classification inference failed, defaulting to normal");
                Priority::Normal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_critical() {
        assert_eq!(parse_priority("PRIORITY: CRITICAL\nREDACTED: hi"), Priority::Critical);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(parse_priority("priority: high"), Priority::High);
    }

    #[test]
    fn search_order_prefers_critical_over_high() {
        assert_eq!(parse_priority("HIGH then CRITICAL both appear"), Priority::Critical);
    }

    #[test]
    fn missing_token_defaults_to_normal() {
        assert_eq!(parse_priority("no usable token here"), Priority::Normal);
    }

    #[test]
    fn only_scans_first_64_bytes() {
        let padding = "x".repeat(100);
        let response = format!("{padding}CRITICAL");
        assert_eq!(parse_priority(&response), Priority::Normal);
    }
}
