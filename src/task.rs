//! Owned task records carried across the two queues. Every field is an
//! owned `String`/scalar — none of it borrows from the connection that
//! produced it, so a task outlives the handler that enqueued it.

use crate::priority::Priority;

#[derive(Debug, Clone)]
pub struct UnrankedTask {
    pub task_id: String,
    pub payload: String,
    pub callback_endpoint: String,
    pub model_id: Option<u64>,
    pub max_tokens: u32,
}

impl UnrankedTask {
    pub fn into_ranked(self, priority: Priority, arrival_sequence: u64) -> RankedTask {
        RankedTask {
            task_id: self.task_id,
            payload: self.payload,
            callback_endpoint: self.callback_endpoint,
            model_id: self.model_id,
            max_tokens: self.max_tokens,
            priority,
            arrival_sequence,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedTask {
    pub task_id: String,
    pub payload: String,
    pub callback_endpoint: String,
    pub model_id: Option<u64>,
    pub max_tokens: u32,
    pub priority: Priority,
    pub arrival_sequence: u64,
}

pub const DEFAULT_MAX_TOKENS: u32 = 256;
