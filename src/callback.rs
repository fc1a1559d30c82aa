//! Outbound callback delivery: connect to the submitter-supplied endpoint,
//! write one encoded frame, close. There is no read-back and no retry —
//! delivery is best-effort, and failure is logged, never propagated back
//! to a connection that is already closed.

use std::io::Write;

use serde::Serialize;
use tracing::warn;

use crate::transport;

/// Deliver `envelope` to `endpoint`. Returns `Err` only so a caller that
/// cares can note the failure (e.g. the worker logs which task's result was
/// lost); the error is never a reason to retry or to fail the task itself
/// again — the task is already considered answered.
pub fn deliver<T: Serialize>(endpoint: &str, envelope: &T) -> Result<(), CallbackError> {
    let bytes = crate::wire::encode(envelope).map_err(|_| CallbackError::Encode)?;
    let mut conn = transport::connect(endpoint).map_err(|_| CallbackError::Connect)?;
    conn.write_all(&bytes).map_err(|_| CallbackError::Write)?;
    Ok(())
}

/// Same as [`deliver`] but logs the failure instead of returning it — the
/// shape every call site outside of tests actually wants.
pub fn deliver_best_effort<T: Serialize>(endpoint: &str, envelope: &T) {
    if let Err(e) = deliver(endpoint, envelope) {
        warn!(endpoint, error = ?e, "callback delivery failed");
    }
}

#[derive(Debug)]
pub enum CallbackError {
    Encode,
    Connect,
    Write,
}
