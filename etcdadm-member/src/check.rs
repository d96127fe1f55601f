//! Periodic Check (C9)
//!
//! `check` does exactly one thing: observe current health and update the
//! failure-start timestamps. It never selects or runs a recovery action —
//! that's `reconfigure`'s job (C8/C7).

use crate::error::AgentError;
use crate::observer::Observer;

pub async fn run_check(observer: &Observer<'_>) -> Result<(), AgentError> {
    let obs = observer.observe().await?;
    observer.record_check(&obs).await
}
