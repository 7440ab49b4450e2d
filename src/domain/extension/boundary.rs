//! Fault boundary around extension hooks
//!
//! Every hook invocation goes through here. Errors and panics come back as
//! `DomainError::ExtensionFault`; nothing unwinds into the caller.

use super::capability::Capability;
use crate::domain::shared::{DomainError, Result};
use futures::FutureExt;
use metrics::counter;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::error;

/// Run a hook on the current task, containing errors and panics
pub(crate) async fn contain<T, F>(unit: &str, hook: Capability, future: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(fault(unit, hook, format!("{:#}", err))),
        Err(payload) => Err(fault(unit, hook, panic_message(payload.as_ref()))),
    }
}

/// Run a hook on its own task with a deadline.
///
/// A late hook is abandoned, not cancelled: its task keeps running and the
/// result is dropped when it eventually arrives.
pub(crate) async fn contain_with_deadline<T, F>(
    unit: &str,
    hook: Capability,
    deadline: Duration,
    future: F,
) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let task = tokio::spawn(future);
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(err))) => Err(fault(unit, hook, format!("{:#}", err))),
        Ok(Err(join_err)) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            Err(fault(unit, hook, panic_message(payload.as_ref())))
        }
        Ok(Err(join_err)) => Err(fault(unit, hook, join_err.to_string())),
        Err(_) => {
            let after_ms = deadline.as_millis() as u64;
            error!("{}::{} did not return within {}ms", unit, hook, after_ms);
            Err(record(DomainError::Timeout {
                unit: unit.to_string(),
                hook: hook.hook_name(),
                after_ms,
            }))
        }
    }
}

fn fault(unit: &str, hook: Capability, message: String) -> DomainError {
    error!("{}::{} failed: {}", unit, hook, message);
    record(DomainError::ExtensionFault {
        unit: unit.to_string(),
        hook: hook.hook_name(),
        message,
    })
}

fn record(err: DomainError) -> DomainError {
    if let DomainError::ExtensionFault { hook, .. } | DomainError::Timeout { hook, .. } = &err {
        counter!("sipext_extension_faults_total", "hook" => *hook, "kind" => err.kind())
            .increment(1);
    }
    err
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
