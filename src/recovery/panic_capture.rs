//! Catching panics out of futures while keeping the panic's stack trace.
//!
//! `catch_unwind` only hands back the payload, so a process-wide hook
//! records message, location and backtrace for panics that happen while a
//! [`CatchPanic`] future is being polled on the current thread.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

/// What the hook saw when a panic was raised inside a boundary.
#[derive(Debug, Clone)]
pub struct CapturedPanic {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: String,
}

thread_local! {
    static BOUNDARY_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Installs the capturing hook. Idempotent.
///
/// Panics outside any boundary are forwarded to the hook that was in place
/// before.
pub fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let inside_boundary = BOUNDARY_DEPTH.try_with(|d| d.get() > 0).unwrap_or(false);
            if !inside_boundary {
                previous(info);
                return;
            }

            let captured = CapturedPanic {
                message: panic_message(info),
                location: info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                backtrace: Backtrace::force_capture().to_string(),
            };
            let _ = LAST_PANIC.try_with(|slot| *slot.borrow_mut() = Some(captured));
        }));
    });
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    payload_message(info.payload())
}

fn payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        BOUNDARY_DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        BOUNDARY_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Future adapter that turns a panic during `poll` into `Err(CapturedPanic)`.
///
/// The inner future is not polled again after it panicked.
pub struct CatchPanic<F> {
    inner: Option<Pin<Box<F>>>,
}

impl<F: Future> CatchPanic<F> {
    pub fn new(future: F) -> Self {
        Self {
            inner: Some(Box::pin(future)),
        }
    }
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, CapturedPanic>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Pending;
        };

        let result = {
            let _depth = DepthGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx)))
        };

        match result {
            Ok(Poll::Ready(output)) => {
                self.inner = None;
                Poll::Ready(Ok(output))
            }
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => {
                self.inner = None;
                let captured = LAST_PANIC
                    .with(|slot| slot.borrow_mut().take())
                    .unwrap_or_else(|| CapturedPanic {
                        message: payload_message(payload.as_ref()),
                        location: None,
                        backtrace: String::new(),
                    });
                Poll::Ready(Err(captured))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_output() {
        install_panic_hook();
        let result = CatchPanic::new(async { 41 + 1 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn captures_message_location_and_trace() {
        install_panic_hook();
        let result = CatchPanic::new(async {
            tokio::task::yield_now().await;
            panic!("boom at {}", 7);
        })
        .await;

        let captured = result.unwrap_err();
        assert_eq!(captured.message, "boom at 7");
        assert!(captured
            .location
            .as_deref()
            .is_some_and(|l| l.contains("panic_capture.rs")));
        assert!(!captured.backtrace.is_empty());
    }

    #[tokio::test]
    async fn depth_is_restored_after_panic() {
        install_panic_hook();
        let _ = CatchPanic::new(async { panic!("first") }).await;
        assert_eq!(BOUNDARY_DEPTH.with(|d| d.get()), 0);
    }
}
