//! Panic containment for parser and analyzer calls.
//!
//! A contained panic is turned into an error value by the caller. The process
//! panic hook is wrapped once so that panics raised inside [`contain`] are
//! logged at debug level instead of printing the default banner; panics
//! anywhere else still reach the previous hook.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static CONTAINED: Cell<bool> = const { Cell::new(false) };
}

static HOOK: Once = Once::new();

/// Wrap the current panic hook. Idempotent.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if is_contained() {
                let location = info
                    .location()
                    .map(|l| format!("{}:{}", l.file(), l.line()))
                    .unwrap_or_default();
                tracing::debug!(location = %location, "contained {}", panic_message(info.payload()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Whether the current thread is inside [`contain`].
pub fn is_contained() -> bool {
    CONTAINED.with(Cell::get)
}

/// Run `work`, turning a panic into `Err` with a readable message.
pub fn contain<T>(work: impl FnOnce() -> T) -> Result<T, String> {
    install_panic_hook();
    let _scope = Scope::enter();
    panic::catch_unwind(AssertUnwindSafe(work)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Restores the previous flag on drop, so nesting and unwinding both work.
struct Scope {
    previous: bool,
}

impl Scope {
    fn enter() -> Self {
        Self {
            previous: CONTAINED.with(|c| c.replace(true)),
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        CONTAINED.with(|c| c.set(self.previous));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
