//! Panic capture for generation calls.
//!
//! A panic inside ONNX Runtime bindings or a model is turned into a value so
//! it can be reported through the usual error path. While a capture is active
//! on a thread, the process panic hook stays silent for that thread; panics
//! anywhere else still reach the previously installed hook.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

static INSTALL_HOOK: Once = Once::new();

/// Runs `f`, returning the panic message as `Err` if it panics.
pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    install_hook();
    let _guard = CaptureGuard::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !CAPTURING.with(|c| c.get()) {
                previous(info);
            }
        }));
    });
}

fn is_capturing() -> bool {
    CAPTURING.with(|c| c.get())
}

/// Marks the current thread as capturing; restores the prior state on drop.
struct CaptureGuard {
    was_capturing: bool,
}

impl CaptureGuard {
    fn enter() -> Self {
        let was_capturing = CAPTURING.with(|c| c.replace(true));
        Self { was_capturing }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURING.with(|c| c.set(self.was_capturing));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
