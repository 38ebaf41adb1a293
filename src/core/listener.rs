//! Notification hooks for profilers, debuggers and the code cache.

use super::address::Address;

/// Receives every published stub, freshly generated or hydrated.
///
/// All methods default to doing nothing.
pub trait CodeEventListener: Send + Sync {
    /// Register a stub's code region with the profiler.
    fn register_stub(&self, _name: &str, _begin: Address, _end: Address) {}

    fn should_post_dynamic_code_generated(&self) -> bool {
        false
    }

    /// Post a "dynamic code generated" event. Only called when
    /// [`should_post_dynamic_code_generated`](Self::should_post_dynamic_code_generated)
    /// returns true.
    fn post_dynamic_code_generated(&self, _name: &str, _begin: Address, _end: Address) {}

    /// Publish an entry address of a freshly generated stub to the code cache.
    fn add_stub_address(&self, _addr: Address) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl CodeEventListener for NullListener {}

/// Listener that reports events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl CodeEventListener for LoggingListener {
    fn register_stub(&self, name: &str, begin: Address, end: Address) {
        log::trace!("register stub {name} [{begin}, {end})");
    }

    fn should_post_dynamic_code_generated(&self) -> bool {
        log::log_enabled!(log::Level::Trace)
    }

    fn post_dynamic_code_generated(&self, name: &str, begin: Address, end: Address) {
        log::trace!("dynamic code generated: {name} [{begin}, {end})");
    }

    fn add_stub_address(&self, addr: Address) {
        log::trace!("stub address published: {addr}");
    }
}
