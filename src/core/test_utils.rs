//! Test utilities for generation-session testing.
//!
//! This module provides a fresh registry and code buffer per test, plus a
//! listener that records every notification so tests can assert on what was
//! published.

#[cfg(test)]
pub mod test {
    use parking_lot::Mutex;

    use crate::core::{Address, CodeEventListener, StubRegistry, StubsKind};
    use crate::x64::X64CodeBuffer;

    /// Base address test buffers are anchored at.
    pub const TEST_BASE: u64 = 0x7f00_0000_1000;

    /// Registry and code buffer owned by one test.
    pub struct TestContext {
        pub registry: StubRegistry,
        pub buffer: X64CodeBuffer,
        pub base: Address,
    }

    impl TestContext {
        /// Create a test context with a buffer sized for `kind`.
        pub fn new(kind: StubsKind) -> Self {
            let base = Address::new(TEST_BASE);
            Self {
                registry: StubRegistry::new(),
                buffer: X64CodeBuffer::for_phase(kind, base).expect("code buffer"),
                base,
            }
        }
    }

    /// Run a test with a temporary context.
    pub fn with_test_context<F, R>(kind: StubsKind, f: F) -> R
    where
        F: FnOnce(&mut TestContext) -> R,
    {
        let mut ctx = TestContext::new(kind);
        f(&mut ctx)
    }

    /// Listener that records every notification.
    #[derive(Default)]
    pub struct RecordingListener {
        post_events: bool,
        registered: Mutex<Vec<(String, Address, Address)>>,
        posted: Mutex<Vec<(String, Address, Address)>>,
        addresses: Mutex<Vec<Address>>,
    }

    impl RecordingListener {
        pub fn new(post_events: bool) -> Self {
            Self {
                post_events,
                ..Default::default()
            }
        }

        pub fn registered(&self) -> Vec<(String, Address, Address)> {
            self.registered.lock().clone()
        }

        pub fn posted(&self) -> Vec<(String, Address, Address)> {
            self.posted.lock().clone()
        }

        pub fn addresses(&self) -> Vec<Address> {
            self.addresses.lock().clone()
        }
    }

    impl CodeEventListener for RecordingListener {
        fn register_stub(&self, name: &str, begin: Address, end: Address) {
            self.registered.lock().push((name.to_string(), begin, end));
        }

        fn should_post_dynamic_code_generated(&self) -> bool {
            self.post_events
        }

        fn post_dynamic_code_generated(&self, name: &str, begin: Address, end: Address) {
            self.posted.lock().push((name.to_string(), begin, end));
        }

        fn add_stub_address(&self, addr: Address) {
            self.addresses.lock().push(addr);
        }
    }
}
