//! Stub generation options.

use std::env;

/// Environment variable enabling disassembly of every generated stub.
pub const ENV_PRINT_STUB_CODE: &str = "STUBGEN_PRINT_STUB_CODE";
/// Environment variable deferring compiler stubs until after bootstrap.
pub const ENV_DELAY_COMPILER_STUBS: &str = "STUBGEN_DELAY_COMPILER_STUBS";
/// Environment variable attaching an archive to every phase.
pub const ENV_ARCHIVE_STUBS: &str = "STUBGEN_ARCHIVE_STUBS";

/// Options controlling stub generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubGenOptions {
    /// Log a disassembly of every freshly generated stub.
    pub print_stub_code: bool,
    /// Generate compiler stubs after the final phase, possibly on a worker.
    pub delay_compiler_stubs: bool,
    /// Record stub addresses into a per-phase archive.
    pub archive_stubs: bool,
}

impl StubGenOptions {
    /// Defaults overridden by the `STUBGEN_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).map(|v| parse_flag(&v)).unwrap_or(false);
        Self {
            print_stub_code: flag(ENV_PRINT_STUB_CODE),
            delay_compiler_stubs: flag(ENV_DELAY_COMPILER_STUBS),
            archive_stubs: flag(ENV_ARCHIVE_STUBS),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
