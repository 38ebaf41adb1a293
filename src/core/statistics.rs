//! Stub generation statistics.

use hashbrown::HashMap;
use std::fmt;

use super::phase::StubsKind;
use super::registry::StubRegistry;
use super::session::STUB_ROUTINES_GROUP;

/// Summary of the stubs known to a registry.
#[derive(Debug, Default, Clone)]
pub struct StubStatistics {
    /// Declared stub count per phase, in phase order.
    pub phase_counts: Vec<(StubsKind, usize)>,

    /// Stub routines registered (generated or loaded).
    pub emitted: usize,

    /// Stub routines hydrated from an archive.
    pub loaded_from_cache: usize,

    /// Total size of all finished descriptors (bytes).
    pub total_code_size: u64,

    /// Largest finished stub.
    pub largest_stub_size: u64,
    pub largest_stub_name: String,

    /// Descriptor count per group.
    pub group_counts: HashMap<String, usize>,
}

impl StubStatistics {
    pub fn collect(registry: &StubRegistry) -> Self {
        let mut stats = StubStatistics {
            phase_counts: StubsKind::ALL
                .iter()
                .map(|&kind| (kind, kind.stub_count()))
                .collect(),
            ..Default::default()
        };

        for desc in registry.descriptors() {
            *stats
                .group_counts
                .entry(desc.group().to_string())
                .or_insert(0) += 1;

            if desc.group() == STUB_ROUTINES_GROUP {
                stats.emitted += 1;
                if desc.loaded_from_cache() {
                    stats.loaded_from_cache += 1;
                }
            }

            let size = desc.size_in_bytes();
            stats.total_code_size += size;
            if size > stats.largest_stub_size {
                stats.largest_stub_size = size;
                stats.largest_stub_name = desc.name().to_string();
            }
        }
        stats
    }

    /// Stub routines emitted by this process.
    pub fn generated(&self) -> usize {
        self.emitted - self.loaded_from_cache
    }
}

impl fmt::Display for StubStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StubRoutines Stubs:")?;
        for (kind, count) in &self.phase_counts {
            let label = format!("{kind} stubs:");
            writeln!(f, "  {label:<22} {count}")?;
        }
        writeln!(
            f,
            "Total stubroutines stubs emitted: {} (generated={}, loaded from cache={})",
            self.emitted,
            self.generated(),
            self.loaded_from_cache
        )?;
        writeln!(f, "Total code size: {} bytes", self.total_code_size)?;

        if !self.largest_stub_name.is_empty() {
            writeln!(
                f,
                "Largest stub: {} ({} bytes)",
                self.largest_stub_name, self.largest_stub_size
            )?;
        }

        if self.group_counts.len() > 1 {
            writeln!(f, "Descriptors by group:")?;
            let mut sorted: Vec<_> = self.group_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (group, count) in sorted {
                writeln!(f, "  {group}: {count}")?;
            }
        }

        Ok(())
    }
}
