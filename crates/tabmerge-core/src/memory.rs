//! Memory governor: advisory process-memory sampling
//!
//! Samples are reported and classified into tiers, and every sample is
//! followed by a reclamation pass over the accumulator. Nothing here ever
//! pauses or fails a run.

use crate::accumulator::MergeAccumulator;
use crate::options::MergeOptions;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Source of "current process memory usage in bytes"
pub trait MemoryProbe: Send {
    /// Current usage, or `None` if it cannot be determined
    fn current_usage_bytes(&mut self) -> Option<u64>;
}

impl<F> MemoryProbe for F
where
    F: FnMut() -> Option<u64> + Send,
{
    fn current_usage_bytes(&mut self) -> Option<u64> {
        self()
    }
}

/// Resident set size of this process, via `sysinfo`
pub struct SysinfoProbe {
    system: System,
    pid: Option<Pid>,
}

impl std::fmt::Debug for SysinfoProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoProbe")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl MemoryProbe for SysinfoProbe {
    fn current_usage_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(sysinfo::Process::memory)
    }
}

/// Informational usage tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Normal,
    Elevated,
    High,
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryTier::Normal => write!(f, "normal"),
            MemoryTier::Elevated => write!(f, "elevated"),
            MemoryTier::High => write!(f, "high"),
        }
    }
}

/// One memory reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub usage_bytes: u64,
    pub tier: MemoryTier,
}

impl MemorySample {
    /// Usage in GiB
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_gb(&self) -> f64 {
        self.usage_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Samples memory after each file and batch and triggers reclamation
pub struct MemoryGovernor {
    probe: Box<dyn MemoryProbe>,
    elevated_bytes: u64,
    high_bytes: u64,
    peak_bytes: u64,
    last_tier: MemoryTier,
}

impl std::fmt::Debug for MemoryGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGovernor")
            .field("elevated_bytes", &self.elevated_bytes)
            .field("high_bytes", &self.high_bytes)
            .field("peak_bytes", &self.peak_bytes)
            .field("last_tier", &self.last_tier)
            .finish_non_exhaustive()
    }
}

impl MemoryGovernor {
    /// Create a governor with tier thresholds from the options
    pub fn new(probe: Box<dyn MemoryProbe>, options: &MergeOptions) -> Self {
        Self {
            probe,
            elevated_bytes: options.elevated_memory_bytes,
            high_bytes: options.high_memory_bytes,
            peak_bytes: 0,
            last_tier: MemoryTier::Normal,
        }
    }

    /// Classify a usage figure
    pub fn tier_for(&self, usage_bytes: u64) -> MemoryTier {
        if usage_bytes > self.high_bytes {
            MemoryTier::High
        } else if usage_bytes > self.elevated_bytes {
            MemoryTier::Elevated
        } else {
            MemoryTier::Normal
        }
    }

    /// Take one sample; `None` when the probe has no reading
    pub fn sample(&mut self) -> Option<MemorySample> {
        let usage_bytes = self.probe.current_usage_bytes()?;
        let tier = self.tier_for(usage_bytes);

        self.peak_bytes = self.peak_bytes.max(usage_bytes);
        if tier > self.last_tier {
            warn!(usage_bytes, %tier, "memory usage rose");
        } else {
            debug!(usage_bytes, %tier, "memory sample");
        }
        self.last_tier = tier;

        Some(MemorySample { usage_bytes, tier })
    }

    /// Sample, then ask the accumulator to release spare capacity
    pub fn checkpoint(&mut self, accumulator: &mut MergeAccumulator) -> Option<MemorySample> {
        let sample = self.sample();
        let released = accumulator.reclaim();
        if released > 0 {
            debug!(released_rows = released, "reclaimed accumulator capacity");
        }
        sample
    }

    /// Highest usage seen so far
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::HeaderPolicy;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn scripted(readings: Vec<Option<u64>>) -> Box<dyn MemoryProbe> {
        let mut readings = readings.into_iter();
        Box::new(move || readings.next().flatten())
    }

    #[test]
    fn test_tiers() {
        let governor = MemoryGovernor::new(scripted(vec![]), &MergeOptions::default());
        assert_eq!(governor.tier_for(GIB), MemoryTier::Normal);
        assert_eq!(governor.tier_for(2 * GIB), MemoryTier::Elevated);
        assert_eq!(governor.tier_for(4 * GIB), MemoryTier::High);
    }

    #[test]
    fn test_peak_tracks_maximum() {
        let mut governor = MemoryGovernor::new(
            scripted(vec![Some(10), Some(50), None, Some(20)]),
            &MergeOptions::default(),
        );

        assert_eq!(governor.sample().map(|s| s.usage_bytes), Some(10));
        assert_eq!(governor.sample().map(|s| s.usage_bytes), Some(50));
        assert!(governor.sample().is_none());
        assert_eq!(governor.sample().map(|s| s.usage_bytes), Some(20));
        assert_eq!(governor.peak_bytes(), 50);
    }

    #[test]
    fn test_checkpoint_reclaims_even_without_reading() {
        let mut governor = MemoryGovernor::new(scripted(vec![None]), &MergeOptions::default());
        let mut acc = MergeAccumulator::new(HeaderPolicy::KeepAllFirstRows);
        assert!(governor.checkpoint(&mut acc).is_none());
    }

    #[test]
    fn test_usage_gb() {
        let sample = MemorySample {
            usage_bytes: 3 * GIB / 2,
            tier: MemoryTier::Normal,
        };
        assert!((sample.usage_gb() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sysinfo_probe_reads_own_process() {
        let mut probe = SysinfoProbe::new();
        // Some sandboxes hide process info; only check plausibility when present.
        if let Some(bytes) = probe.current_usage_bytes() {
            assert!(bytes > 0);
        }
    }
}
