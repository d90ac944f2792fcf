//! Memory probing used to size chunks and to refuse chunks that do not fit

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use sysinfo::System;

/// Source of the current free-memory estimate
pub trait MemoryProbe: Send + Sync {
    /// Bytes the process may still allocate
    fn available_memory_bytes(&self) -> u64;
}

/// Reads available memory from the operating system
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        SystemMemory {
            system: Mutex::new(System::new()),
        }
    }

    /// Used and total memory in bytes, refreshed
    pub fn usage(&self) -> (u64, u64) {
        match self.system.lock() {
            Ok(mut sys) => {
                sys.refresh_memory();
                (sys.used_memory(), sys.total_memory())
            }
            Err(_) => (0, 0),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn available_memory_bytes(&self) -> u64 {
        match self.system.lock() {
            Ok(mut sys) => {
                sys.refresh_memory();
                sys.available_memory()
            }
            // A poisoned lock only means another worker panicked mid-refresh
            Err(poisoned) => poisoned.into_inner().available_memory(),
        }
    }
}

/// Always reports the same amount
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn available_memory_bytes(&self) -> u64 {
        self.0
    }
}

/// Replays a list of readings, repeating the last one once exhausted
///
/// Lets tests put a converter under memory pressure for a given number of
/// probes and then relieve it.
#[derive(Debug)]
pub struct ScriptedMemory {
    readings: Vec<u64>,
    next: AtomicUsize,
}

impl ScriptedMemory {
    /// An empty script reports no memory at all
    pub fn new(readings: Vec<u64>) -> Self {
        ScriptedMemory {
            readings,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of times the probe has been read
    pub fn probes(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

impl MemoryProbe for ScriptedMemory {
    fn available_memory_bytes(&self) -> u64 {
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        self.readings
            .get(idx)
            .or_else(|| self.readings.last())
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_repeats_last() {
        let probe = ScriptedMemory::new(vec![10, 20]);
        assert_eq!(probe.available_memory_bytes(), 10);
        assert_eq!(probe.available_memory_bytes(), 20);
        assert_eq!(probe.available_memory_bytes(), 20);
        assert_eq!(probe.probes(), 3);
    }

    #[test]
    fn test_empty_script_reports_zero() {
        let probe = ScriptedMemory::new(Vec::new());
        assert_eq!(probe.available_memory_bytes(), 0);
        assert_eq!(probe.available_memory_bytes(), 0);
        assert_eq!(probe.probes(), 2);
    }
}
