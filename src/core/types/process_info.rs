//! Process and module information types

use super::Address;
use serde::{Deserialize, Serialize};

/// OS process identifier.
pub type ProcessId = u32;

/// Information about a running process, as reported by the access backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub name: String,
    pub architecture: ProcessArchitecture,
}

impl ProcessInfo {
    pub fn new(pid: ProcessId, name: impl Into<String>) -> Self {
        ProcessInfo {
            pid,
            name: name.into(),
            architecture: ProcessArchitecture::Unknown,
        }
    }

    /// Case-insensitive name match, the way targets are selected.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Target process architecture; decides the pointer width used when
/// dereferencing chain steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessArchitecture {
    X86,
    X64,
    Unknown,
}

impl ProcessArchitecture {
    pub const fn pointer_size(&self) -> usize {
        match self {
            ProcessArchitecture::X86 => 4,
            // Unknown targets are assumed 64-bit; reading 8 bytes of a 4-byte
            // pointer slot fails loudly instead of truncating silently.
            ProcessArchitecture::X64 | ProcessArchitecture::Unknown => 8,
        }
    }
}

/// A module mapped into a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub base_address: Address,
    pub size: u64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, base_address: Address, size: u64) -> Self {
        ModuleInfo {
            name: name.into(),
            base_address,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching() {
        let info = ProcessInfo::new(100, "Game.EXE");
        assert!(info.matches_name("game.exe"));
        assert!(!info.matches_name("other.exe"));
    }

    #[test]
    fn test_pointer_sizes() {
        assert_eq!(ProcessArchitecture::X86.pointer_size(), 4);
        assert_eq!(ProcessArchitecture::X64.pointer_size(), 8);
        assert_eq!(ProcessArchitecture::Unknown.pointer_size(), 8);
    }

    #[test]
    fn test_module_construction() {
        let module = ModuleInfo::new("engine.dll", Address::new(0x40000), 0x1000);
        assert_eq!(module.name, "engine.dll");
        assert_eq!(module.base_address, Address::new(0x40000));
        assert_eq!(module.size, 0x1000);
    }
}
