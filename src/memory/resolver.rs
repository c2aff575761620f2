//! Address resolution and value reading
//!
//! Turns one [`ReadRequest`] into a final absolute address: injected hint
//! first (the fast path), otherwise module base + offset or a literal
//! address, then the pointer-chain walk. Resolution never partially mutates
//! caller state on failure; the module cache is only written after a
//! successful lookup.

use super::cache::ModuleBaseCache;
use crate::access::{MemoryAccess, ProcessMemory};
use crate::core::types::{
    Address, AddressSpec, EngineResult, ProcessArchitecture, ProcessInfo, ReadError, ReadRequest,
    Sample, SampleValue, ValueType,
};
use tracing::trace;

/// Resolves the module base through the cache, enumerating only on a miss.
pub fn module_base(
    access: &dyn MemoryAccess,
    cache: &mut ModuleBaseCache,
    info: &ProcessInfo,
    module: &str,
) -> EngineResult<Address> {
    if let Some(base) = cache.get(&info.name, module) {
        return Ok(base);
    }

    let modules = access.modules(info.pid)?;
    let found = modules
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(module))
        .ok_or_else(|| ReadError::module_not_found(&info.name, module))?;

    cache.put(&info.name, module, found.base_address);
    trace!(module, base = %found.base_address, "module base resolved");
    Ok(found.base_address)
}

fn read_pointer(
    memory: &dyn ProcessMemory,
    arch: ProcessArchitecture,
    address: Address,
) -> EngineResult<Address> {
    let mut buf = [0u8; 8];
    let width = arch.pointer_size();
    memory.read_exact(address, &mut buf[..width])?;
    Ok(Address::new(u64::from_le_bytes(buf)))
}

/// Walks `read pointer, add offset` steps from `start`. A null pointer at any
/// level fails only this request; an address below the sane floor is rejected
/// before it is dereferenced.
fn walk_chain(
    memory: &dyn ProcessMemory,
    arch: ProcessArchitecture,
    start: Address,
    offsets: &[i64],
) -> EngineResult<Address> {
    let mut current = start;
    for (level, offset) in offsets.iter().enumerate() {
        if !current.is_sane() {
            return Err(ReadError::InvalidAddress(format!(
                "chain level {level}: {current} below minimum"
            )));
        }
        let pointer = read_pointer(memory, arch, current)?;
        if pointer.is_null() {
            return Err(ReadError::NullPointer { level });
        }
        current = pointer.offset(*offset);
    }
    Ok(current)
}

/// Produces the final byte address for a request.
pub fn resolve_address(
    access: &dyn MemoryAccess,
    memory: &dyn ProcessMemory,
    info: &ProcessInfo,
    modules: &mut ModuleBaseCache,
    request: &ReadRequest,
) -> EngineResult<Address> {
    // Fast path: a previous tick already walked this chain.
    if let Some(hint) = request.resolved_hint {
        if !request.disable_caching {
            trace!(id = %request.id, address = %hint, "using cached resolved address");
            return Ok(hint);
        }
    }

    let start = match &request.spec {
        AddressSpec::Direct { address } => *address,
        AddressSpec::ModuleOffset { module, offset } => {
            module_base(access, modules, info, module)?.offset(*offset)
        }
    };

    let resolved = if request.has_pointer_chain() {
        walk_chain(memory, info.architecture, start, &request.pointer_offsets)?
    } else {
        start
    };

    if !resolved.is_sane() {
        return Err(ReadError::InvalidAddress(format!(
            "{resolved} below minimum readable address"
        )));
    }
    Ok(resolved)
}

/// Reads one fixed-width value and widens it.
pub fn read_value(
    memory: &dyn ProcessMemory,
    address: Address,
    value_type: ValueType,
) -> EngineResult<SampleValue> {
    let mut buf = [0u8; 8];
    let size = value_type.size();
    memory.read_exact(address, &mut buf[..size])?;
    SampleValue::decode(&buf[..size], value_type)
}

/// Resolves, reads, and post-processes one request.
pub fn execute_request(
    access: &dyn MemoryAccess,
    memory: &dyn ProcessMemory,
    info: &ProcessInfo,
    modules: &mut ModuleBaseCache,
    request: &ReadRequest,
) -> EngineResult<Sample> {
    let address = resolve_address(access, memory, info, modules, request)?;
    let raw = read_value(memory, address, request.value_type)?;
    let value = request.post_process(raw)?;
    Ok(Sample { value, address })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::sim::SimAccess;
    use crate::core::types::OffsetFormat;
    use pretty_assertions::assert_eq;

    const BASE: Address = Address::new(0x0040_0000);

    fn target() -> (SimAccess, ProcessInfo, Box<dyn ProcessMemory>) {
        let sim = SimAccess::new();
        let pid = sim.spawn("game.exe", ProcessArchitecture::X64, BASE, 0x10000);
        let info = ProcessInfo {
            pid,
            name: "game.exe".to_string(),
            architecture: ProcessArchitecture::X64,
        };
        let memory = sim.open_process(pid).unwrap();
        (sim, info, memory)
    }

    #[test]
    fn test_direct_resolution() {
        let (sim, info, memory) = target();
        sim.write_u32(info.pid, BASE.offset(0x10), 1234);

        let req = ReadRequest::direct("r", BASE.offset(0x10), ValueType::U32);
        let mut modules = ModuleBaseCache::new();
        let sample = execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap();
        assert_eq!(sample.value, SampleValue::U64(1234));
        assert_eq!(sample.address, BASE.offset(0x10));
    }

    #[test]
    fn test_module_offset_uses_cache() {
        let (sim, info, memory) = target();
        sim.write_u32(info.pid, BASE.offset(0x20), 7);

        let req = ReadRequest::module_offset(
            "r",
            "game.exe",
            "0x20",
            OffsetFormat::Hex,
            ValueType::U32,
        )
        .unwrap();
        let mut modules = ModuleBaseCache::new();

        execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap();
        execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap();
        // Second resolution within the TTL hits the cache.
        assert_eq!(sim.module_list_count(), 1);
    }

    #[test]
    fn test_module_not_found() {
        let (sim, info, memory) = target();
        let req = ReadRequest::module_offset(
            "r",
            "missing.dll",
            "0x0",
            OffsetFormat::Hex,
            ValueType::U32,
        )
        .unwrap();
        let mut modules = ModuleBaseCache::new();
        let err =
            execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap_err();
        assert_eq!(
            err,
            ReadError::module_not_found("game.exe", "missing.dll")
        );
    }

    #[test]
    fn test_pointer_chain_walk() {
        let (sim, info, memory) = target();
        // [BASE+0x10] -> 0x500000; [0x500000+0x8] -> 0x600000; value at 0x600000+0x4
        sim.write_u64(info.pid, BASE.offset(0x10), 0x0050_0000);
        sim.write_u64(info.pid, Address::new(0x0050_0008), 0x0060_0000);
        sim.write_u32(info.pid, Address::new(0x0060_0004), 99);

        let req = ReadRequest::module_offset(
            "r",
            "game.exe",
            "0x10",
            OffsetFormat::Hex,
            ValueType::U32,
        )
        .unwrap()
        .with_pointer_offsets(vec![0x8, 0x4]);

        let mut modules = ModuleBaseCache::new();
        let sample = execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap();
        assert_eq!(sample.value, SampleValue::U64(99));
        assert_eq!(sample.address, Address::new(0x0060_0004));
    }

    #[test]
    fn test_null_pointer_in_chain() {
        let (sim, info, memory) = target();
        sim.write_u64(info.pid, BASE.offset(0x10), 0x0050_0000);
        sim.write_u64(info.pid, Address::new(0x0050_0008), 0); // broken link

        let req = ReadRequest::direct("r", BASE.offset(0x10), ValueType::U32)
            .with_pointer_offsets(vec![0x8, 0x4]);
        let mut modules = ModuleBaseCache::new();
        let err =
            execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap_err();
        assert_eq!(err, ReadError::NullPointer { level: 1 });
    }

    #[test]
    fn test_resolved_hint_skips_everything() {
        let (sim, info, memory) = target();
        sim.write_u32(info.pid, Address::new(0x0060_0000), 42);

        let mut req = ReadRequest::module_offset(
            "r",
            "game.exe",
            "0x10",
            OffsetFormat::Hex,
            ValueType::U32,
        )
        .unwrap()
        .with_pointer_offsets(vec![0x8]);
        req.resolved_hint = Some(Address::new(0x0060_0000));

        let mut modules = ModuleBaseCache::new();
        let sample = execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap();
        assert_eq!(sample.value, SampleValue::U64(42));
        // Neither module lookup nor chain reads happened.
        assert_eq!(sim.module_list_count(), 0);
        assert_eq!(sim.read_count(), 1);
    }

    #[test]
    fn test_hint_ignored_when_caching_disabled() {
        let (sim, info, memory) = target();
        sim.write_u32(info.pid, BASE.offset(0x30), 5);

        let mut req = ReadRequest::direct("r", BASE.offset(0x30), ValueType::U32).uncached();
        req.resolved_hint = Some(Address::new(0x0066_0000));

        let mut modules = ModuleBaseCache::new();
        let sample = execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap();
        assert_eq!(sample.address, BASE.offset(0x30));
    }

    #[test]
    fn test_null_page_rejected() {
        let (sim, info, memory) = target();
        let req = ReadRequest::direct("r", Address::new(0x100), ValueType::U32);
        let mut modules = ModuleBaseCache::new();
        let err =
            execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap_err();
        assert!(matches!(err, ReadError::InvalidAddress(_)));
        assert_eq!(sim.read_count(), 0);
    }

    #[test]
    fn test_x86_pointer_width() {
        let sim = SimAccess::new();
        let pid = sim.spawn("old.exe", ProcessArchitecture::X86, BASE, 0x10000);
        let info = ProcessInfo {
            pid,
            name: "old.exe".to_string(),
            architecture: ProcessArchitecture::X86,
        };
        let memory = sim.open_process(pid).unwrap();

        // Only 4 bytes of pointer present; an 8-byte read would fail.
        sim.write_u32(pid, BASE.offset(0x10), 0x0050_0000);
        sim.write_u32(pid, Address::new(0x0050_0000), 77);

        let req = ReadRequest::direct("r", BASE.offset(0x10), ValueType::U32)
            .with_pointer_offsets(vec![0]);
        let mut modules = ModuleBaseCache::new();
        let sample = execute_request(&sim, memory.as_ref(), &info, &mut modules, &req).unwrap();
        assert_eq!(sample.value, SampleValue::U64(77));
    }
}
