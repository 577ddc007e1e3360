//! Host CPU execution provider: a system allocator and the stock CPU
//! kernels, registered into the shared kernel registry at link time.

use std::sync::Arc;

use opkern::error::ExecResult;
use opkern::framework::allocator::{Allocator, AllocatorInfo, AllocatorRegistry, MemType};
use opkern::framework::registry::{KernelRegistrar, KernelRegistry, KERNEL_REGISTRARS};
use opkern::tensor::aligned_byte_buffer;

pub mod math;
pub mod vision;

pub use opkern::framework::allocator::CPU_PROVIDER;

/// Plain heap allocator of the CPU provider.
pub struct CpuAllocator {
    info: AllocatorInfo,
}

impl CpuAllocator {
    pub fn new() -> Self {
        CpuAllocator {
            info: AllocatorInfo::new("cpu", CPU_PROVIDER, MemType::Default),
        }
    }
}

impl Default for CpuAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for CpuAllocator {
    fn info(&self) -> &AllocatorInfo {
        &self.info
    }

    fn allocate(&self, byte_len: usize) -> ExecResult<Vec<u8>> {
        Ok(aligned_byte_buffer(byte_len))
    }
}

/// Builds an allocator registry holding the CPU provider's allocators.
pub fn cpu_allocator_registry() -> ExecResult<AllocatorRegistry> {
    let mut registry = AllocatorRegistry::new();
    registry.insert(Arc::new(CpuAllocator::new()))?;
    Ok(registry)
}

/// Registers every CPU kernel with `registry`.
///
/// Runs automatically through the distributed-slice registrar when the
/// shared registry is first used, but can also be called against a private
/// registry.
pub fn register_cpu_kernels(registry: &mut KernelRegistry) -> ExecResult<()> {
    registry.register(math::topk::create_info()?)?;
    registry.register(math::clip::create_info_v6()?)?;
    registry.register(math::clip::create_info_v11()?)?;
    registry.register(math::sum::create_info()?)?;
    registry.register(vision::image_scaler::create_info()?)?;
    Ok(())
}

#[opkern::linkme::distributed_slice(KERNEL_REGISTRARS)]
static REGISTER_CPU_KERNELS: KernelRegistrar = register_cpu_kernels;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_zeroed_and_aligned_for_wide_elements() {
        let allocator = CpuAllocator::new();
        let bytes = allocator.allocate(24).unwrap();
        assert_eq!(bytes.len(), 24);
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(bytes.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn every_cpu_kernel_registers_cleanly() {
        let mut registry = KernelRegistry::new();
        register_cpu_kernels(&mut registry).unwrap();
        assert_eq!(registry.registration_count(), 5);
        // A second pass must collide with the first.
        assert!(register_cpu_kernels(&mut registry).is_err());
    }
}
