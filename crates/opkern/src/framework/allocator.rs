//! Memory allocation interfaces shared by execution providers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};

/// Provider tag of the host CPU execution provider.
///
/// Lives in the core crate because host-side framework code (literal
/// tensors, staging buffers) names it without depending on the provider
/// crate.
pub const CPU_PROVIDER: &str = "cpu";

/// Memory class a buffer or kernel argument lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemType {
    /// Preferred memory of the owning provider (device memory for
    /// accelerators, plain host memory for the CPU provider).
    Default,
    /// Host-visible memory used to stage kernel inputs.
    CpuInput,
    /// Host-visible memory used to publish kernel outputs.
    CpuOutput,
}

/// Identifies which allocator produced a buffer and where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorInfo {
    pub name: &'static str,
    pub provider: &'static str,
    pub mem_type: MemType,
}

impl AllocatorInfo {
    pub const fn new(name: &'static str, provider: &'static str, mem_type: MemType) -> Self {
        AllocatorInfo {
            name,
            provider,
            mem_type,
        }
    }
}

impl fmt::Display for AllocatorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:?})", self.provider, self.name, self.mem_type)
    }
}

/// Raw memory supplier owned by an execution provider.
pub trait Allocator: Send + Sync {
    /// Describes the memory this allocator hands out.
    fn info(&self) -> &AllocatorInfo;

    /// Returns a zero-initialized buffer of `byte_len` bytes.
    fn allocate(&self, byte_len: usize) -> ExecResult<Vec<u8>>;
}

/// Looks up allocators by provider tag and memory class.
///
/// Providers insert their allocators once at session setup; kernels resolve
/// scratch and output allocators through this during execution. The set is
/// small, so lookups scan.
#[derive(Clone, Default)]
pub struct AllocatorRegistry {
    allocators: Vec<Arc<dyn Allocator>>,
}

impl AllocatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an allocator under its own reported info.
    ///
    /// A second allocator for the same `(provider, mem_type)` pair is
    /// rejected.
    pub fn insert(&mut self, allocator: Arc<dyn Allocator>) -> ExecResult<()> {
        let info = *allocator.info();
        if self.find(info.provider, info.mem_type).is_some() {
            return Err(ExecError::allocation(format!(
                "allocator already registered for {info}"
            )));
        }
        self.allocators.push(allocator);
        Ok(())
    }

    /// Resolves the allocator for a provider and memory class.
    pub fn get(&self, provider: &str, mem_type: MemType) -> ExecResult<Arc<dyn Allocator>> {
        self.find(provider, mem_type).ok_or_else(|| {
            ExecError::allocation(format!(
                "no allocator registered for provider {provider} with {mem_type:?} memory"
            ))
        })
    }

    fn find(&self, provider: &str, mem_type: MemType) -> Option<Arc<dyn Allocator>> {
        self.allocators
            .iter()
            .find(|a| a.info().provider == provider && a.info().mem_type == mem_type)
            .cloned()
    }
}

impl fmt::Debug for AllocatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.allocators.iter().map(|a| a.info()))
            .finish()
    }
}
