//! Per-run storage for node argument values.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::env;
use crate::error::{ExecError, ExecResult};
use crate::graph::Node;
use crate::tensor::{DType, Tensor, TensorShape};

use super::allocator::{AllocatorRegistry, MemType};
use super::fence::Fence;
use super::value::Value;

#[derive(Default)]
struct PlannedSlot {
    capacity: Option<usize>,
    spare: Option<Vec<u8>>,
}

/// Owns every named argument value for one run over a node list.
///
/// Each distinct non-empty argument name maps to one slot. Slots sit behind
/// individual locks so independent nodes can execute concurrently against
/// the same frame; ordering between a producer and its consumers is the
/// fence protocol's concern, not the frame's.
///
/// A planner that knows output byte sizes ahead of time may reserve slot
/// capacities with [`ExecutionFrame::plan_buffer`]; tensor allocations for a
/// planned slot then draw on the reservation instead of hitting the
/// allocator for every request.
pub struct ExecutionFrame {
    slot_index: HashMap<String, usize>,
    slots: Vec<RwLock<Option<Value>>>,
    planned: Vec<RwLock<PlannedSlot>>,
    allocators: Arc<AllocatorRegistry>,
}

impl ExecutionFrame {
    /// Builds a frame covering every named argument of `nodes`.
    pub fn new<'a>(
        nodes: impl IntoIterator<Item = &'a Node>,
        allocators: Arc<AllocatorRegistry>,
    ) -> Self {
        let mut slot_index = HashMap::new();
        for node in nodes {
            for arg in node.inputs().iter().chain(node.outputs()) {
                if arg.exists() && !slot_index.contains_key(arg.name()) {
                    slot_index.insert(arg.name().to_string(), slot_index.len());
                }
            }
        }
        let count = slot_index.len();
        ExecutionFrame {
            slot_index,
            slots: (0..count).map(|_| RwLock::new(None)).collect(),
            planned: (0..count).map(|_| RwLock::new(PlannedSlot::default())).collect(),
            allocators,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Resolves an argument name to its slot.
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slot_index.get(name).copied()
    }

    pub fn allocators(&self) -> &Arc<AllocatorRegistry> {
        &self.allocators
    }

    /// Returns a shared handle to the slot's current value, if produced.
    pub fn value(&self, slot: usize) -> Option<Value> {
        self.slots[slot].read().unwrap().clone()
    }

    /// Installs (or replaces) the slot's value.
    pub fn set_value(&self, slot: usize, value: Value) {
        *self.slots[slot].write().unwrap() = Some(value);
    }

    /// The fence guarding the slot's value, when one is attached.
    pub fn fence(&self, slot: usize) -> Option<Arc<dyn Fence>> {
        self.slots[slot]
            .read()
            .unwrap()
            .as_ref()
            .and_then(|value| value.fence().cloned())
    }

    /// Reserves `byte_capacity` for future tensor allocations on a slot.
    ///
    /// Called before execution starts, which is why it takes `&mut self`.
    pub fn plan_buffer(&mut self, name: &str, byte_capacity: usize) -> ExecResult<()> {
        let slot = self.slot_index(name).ok_or_else(|| {
            ExecError::invalid_argument("frame", format!("unknown argument name {name}"))
        })?;
        self.planned[slot].write().unwrap().capacity = Some(byte_capacity);
        Ok(())
    }

    /// Allocates a tensor destined for `slot`.
    ///
    /// Draws on the slot's planned reservation when one fits the request;
    /// otherwise goes straight to the provider's allocator.
    pub fn allocate_tensor(
        &self,
        slot: usize,
        dtype: DType,
        shape: &TensorShape,
        provider: &str,
        mem_type: MemType,
    ) -> ExecResult<Tensor> {
        let allocator = self.allocators.get(provider, mem_type)?;
        if !shape.is_concrete() {
            return Err(ExecError::invalid_argument(
                "frame",
                format!("output shape {shape} has symbolic dimensions"),
            ));
        }
        let needed = shape.size() as usize * dtype.size_in_bytes();

        if !env::buffer_reuse_disabled() {
            let mut planned = self.planned[slot].write().unwrap();
            if planned.capacity.map_or(false, |capacity| capacity >= needed) {
                let mut bytes = match planned.spare.take() {
                    Some(mut spare) if spare.capacity() >= needed => {
                        spare.clear();
                        spare.resize(needed, 0);
                        spare
                    }
                    _ => {
                        // First allocation reserves the full planned capacity
                        // so later, larger requests on this slot still fit.
                        let capacity = planned.capacity.unwrap_or(needed);
                        allocator.allocate(capacity)?
                    }
                };
                bytes.truncate(needed);
                return Tensor::from_bytes(dtype, shape.clone(), bytes, *allocator.info());
            }
        }

        let bytes = allocator.allocate(needed)?;
        Tensor::from_bytes(dtype, shape.clone(), bytes, *allocator.info())
    }

    /// Returns a displaced buffer to the slot's reservation.
    pub fn reclaim_buffer(&self, slot: usize, bytes: Vec<u8>) {
        let mut planned = self.planned[slot].write().unwrap();
        if planned.capacity.is_some() && planned.spare.is_none() {
            planned.spare = Some(bytes);
        }
    }

    /// Installs an externally produced value under its argument name.
    pub fn feed(&self, name: &str, value: Value) -> ExecResult<()> {
        let slot = self.slot_index(name).ok_or_else(|| {
            ExecError::invalid_argument("frame", format!("unknown argument name {name}"))
        })?;
        self.set_value(slot, value);
        Ok(())
    }

    /// Reads back the value produced under an argument name.
    pub fn fetch(&self, name: &str) -> ExecResult<Value> {
        let slot = self.slot_index(name).ok_or_else(|| {
            ExecError::invalid_argument("frame", format!("unknown argument name {name}"))
        })?;
        self.value(slot).ok_or_else(|| {
            ExecError::execution(format!("value for {name} was never produced"))
        })
    }
}
