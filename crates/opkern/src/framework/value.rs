//! Type-erased shared container for kernel inputs and outputs.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::tensor::Tensor;

use super::data_types::ValueTypeId;
use super::fence::Fence;

#[derive(Clone)]
struct Payload {
    data: Arc<dyn Any + Send + Sync>,
    type_id: ValueTypeId,
}

/// Type-erased container a kernel argument travels in.
///
/// A value starts unallocated and is initialized with a concrete payload at
/// most once per lifetime; re-initialization releases the previous payload
/// through its own destructor and discards any attached fence. Typed access
/// verifies the payload identity before downcasting and panics on mismatch,
/// since asking for the wrong type is a bug in the calling kernel, not a
/// runtime condition.
///
/// Cloning shares the payload. Every clone observes the same allocation, so
/// a reference obtained through one handle stays valid and identical across
/// reads through any other.
#[derive(Clone, Default)]
pub struct Value {
    inner: Option<Payload>,
    fence: Option<Arc<dyn Fence>>,
}

impl Value {
    /// Creates a value already holding `payload`.
    pub fn new<T: Send + Sync + 'static>(payload: T) -> Self {
        let mut value = Value::unallocated();
        value.init(payload);
        value
    }

    /// Creates an empty value awaiting initialization.
    pub fn unallocated() -> Self {
        Value::default()
    }

    /// Installs a payload, releasing any previous one.
    ///
    /// The previous payload (when this handle was its last owner) is dropped
    /// through its own destructor; a previously attached fence no longer
    /// describes the new payload and is discarded.
    pub fn init<T: Send + Sync + 'static>(&mut self, payload: T) {
        self.inner = Some(Payload {
            data: Arc::new(payload),
            type_id: ValueTypeId::of::<T>(),
        });
        self.fence = None;
    }

    /// Reports whether a payload has been installed.
    pub fn is_allocated(&self) -> bool {
        self.inner.is_some()
    }

    /// Reports whether the payload is a [`Tensor`].
    pub fn is_tensor(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(false, |payload| payload.type_id.is::<Tensor>())
    }

    /// Returns the identity of the stored payload, if any.
    pub fn type_id(&self) -> Option<ValueTypeId> {
        self.inner.as_ref().map(|payload| payload.type_id)
    }

    /// Borrows the payload as `T`.
    ///
    /// Panics when the value is unallocated or holds a different type; the
    /// message names both the stored and the requested type.
    pub fn get<T: 'static>(&self) -> &T {
        let payload = self.payload();
        payload.data.downcast_ref::<T>().unwrap_or_else(|| {
            panic!(
                "value holds {} but {} was requested",
                payload.type_id.name(),
                ValueTypeId::of::<T>().name()
            )
        })
    }

    /// Mutably borrows the payload as `T`.
    ///
    /// Panics on type mismatch like [`Value::get`]. Returns `None` when the
    /// payload is shared with another handle; exclusive access requires sole
    /// ownership.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let payload = match self.inner.as_mut() {
            Some(payload) => payload,
            None => panic!("value is unallocated"),
        };
        if !payload.type_id.is::<T>() {
            panic!(
                "value holds {} but {} was requested",
                payload.type_id.name(),
                ValueTypeId::of::<T>().name()
            );
        }
        Arc::get_mut(&mut payload.data).and_then(|any| any.downcast_mut::<T>())
    }

    /// Like [`Value::get_mut`] but treats a shared payload as a bug.
    pub fn expect_mut<T: 'static>(&mut self) -> &mut T {
        match self.get_mut::<T>() {
            Some(payload) => payload,
            None => panic!("value payload is shared; exclusive access needs a sole owner"),
        }
    }

    /// The fence guarding this value, when its producer attached one.
    pub fn fence(&self) -> Option<&Arc<dyn Fence>> {
        self.fence.as_ref()
    }

    /// Attaches (or replaces) the producer fence.
    pub fn set_fence(&mut self, fence: Arc<dyn Fence>) {
        self.fence = Some(fence);
    }

    /// Detaches and returns the fence.
    pub fn take_fence(&mut self) -> Option<Arc<dyn Fence>> {
        self.fence.take()
    }

    /// Consumes the value and recovers the payload.
    ///
    /// Succeeds only when this handle is the sole owner and the payload is a
    /// `T`; otherwise the payload is released normally and `None` returns.
    pub fn into_payload<T: Send + Sync + 'static>(self) -> Option<T> {
        let payload = self.inner?;
        let arc = payload.data.downcast::<T>().ok()?;
        Arc::try_unwrap(arc).ok()
    }

    /// Reports whether two handles share one payload allocation.
    pub fn shares_payload(&self, other: &Value) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a.data, &b.data),
            _ => false,
        }
    }

    fn payload(&self) -> &Payload {
        match self.inner.as_ref() {
            Some(payload) => payload,
            None => panic!("value is unallocated"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.inner.as_ref().map(|p| p.type_id.name()))
            .field("fenced", &self.fence.is_some())
            .finish()
    }
}
