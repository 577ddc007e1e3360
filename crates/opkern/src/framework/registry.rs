//! Kernel registrations and versioned lookup.
//!
//! Providers describe each kernel implementation with a [`KernelDef`] and a
//! factory, and append a registrar to the [`KERNEL_REGISTRARS`] distributed
//! slice. The process-wide registry is assembled once from every linked
//! registrar and stays immutable afterwards, so concurrent lookups need no
//! locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::error::{ExecError, ExecResult};
use crate::graph::Node;

use super::allocator::AllocatorRegistry;
use super::kernel_def::{ArgSelector, KernelDef};
use super::op_kernel::{OpKernel, OpKernelInfo};

/// Factory that builds a kernel instance bound to one node.
///
/// Factories are fallible: a node whose attributes are unacceptable (a
/// non-positive `k`, a malformed bias length) is a load-time error, not a
/// panic.
pub type KernelCreateFn = Box<dyn Fn(OpKernelInfo) -> ExecResult<Box<dyn OpKernel>> + Send + Sync>;

/// One registration: a definition plus the factory it selects.
pub struct KernelCreateInfo {
    def: Arc<KernelDef>,
    create: KernelCreateFn,
}

impl KernelCreateInfo {
    pub fn new(def: KernelDef, create: KernelCreateFn) -> Self {
        KernelCreateInfo {
            def: Arc::new(def),
            create,
        }
    }

    pub fn def(&self) -> &Arc<KernelDef> {
        &self.def
    }

    /// Instantiates the kernel for `node`.
    pub fn create_kernel(
        &self,
        node: Arc<Node>,
        allocators: Arc<AllocatorRegistry>,
    ) -> ExecResult<Box<dyn OpKernel>> {
        let info = OpKernelInfo::new(node, Arc::clone(&self.def), allocators);
        (self.create)(info)
    }
}

impl fmt::Debug for KernelCreateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCreateInfo")
            .field("def", &self.def)
            .finish()
    }
}

/// Multimap of kernel registrations keyed by operator type.
#[derive(Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, Vec<KernelCreateInfo>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration, rejecting one that collides with an existing
    /// entry (same operator, domain, provider, and constraint signature
    /// with overlapping version ranges).
    pub fn register(&mut self, info: KernelCreateInfo) -> ExecResult<()> {
        let entries = self.kernels.entry(info.def().op_type().to_string()).or_default();
        if let Some(existing) = entries
            .iter()
            .find(|entry| entry.def().conflicts_with(info.def()))
        {
            let (start, end) = existing.def().version_range();
            return Err(ExecError::duplicate_kernel(
                info.def().op_type(),
                format!(
                    "provider {} already covers versions [{start}, {end}] in domain {:?}",
                    existing.def().provider(),
                    existing.def().domain()
                ),
            ));
        }
        debug!(
            op = info.def().op_type(),
            provider = info.def().provider(),
            versions = ?info.def().version_range(),
            "registered kernel"
        );
        entries.push(info);
        Ok(())
    }

    /// Total number of registrations across all operators.
    pub fn registration_count(&self) -> usize {
        self.kernels.values().map(Vec::len).sum()
    }

    /// Finds the unique registration serving `node` on `provider`.
    ///
    /// A candidate must match the node's domain and provider, cover its
    /// opset version, and accept its resolved argument dtypes. Zero
    /// survivors and more than one survivor are distinct load-time errors.
    pub fn resolve(&self, node: &Node, provider: &str) -> ExecResult<&KernelCreateInfo> {
        let entries = match self.kernels.get(node.op_type()) {
            Some(entries) => entries,
            None => {
                warn!(op = node.op_type(), "operator has no registrations");
                return Err(ExecError::missing_kernel(
                    node.op_type(),
                    format!("operator is not registered at all (domain {:?})", node.domain()),
                ));
            }
        };

        let matches: Vec<&KernelCreateInfo> = entries
            .iter()
            .filter(|entry| {
                let def = entry.def();
                def.domain() == node.domain()
                    && def.provider() == provider
                    && def.version_ok(node.since_version())
                    && type_constraints_satisfied(def, node)
            })
            .collect();

        match matches.as_slice() {
            [] => {
                warn!(
                    op = node.op_type(),
                    version = node.since_version(),
                    provider,
                    "no registration matches node"
                );
                Err(ExecError::missing_kernel(
                    node.op_type(),
                    format!(
                        "no registration matches version {} for provider {provider} in domain {:?}",
                        node.since_version(),
                        node.domain()
                    ),
                ))
            }
            [only] => Ok(only),
            several => Err(ExecError::ambiguous_kernel(
                node.op_type(),
                format!(
                    "{} registrations match version {} for provider {provider}",
                    several.len(),
                    node.since_version()
                ),
            )),
        }
    }

    /// Resolves and instantiates in one step.
    pub fn create_kernel(
        &self,
        node: &Arc<Node>,
        provider: &str,
        allocators: &Arc<AllocatorRegistry>,
    ) -> ExecResult<Box<dyn OpKernel>> {
        let entry = self.resolve(node, provider)?;
        entry.create_kernel(Arc::clone(node), Arc::clone(allocators))
    }
}

fn type_constraints_satisfied(def: &KernelDef, node: &Node) -> bool {
    def.type_constraints().iter().all(|constraint| {
        constraint.args.iter().all(|selector| {
            let arg = match selector {
                ArgSelector::Input(i) => node.inputs().get(*i),
                ArgSelector::Output(i) => node.outputs().get(*i),
            };
            match arg {
                // Positions the node does not declare (or omits) leave
                // nothing to check.
                None => true,
                Some(arg) if !arg.exists() => true,
                Some(arg) => arg
                    .dtype()
                    .map_or(true, |dtype| constraint.allowed.contains(&dtype)),
            }
        })
    })
}

/// Registrar invoked while the shared registry is assembled.
pub type KernelRegistrar = fn(&mut KernelRegistry) -> ExecResult<()>;

/// Distributed slice provider crates append their registrars to.
#[linkme::distributed_slice]
pub static KERNEL_REGISTRARS: [KernelRegistrar] = [..];

static SHARED_REGISTRY: OnceLock<KernelRegistry> = OnceLock::new();

/// The process-wide registry, assembled once from every linked registrar.
///
/// Panics if a registrar fails: a malformed static registration is a
/// programming error and must not reach execution.
pub fn shared_registry() -> &'static KernelRegistry {
    SHARED_REGISTRY.get_or_init(|| {
        let mut registry = KernelRegistry::new();
        for registrar in KERNEL_REGISTRARS {
            if let Err(err) = registrar(&mut registry) {
                panic!("kernel registrar failed: {err}");
            }
        }
        info!(
            registrations = registry.registration_count(),
            "kernel registry initialized"
        );
        registry
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::allocator::CPU_PROVIDER;
    use crate::framework::context::OpKernelContext;
    use crate::framework::kernel_def::KernelDefBuilder;
    use crate::tensor::DType;

    struct NoopKernel {
        info: OpKernelInfo,
    }

    impl OpKernel for NoopKernel {
        fn info(&self) -> &OpKernelInfo {
            &self.info
        }

        fn compute(&self, _ctx: &mut OpKernelContext<'_>) -> ExecResult<()> {
            Ok(())
        }
    }

    fn noop_factory() -> KernelCreateFn {
        Box::new(|info| Ok(Box::new(NoopKernel { info }) as Box<dyn OpKernel>))
    }

    fn foo_def(start: i32, end: i32) -> KernelDef {
        KernelDefBuilder::new("Foo")
            .provider(CPU_PROVIDER)
            .version_range(start, end)
            .type_constraint("T", [ArgSelector::Input(0)], [DType::F32])
            .build()
            .unwrap()
    }

    fn foo_node(version: i32, dtype: DType) -> Node {
        Node::builder("Foo")
            .since_version(version)
            .input("x", dtype)
            .output("y", dtype)
            .build()
            .unwrap()
    }

    fn two_range_registry() -> KernelRegistry {
        let mut registry = KernelRegistry::new();
        registry
            .register(KernelCreateInfo::new(foo_def(1, 5), noop_factory()))
            .unwrap();
        registry
            .register(KernelCreateInfo::new(foo_def(6, i32::MAX), noop_factory()))
            .unwrap();
        registry
    }

    #[test]
    fn resolution_picks_the_covering_version_range() {
        let registry = two_range_registry();

        let early = registry.resolve(&foo_node(3, DType::F32), CPU_PROVIDER).unwrap();
        assert_eq!(early.def().version_range(), (1, 5));

        let late = registry.resolve(&foo_node(6, DType::F32), CPU_PROVIDER).unwrap();
        assert_eq!(late.def().version_range(), (6, i32::MAX));

        let later = registry.resolve(&foo_node(40, DType::F32), CPU_PROVIDER).unwrap();
        assert_eq!(later.def().version_range(), (6, i32::MAX));
    }

    #[test]
    fn uncovered_version_is_a_missing_kernel_error() {
        let registry = two_range_registry();
        let err = registry
            .resolve(&foo_node(0, DType::F32), CPU_PROVIDER)
            .unwrap_err();
        assert!(matches!(err, ExecError::MissingKernel { .. }));
        assert!(err.to_string().contains("version 0"));
    }

    #[test]
    fn overlapping_duplicate_registration_is_rejected() {
        let mut registry = two_range_registry();
        let err = registry
            .register(KernelCreateInfo::new(foo_def(5, 8), noop_factory()))
            .unwrap_err();
        assert!(matches!(err, ExecError::DuplicateKernel { .. }));
    }

    #[test]
    fn provider_and_domain_must_match() {
        let registry = two_range_registry();
        assert!(registry.resolve(&foo_node(3, DType::F32), "stream").is_err());

        let custom_domain = Node::builder("Foo")
            .domain("com.example")
            .since_version(3)
            .input("x", DType::F32)
            .output("y", DType::F32)
            .build()
            .unwrap();
        assert!(registry.resolve(&custom_domain, CPU_PROVIDER).is_err());
    }

    #[test]
    fn type_constraints_split_registrations_by_dtype() {
        let mut registry = KernelRegistry::new();
        for dtype in [DType::F32, DType::F64] {
            let def = KernelDefBuilder::new("Foo")
                .provider(CPU_PROVIDER)
                .since_version(1)
                .type_constraint("T", [ArgSelector::Input(0)], [dtype])
                .build()
                .unwrap();
            registry
                .register(KernelCreateInfo::new(def, noop_factory()))
                .unwrap();
        }

        let picked = registry.resolve(&foo_node(2, DType::F64), CPU_PROVIDER).unwrap();
        assert_eq!(picked.def().type_constraints()[0].allowed, vec![DType::F64]);
        assert!(registry.resolve(&foo_node(2, DType::I32), CPU_PROVIDER).is_err());
    }

    #[test]
    fn several_survivors_are_ambiguous() {
        let mut registry = KernelRegistry::new();
        for name in ["T", "U"] {
            let def = KernelDefBuilder::new("Foo")
                .provider(CPU_PROVIDER)
                .since_version(1)
                .type_constraint(name, [ArgSelector::Input(0)], [DType::F32])
                .build()
                .unwrap();
            registry
                .register(KernelCreateInfo::new(def, noop_factory()))
                .unwrap();
        }
        let err = registry
            .resolve(&foo_node(1, DType::F32), CPU_PROVIDER)
            .unwrap_err();
        assert!(matches!(err, ExecError::AmbiguousKernel { .. }));
    }

    #[test]
    fn factory_failures_surface_as_load_errors() {
        let mut registry = KernelRegistry::new();
        let failing: KernelCreateFn = Box::new(|info| {
            Err(ExecError::invalid_argument(
                info.node().op_type(),
                "k must be a positive value",
            ))
        });
        registry
            .register(KernelCreateInfo::new(foo_def(1, i32::MAX), failing))
            .unwrap();

        let node = Arc::new(foo_node(2, DType::F32));
        let allocators = Arc::new(AllocatorRegistry::new());
        let err = registry
            .create_kernel(&node, CPU_PROVIDER, &allocators)
            .unwrap_err();
        assert!(matches!(err, ExecError::InvalidArgument { .. }));
    }
}
