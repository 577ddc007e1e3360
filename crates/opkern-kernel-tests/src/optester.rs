//! Single-node kernel test driver.
//!
//! An [`OpTester`] describes one node, its input data, and the expected
//! outputs, then runs the whole pipeline: node construction, frame setup,
//! registry resolution, kernel construction, compute, finalize, and output
//! comparison.

use std::sync::Arc;

use opkern::error::ExecResult;
use opkern::framework::allocator::AllocatorRegistry;
use opkern::framework::registry::shared_registry;
use opkern::framework::{ExecutionFrame, OpKernelContext, QueueId, Value};
use opkern::graph::{AttrValue, Node};
use opkern::tensor::{DType, Tensor, TensorElement, TensorShape};
use opkern_provider_cpu::{cpu_allocator_registry, CPU_PROVIDER};

/// Absolute tolerance for float output comparison.
pub const ATOL: f32 = 1e-5;

enum InputSpec {
    Present { name: String, tensor: Tensor },
    Absent,
}

enum Expected {
    F32 {
        name: String,
        shape: TensorShape,
        data: Vec<f32>,
    },
    I64 {
        name: String,
        shape: TensorShape,
        data: Vec<i64>,
    },
}

/// Declarative single-node test: describe the node, feed inputs, state the
/// expected outputs, run.
pub struct OpTester {
    op_type: String,
    domain: Option<String>,
    since_version: i32,
    provider: String,
    attrs: Vec<(String, AttrValue)>,
    inputs: Vec<InputSpec>,
    input_arg_count: Option<Vec<usize>>,
    outputs: Vec<(String, DType)>,
    expected: Vec<Expected>,
}

impl OpTester {
    pub fn new(op_type: impl Into<String>, since_version: i32) -> Self {
        OpTester {
            op_type: op_type.into(),
            domain: None,
            since_version,
            provider: CPU_PROVIDER.to_string(),
            attrs: Vec::new(),
            inputs: Vec::new(),
            input_arg_count: None,
            outputs: Vec::new(),
            expected: Vec::new(),
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Resolve against this provider instead of the CPU one.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Feeds a tensor input with the given shape and data.
    pub fn input<T: TensorElement>(
        mut self,
        name: impl Into<String>,
        shape: impl Into<TensorShape>,
        data: Vec<T>,
    ) -> Self {
        let name = name.into();
        let tensor = Tensor::from_vec(shape, data)
            .unwrap_or_else(|err| panic!("bad input {name}: {err}"));
        self.inputs.push(InputSpec::Present { name, tensor });
        self
    }

    /// Declares an optional input the node omits.
    pub fn absent_input(mut self) -> Self {
        self.inputs.push(InputSpec::Absent);
        self
    }

    /// Overrides the per-argument run lengths, for variadic operators.
    pub fn input_arg_count(mut self, counts: Vec<usize>) -> Self {
        self.input_arg_count = Some(counts);
        self
    }

    /// Expects a float tensor output with the given shape and data.
    pub fn expect_f32(
        mut self,
        name: impl Into<String>,
        shape: impl Into<TensorShape>,
        data: Vec<f32>,
    ) -> Self {
        let name = name.into();
        self.outputs.push((name.clone(), DType::F32));
        self.expected.push(Expected::F32 {
            name,
            shape: shape.into(),
            data,
        });
        self
    }

    /// Expects an integer tensor output with the given shape and data.
    pub fn expect_i64(
        mut self,
        name: impl Into<String>,
        shape: impl Into<TensorShape>,
        data: Vec<i64>,
    ) -> Self {
        let name = name.into();
        self.outputs.push((name.clone(), DType::I64));
        self.expected.push(Expected::I64 {
            name,
            shape: shape.into(),
            data,
        });
        self
    }

    /// Runs the node and panics on any failure or output mismatch.
    pub fn run(self) {
        let op = self.op_type.clone();
        let frame = match self.execute() {
            Ok(frame) => frame,
            Err(err) => panic!("{op} failed: {err}"),
        };
        frame.check();
    }

    /// Runs the node and asserts the pipeline fails with a message
    /// mentioning `needle`. Factory and compute errors both qualify.
    pub fn run_expect_error(self, needle: &str) {
        let op = self.op_type.clone();
        match self.execute() {
            Ok(_) => panic!("{op} unexpectedly succeeded"),
            Err(err) => {
                let message = err.to_string();
                assert!(
                    message.contains(needle),
                    "{op} failed with {message:?}, which does not mention {needle:?}"
                );
            }
        }
    }

    fn execute(self) -> ExecResult<FinishedRun> {
        let mut builder = Node::builder(&self.op_type)
            .name(format!("{}_test", self.op_type))
            .since_version(self.since_version);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        for (name, value) in &self.attrs {
            builder = builder.attr(name.clone(), value.clone());
        }
        for spec in &self.inputs {
            builder = match spec {
                InputSpec::Present { name, tensor } => {
                    builder.input(name.clone(), tensor.dtype())
                }
                InputSpec::Absent => builder.absent_input(),
            };
        }
        for (name, dtype) in &self.outputs {
            builder = builder.output(name.clone(), *dtype);
        }
        if let Some(counts) = self.input_arg_count.clone() {
            builder = builder.input_arg_count(counts);
        }
        let node = Arc::new(builder.build()?);

        let allocators = Arc::new(cpu_allocator_registry()?);
        let frame = ExecutionFrame::new([node.as_ref()], Arc::clone(&allocators));
        for spec in self.inputs {
            if let InputSpec::Present { name, tensor } = spec {
                frame.feed(&name, Value::new(tensor))?;
            }
        }

        let kernel = shared_registry().create_kernel(&node, &self.provider, &allocators)?;
        let queue = QueueId::new(CPU_PROVIDER, 0);
        let mut ctx = OpKernelContext::new(&frame, kernel.info(), queue)?;
        kernel.compute(&mut ctx)?;
        ctx.finalize()?;

        Ok(FinishedRun {
            frame,
            expected: self.expected,
        })
    }
}

struct FinishedRun {
    frame: ExecutionFrame,
    expected: Vec<Expected>,
}

impl FinishedRun {
    fn check(self) {
        for expected in &self.expected {
            match expected {
                Expected::F32 { name, shape, data } => {
                    let tensor = self.fetch(name);
                    assert_eq!(tensor.shape(), shape, "output {name} shape");
                    let actual = tensor.data::<f32>();
                    assert_eq!(actual.len(), data.len(), "output {name} length");
                    for (i, (got, want)) in actual.iter().zip(data).enumerate() {
                        assert!(
                            (got - want).abs() <= ATOL,
                            "output {name}[{i}]: got {got}, want {want}"
                        );
                    }
                }
                Expected::I64 { name, shape, data } => {
                    let tensor = self.fetch(name);
                    assert_eq!(tensor.shape(), shape, "output {name} shape");
                    assert_eq!(tensor.data::<i64>(), data.as_slice(), "output {name}");
                }
            }
        }
    }

    fn fetch(&self, name: &str) -> Tensor {
        let value = self
            .frame
            .fetch(name)
            .unwrap_or_else(|err| panic!("output {name}: {err}"));
        value.get::<Tensor>().clone()
    }
}
