//! Minimal graph-node description consumed by the kernel framework.
//!
//! The framework does not build or validate graphs. An outer planner hands
//! it nodes whose operator identity, opset version, and argument dtypes are
//! already resolved; this module defines that hand-off surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};
use crate::tensor::DType;

/// Domain tag of the default operator set.
pub const ONNX_DOMAIN: &str = "";

/// Attribute payload attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f32),
    Floats(Vec<f32>),
    Str(String),
    Strs(Vec<String>),
}

impl AttrValue {
    /// Kind label used in attribute error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Ints(_) => "ints",
            AttrValue::Float(_) => "float",
            AttrValue::Floats(_) => "floats",
            AttrValue::Str(_) => "string",
            AttrValue::Strs(_) => "strings",
        }
    }
}

macro_rules! impl_attr_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AttrValue {
                fn from(value: $ty) -> Self {
                    AttrValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_attr_from! {
    i64 => Int,
    Vec<i64> => Ints,
    f32 => Float,
    Vec<f32> => Floats,
    String => Str,
    &str => Str,
    Vec<String> => Strs,
}

/// Scalar or vector types extractable from an [`AttrValue`].
pub trait AttrAccess: Sized {
    /// Kind label expected by this extraction, for error messages.
    const KIND: &'static str;

    fn from_attr(attr: &AttrValue) -> Option<Self>;
}

impl AttrAccess for i64 {
    const KIND: &'static str = "int";

    fn from_attr(attr: &AttrValue) -> Option<Self> {
        match attr {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttrAccess for f32 {
    const KIND: &'static str = "float";

    fn from_attr(attr: &AttrValue) -> Option<Self> {
        match attr {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttrAccess for String {
    const KIND: &'static str = "string";

    fn from_attr(attr: &AttrValue) -> Option<Self> {
        match attr {
            AttrValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl AttrAccess for Vec<i64> {
    const KIND: &'static str = "ints";

    fn from_attr(attr: &AttrValue) -> Option<Self> {
        match attr {
            AttrValue::Ints(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl AttrAccess for Vec<f32> {
    const KIND: &'static str = "floats";

    fn from_attr(attr: &AttrValue) -> Option<Self> {
        match attr {
            AttrValue::Floats(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl AttrAccess for Vec<String> {
    const KIND: &'static str = "strings";

    fn from_attr(attr: &AttrValue) -> Option<Self> {
        match attr {
            AttrValue::Strs(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// One positional input or output of a node.
///
/// An argument with an empty name marks an omitted optional slot; positions
/// after it keep their indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeArg {
    name: String,
    dtype: Option<DType>,
}

impl NodeArg {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        NodeArg {
            name: name.into(),
            dtype: Some(dtype),
        }
    }

    /// An omitted optional argument.
    pub fn absent() -> Self {
        NodeArg {
            name: String::new(),
            dtype: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved element dtype, when the argument carries a tensor.
    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    /// Whether the argument is actually present on the node.
    pub fn exists(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Graph node as handed to the framework by an outer planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    name: String,
    op_type: String,
    domain: String,
    since_version: i32,
    inputs: Vec<NodeArg>,
    outputs: Vec<NodeArg>,
    input_arg_count: Vec<usize>,
    attributes: BTreeMap<String, AttrValue>,
}

impl Node {
    pub fn builder(op_type: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(op_type)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Opset version the node was authored against.
    pub fn since_version(&self) -> i32 {
        self.since_version
    }

    pub fn inputs(&self) -> &[NodeArg] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[NodeArg] {
        &self.outputs
    }

    /// Flat-input run lengths per declared argument position.
    ///
    /// Entries sum to `inputs().len()`; a count above one marks a variadic
    /// argument.
    pub fn input_arg_count(&self) -> &[usize] {
        &self.input_arg_count
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn attr_raw(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

/// Fluent constructor for [`Node`] values.
#[derive(Debug, Default)]
pub struct NodeBuilder {
    name: Option<String>,
    op_type: String,
    domain: String,
    since_version: i32,
    inputs: Vec<NodeArg>,
    outputs: Vec<NodeArg>,
    input_arg_count: Option<Vec<usize>>,
    attributes: BTreeMap<String, AttrValue>,
}

impl NodeBuilder {
    pub fn new(op_type: impl Into<String>) -> Self {
        NodeBuilder {
            op_type: op_type.into(),
            domain: ONNX_DOMAIN.to_string(),
            since_version: 1,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn since_version(mut self, version: i32) -> Self {
        self.since_version = version;
        self
    }

    pub fn input(mut self, name: impl Into<String>, dtype: DType) -> Self {
        self.inputs.push(NodeArg::new(name, dtype));
        self
    }

    /// Declares an optional input the node omits.
    pub fn absent_input(mut self) -> Self {
        self.inputs.push(NodeArg::absent());
        self
    }

    pub fn output(mut self, name: impl Into<String>, dtype: DType) -> Self {
        self.outputs.push(NodeArg::new(name, dtype));
        self
    }

    /// Declares an optional output the node omits.
    pub fn absent_output(mut self) -> Self {
        self.outputs.push(NodeArg::absent());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Overrides the per-argument run lengths; defaults to one per input.
    pub fn input_arg_count(mut self, counts: Vec<usize>) -> Self {
        self.input_arg_count = Some(counts);
        self
    }

    pub fn build(self) -> ExecResult<Node> {
        let input_arg_count = self
            .input_arg_count
            .unwrap_or_else(|| vec![1; self.inputs.len()]);
        let total: usize = input_arg_count.iter().sum();
        if total != self.inputs.len() {
            return Err(ExecError::invalid_argument(
                &self.op_type,
                format!(
                    "input argument counts sum to {} but the node has {} inputs",
                    total,
                    self.inputs.len()
                ),
            ));
        }
        let name = self.name.unwrap_or_else(|| self.op_type.clone());
        Ok(Node {
            name,
            op_type: self.op_type,
            domain: self.domain,
            since_version: self.since_version,
            inputs: self.inputs,
            outputs: self.outputs,
            input_arg_count,
            attributes: self.attributes,
        })
    }
}
