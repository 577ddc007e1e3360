//! Declarative description of one kernel registration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};
use crate::graph::ONNX_DOMAIN;
use crate::tensor::DType;

use super::allocator::MemType;

/// End-version marker for definitions valid from `since_version` onward.
pub const OPEN_END: i32 = i32::MAX;

/// Selects the node argument a type constraint applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgSelector {
    Input(usize),
    Output(usize),
}

/// Restricts the dtypes a group of arguments may resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConstraint {
    pub name: String,
    pub args: Vec<ArgSelector>,
    pub allowed: Vec<DType>,
}

/// Immutable registration record for one kernel implementation.
///
/// Identifies the operator (type + domain), the inclusive opset version
/// range the implementation is valid for, the provider that supplies it, and
/// the dtype constraints resolution checks against a node's resolved
/// argument types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelDef {
    op_type: String,
    domain: String,
    since_version: i32,
    end_version: i32,
    provider: String,
    type_constraints: Vec<TypeConstraint>,
    output_mem_types: BTreeMap<usize, MemType>,
}

impl KernelDef {
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Inclusive version range `[since, end]`.
    pub fn version_range(&self) -> (i32, i32) {
        (self.since_version, self.end_version)
    }

    pub fn since_version(&self) -> i32 {
        self.since_version
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn type_constraints(&self) -> &[TypeConstraint] {
        &self.type_constraints
    }

    /// Whether `version` falls inside the registration's range.
    pub fn version_ok(&self, version: i32) -> bool {
        self.since_version <= version && version <= self.end_version
    }

    /// Memory class the given output should be allocated in.
    pub fn output_mem_type(&self, index: usize) -> MemType {
        self.output_mem_types
            .get(&index)
            .copied()
            .unwrap_or(MemType::Default)
    }

    /// Whether two registrations collide: same operator, domain, provider,
    /// and constraint signature with overlapping version ranges.
    pub fn conflicts_with(&self, other: &KernelDef) -> bool {
        self.op_type == other.op_type
            && self.domain == other.domain
            && self.provider == other.provider
            && self.type_constraints == other.type_constraints
            && self.since_version.max(other.since_version)
                <= self.end_version.min(other.end_version)
    }
}

/// Fluent constructor for [`KernelDef`] values.
#[derive(Debug)]
pub struct KernelDefBuilder {
    op_type: String,
    domain: String,
    since_version: i32,
    end_version: i32,
    provider: Option<String>,
    type_constraints: Vec<TypeConstraint>,
    output_mem_types: BTreeMap<usize, MemType>,
}

impl KernelDefBuilder {
    pub fn new(op_type: impl Into<String>) -> Self {
        KernelDefBuilder {
            op_type: op_type.into(),
            domain: ONNX_DOMAIN.to_string(),
            since_version: 1,
            end_version: OPEN_END,
            provider: None,
            type_constraints: Vec::new(),
            output_mem_types: BTreeMap::new(),
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Valid from `version` onward.
    pub fn since_version(mut self, version: i32) -> Self {
        self.since_version = version;
        self.end_version = OPEN_END;
        self
    }

    /// Valid for the inclusive range `[start, end]`.
    pub fn version_range(mut self, start: i32, end: i32) -> Self {
        self.since_version = start;
        self.end_version = end;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn type_constraint(
        mut self,
        name: impl Into<String>,
        args: impl Into<Vec<ArgSelector>>,
        allowed: impl Into<Vec<DType>>,
    ) -> Self {
        self.type_constraints.push(TypeConstraint {
            name: name.into(),
            args: args.into(),
            allowed: allowed.into(),
        });
        self
    }

    pub fn output_mem_type(mut self, index: usize, mem_type: MemType) -> Self {
        self.output_mem_types.insert(index, mem_type);
        self
    }

    pub fn build(self) -> ExecResult<KernelDef> {
        if self.op_type.is_empty() {
            return Err(ExecError::invalid_argument(
                "kernel definition",
                "operator type must not be empty",
            ));
        }
        let provider = self.provider.ok_or_else(|| {
            ExecError::invalid_argument(&self.op_type, "kernel definition names no provider")
        })?;
        if self.since_version > self.end_version {
            return Err(ExecError::invalid_argument(
                &self.op_type,
                format!(
                    "version range [{}, {}] is empty",
                    self.since_version, self.end_version
                ),
            ));
        }
        for constraint in &self.type_constraints {
            if constraint.allowed.is_empty() {
                return Err(ExecError::invalid_argument(
                    &self.op_type,
                    format!("type constraint {} allows no dtypes", constraint.name),
                ));
            }
        }
        Ok(KernelDef {
            op_type: self.op_type,
            domain: self.domain,
            since_version: self.since_version,
            end_version: self.end_version,
            provider,
            type_constraints: self.type_constraints,
            output_mem_types: self.output_mem_types,
        })
    }
}
