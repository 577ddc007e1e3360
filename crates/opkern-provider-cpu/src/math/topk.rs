//! Largest-k selection along one axis.

use std::cmp::Ordering;

use opkern::error::{ExecError, ExecResult};
use opkern::framework::kernel_def::{ArgSelector, KernelDefBuilder};
use opkern::framework::registry::KernelCreateInfo;
use opkern::framework::{OpKernel, OpKernelContext, OpKernelInfo};
use opkern::tensor::{DType, Tensor, TensorShape};

use crate::CPU_PROVIDER;

/// Registration for `TopK` on the CPU provider.
pub fn create_info() -> ExecResult<KernelCreateInfo> {
    let def = KernelDefBuilder::new("TopK")
        .provider(CPU_PROVIDER)
        .since_version(1)
        .type_constraint(
            "T",
            [ArgSelector::Input(0), ArgSelector::Output(0)],
            [DType::F32],
        )
        .type_constraint("I", [ArgSelector::Output(1)], [DType::I64])
        .build()?;
    Ok(KernelCreateInfo::new(
        def,
        Box::new(|info| {
            let kernel: Box<dyn OpKernel> = Box::new(TopK::new(info)?);
            Ok(kernel)
        }),
    ))
}

/// Selects the `k` largest entries along `axis`, emitting values and their
/// source indices in descending value order; ties keep the lower index
/// first.
#[derive(Debug)]
pub struct TopK {
    info: OpKernelInfo,
    k: i64,
    axis: i64,
}

impl TopK {
    pub fn new(info: OpKernelInfo) -> ExecResult<Self> {
        let k = info.attr::<i64>("k")?;
        if k <= 0 {
            return Err(ExecError::invalid_argument(
                info.node().op_type(),
                "k must be a positive value",
            ));
        }
        let axis = info.attr_or("axis", -1)?;
        Ok(TopK { info, k, axis })
    }
}

impl OpKernel for TopK {
    fn info(&self) -> &OpKernelInfo {
        &self.info
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> ExecResult<()> {
        let x_value = ctx
            .input_value(0)
            .ok_or_else(|| ExecError::invalid_argument("TopK", "input X is required"))?;
        let x = x_value.get::<Tensor>();
        let shape = x.shape();
        let rank = shape.num_dimensions() as i64;
        if rank == 0 {
            return Err(ExecError::invalid_argument(
                "TopK",
                "input must have at least one dimension",
            ));
        }
        let axis = if self.axis < 0 { self.axis + rank } else { self.axis };
        if axis < 0 || axis >= rank {
            return Err(ExecError::invalid_argument(
                "TopK",
                format!("axis {} out of range for rank {rank}", self.axis),
            ));
        }
        let axis = axis as usize;
        let dim = shape[axis];
        if self.k > dim {
            return Err(ExecError::invalid_argument(
                "TopK",
                format!("k {} exceeds dimension {dim} along axis {axis}", self.k),
            ));
        }

        let mut out_dims = shape.dims().to_vec();
        out_dims[axis] = self.k;
        let out_shape = TensorShape::new(out_dims);

        let k = self.k as usize;
        let dim = dim as usize;
        let outer = shape.size_to_dimension(axis) as usize;
        let inner = shape.size_from_dimension(axis + 1) as usize;
        let data = x.data::<f32>();

        let mut top_values = vec![0f32; outer * k * inner];
        let mut top_indices = vec![0i64; outer * k * inner];
        let mut pairs: Vec<(usize, f32)> = Vec::with_capacity(dim);
        for o in 0..outer {
            for i in 0..inner {
                pairs.clear();
                pairs.extend((0..dim).map(|j| (j, data[(o * dim + j) * inner + i])));
                pairs.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
                    Some(ord) => ord.then(a.0.cmp(&b.0)),
                    None => Ordering::Equal,
                });
                for (r, (j, v)) in pairs.iter().take(k).enumerate() {
                    let dst = (o * k + r) * inner + i;
                    top_values[dst] = *v;
                    top_indices[dst] = *j as i64;
                }
            }
        }

        let values = ctx
            .output_tensor(0, &out_shape)?
            .ok_or_else(|| ExecError::invalid_argument("TopK", "output Values is required"))?;
        values.data_mut::<f32>().copy_from_slice(&top_values);

        let indices = ctx
            .output_tensor(1, &out_shape)?
            .ok_or_else(|| ExecError::invalid_argument("TopK", "output Indices is required"))?;
        indices.data_mut::<i64>().copy_from_slice(&top_indices);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkern::framework::allocator::AllocatorRegistry;
    use opkern::graph::Node;
    use std::sync::Arc;

    fn build_kernel(attrs: &[(&str, i64)]) -> ExecResult<TopK> {
        let mut builder = Node::builder("TopK")
            .input("x", DType::F32)
            .output("values", DType::F32)
            .output("indices", DType::I64);
        for (name, value) in attrs {
            builder = builder.attr(*name, *value);
        }
        let node = builder.build().unwrap();
        let def = KernelDefBuilder::new("TopK")
            .provider(CPU_PROVIDER)
            .build()
            .unwrap();
        TopK::new(OpKernelInfo::new(
            Arc::new(node),
            Arc::new(def),
            Arc::new(AllocatorRegistry::new()),
        ))
    }

    #[test]
    fn construction_requires_a_positive_k() {
        let err = build_kernel(&[("k", 0)]).unwrap_err();
        assert!(err.to_string().contains("k must be a positive value"));

        let err = build_kernel(&[("k", -2)]).unwrap_err();
        assert!(err.to_string().contains("k must be a positive value"));

        let err = build_kernel(&[]).unwrap_err();
        assert!(err.to_string().contains("missing required attribute k"));
    }

    #[test]
    fn axis_defaults_to_the_last_dimension() {
        let kernel = build_kernel(&[("k", 2)]).unwrap();
        assert_eq!(kernel.axis, -1);
        let kernel = build_kernel(&[("k", 2), ("axis", 0)]).unwrap();
        assert_eq!(kernel.axis, 0);
    }
}
