//! Per-channel affine rescaling of NCHW image batches.

use opkern::error::{ExecError, ExecResult};
use opkern::framework::kernel_def::{ArgSelector, KernelDefBuilder};
use opkern::framework::registry::KernelCreateInfo;
use opkern::framework::{OpKernel, OpKernelContext, OpKernelInfo};
use opkern::tensor::{DType, Tensor};

use crate::CPU_PROVIDER;

/// Registration for `ImageScaler` on the CPU provider.
pub fn create_info() -> ExecResult<KernelCreateInfo> {
    let def = KernelDefBuilder::new("ImageScaler")
        .provider(CPU_PROVIDER)
        .since_version(1)
        .type_constraint(
            "T",
            [ArgSelector::Input(0), ArgSelector::Output(0)],
            [DType::F32],
        )
        .build()?;
    Ok(KernelCreateInfo::new(
        def,
        Box::new(|info| {
            let kernel: Box<dyn OpKernel> = Box::new(ImageScaler::new(info)?);
            Ok(kernel)
        }),
    ))
}

/// Computes `y = x * scale + bias[c]` over `[N, C, H, W]` input, one bias
/// entry per channel.
#[derive(Debug)]
pub struct ImageScaler {
    info: OpKernelInfo,
    scale: f32,
    bias: Vec<f32>,
}

impl ImageScaler {
    pub fn new(info: OpKernelInfo) -> ExecResult<Self> {
        let scale = info.attr_or("scale", 1.0f32)?;
        let bias = info.attr::<Vec<f32>>("bias")?;
        Ok(ImageScaler { info, scale, bias })
    }
}

impl OpKernel for ImageScaler {
    fn info(&self) -> &OpKernelInfo {
        &self.info
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> ExecResult<()> {
        let x_value = ctx
            .input_value(0)
            .ok_or_else(|| ExecError::invalid_argument("ImageScaler", "input X is required"))?;
        let x = x_value.get::<Tensor>();
        let shape = x.shape().clone();
        if shape.num_dimensions() != 4 {
            return Err(ExecError::invalid_argument(
                "ImageScaler",
                format!("input must have shape [N,C,H,W], got {shape}"),
            ));
        }
        let channels = shape[1] as usize;
        if self.bias.len() != channels {
            return Err(ExecError::invalid_argument(
                "ImageScaler",
                format!(
                    "bias has {} entries but the input has {channels} channels",
                    self.bias.len()
                ),
            ));
        }

        let channel_size = shape.size_from_dimension(2) as usize;
        let data = x.data::<f32>();
        let mut scaled = Vec::with_capacity(data.len());
        for (chunk_index, chunk) in data.chunks_exact(channel_size).enumerate() {
            let bias = self.bias[chunk_index % channels];
            scaled.extend(chunk.iter().map(|v| v * self.scale + bias));
        }

        let out = ctx
            .output_tensor(0, &shape)?
            .ok_or_else(|| ExecError::invalid_argument("ImageScaler", "output Y is required"))?;
        out.data_mut::<f32>().copy_from_slice(&scaled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkern::framework::allocator::AllocatorRegistry;
    use opkern::graph::Node;
    use std::sync::Arc;

    fn build_kernel(bias: Option<Vec<f32>>, scale: Option<f32>) -> ExecResult<ImageScaler> {
        let mut builder = Node::builder("ImageScaler")
            .input("x", DType::F32)
            .output("y", DType::F32);
        if let Some(bias) = bias {
            builder = builder.attr("bias", bias);
        }
        if let Some(scale) = scale {
            builder = builder.attr("scale", scale);
        }
        let node = builder.build().unwrap();
        let def = KernelDefBuilder::new("ImageScaler")
            .provider(CPU_PROVIDER)
            .build()
            .unwrap();
        ImageScaler::new(OpKernelInfo::new(
            Arc::new(node),
            Arc::new(def),
            Arc::new(AllocatorRegistry::new()),
        ))
    }

    #[test]
    fn bias_is_required_at_construction() {
        let err = build_kernel(None, None).unwrap_err();
        assert!(err.to_string().contains("missing required attribute bias"));
    }

    #[test]
    fn scale_defaults_to_identity() {
        let kernel = build_kernel(Some(vec![0.0, 0.0]), None).unwrap();
        assert_eq!(kernel.scale, 1.0);
        let kernel = build_kernel(Some(vec![0.0]), Some(2.5)).unwrap();
        assert_eq!(kernel.scale, 2.5);
    }
}
