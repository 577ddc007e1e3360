//! Elementwise sum over a variadic input list.

use opkern::error::{ExecError, ExecResult};
use opkern::framework::kernel_def::{ArgSelector, KernelDefBuilder};
use opkern::framework::registry::KernelCreateInfo;
use opkern::framework::{OpKernel, OpKernelContext, OpKernelInfo, Value};
use opkern::tensor::{DType, Tensor};

use crate::CPU_PROVIDER;

/// Registration for `Sum` on the CPU provider.
pub fn create_info() -> ExecResult<KernelCreateInfo> {
    let def = KernelDefBuilder::new("Sum")
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
            let kernel: Box<dyn OpKernel> = Box::new(Sum::new(info));
            Ok(kernel)
        }),
    ))
}

/// Adds all inputs elementwise. Every input must share one shape; this
/// implementation does not broadcast.
pub struct Sum {
    info: OpKernelInfo,
}

impl Sum {
    pub fn new(info: OpKernelInfo) -> Self {
        Sum { info }
    }
}

impl OpKernel for Sum {
    fn info(&self) -> &OpKernelInfo {
        &self.info
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> ExecResult<()> {
        let count = ctx.num_variadic_inputs(0);
        if count == 0 {
            return Err(ExecError::invalid_argument(
                "Sum",
                "at least one input is required",
            ));
        }
        let values: Vec<Value> = (0..count)
            .map(|index| {
                ctx.input_value(index).ok_or_else(|| {
                    ExecError::invalid_argument("Sum", format!("input {index} is omitted"))
                })
            })
            .collect::<ExecResult<_>>()?;

        let first = values[0].get::<Tensor>();
        let shape = first.shape().clone();
        let mut acc = first.data::<f32>().to_vec();
        for value in &values[1..] {
            let tensor = value.get::<Tensor>();
            if tensor.shape() != &shape {
                return Err(ExecError::invalid_argument(
                    "Sum",
                    format!(
                        "input shapes differ: {} vs {}",
                        shape,
                        tensor.shape()
                    ),
                ));
            }
            for (dst, src) in acc.iter_mut().zip(tensor.data::<f32>()) {
                *dst += *src;
            }
        }

        let out = ctx
            .output_tensor(0, &shape)?
            .ok_or_else(|| ExecError::invalid_argument("Sum", "output Sum is required"))?;
        out.data_mut::<f32>().copy_from_slice(&acc);
        Ok(())
    }
}
