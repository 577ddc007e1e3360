//! Elementwise clamping, in both of its opset guises.
//!
//! Opset 6 carries the bounds as `min`/`max` attributes; opset 11 moved them
//! to optional scalar tensor inputs. Both registrations live side by side
//! and resolution picks one from the node's opset version.

use opkern::error::{ExecError, ExecResult};
use opkern::framework::kernel_def::{ArgSelector, KernelDefBuilder};
use opkern::framework::registry::KernelCreateInfo;
use opkern::framework::{OpKernel, OpKernelContext, OpKernelInfo};
use opkern::tensor::{DType, Tensor};

use crate::CPU_PROVIDER;

/// Registration for `Clip` opset versions 6 through 10.
pub fn create_info_v6() -> ExecResult<KernelCreateInfo> {
    let def = KernelDefBuilder::new("Clip")
        .provider(CPU_PROVIDER)
        .version_range(6, 10)
        .type_constraint(
            "T",
            [ArgSelector::Input(0), ArgSelector::Output(0)],
            [DType::F32],
        )
        .build()?;
    Ok(KernelCreateInfo::new(
        def,
        Box::new(|info| {
            let kernel: Box<dyn OpKernel> = Box::new(Clip6::new(info)?);
            Ok(kernel)
        }),
    ))
}

/// Registration for `Clip` opset version 11 onward.
pub fn create_info_v11() -> ExecResult<KernelCreateInfo> {
    let def = KernelDefBuilder::new("Clip")
        .provider(CPU_PROVIDER)
        .since_version(11)
        .type_constraint(
            "T",
            [
                ArgSelector::Input(0),
                ArgSelector::Input(1),
                ArgSelector::Input(2),
                ArgSelector::Output(0),
            ],
            [DType::F32],
        )
        .build()?;
    Ok(KernelCreateInfo::new(
        def,
        Box::new(|info| {
            let kernel: Box<dyn OpKernel> = Box::new(Clip11::new(info));
            Ok(kernel)
        }),
    ))
}

/// `Clip` with attribute-carried bounds, defaulting to the full `f32` range.
pub struct Clip6 {
    info: OpKernelInfo,
    min: f32,
    max: f32,
}

impl Clip6 {
    pub fn new(info: OpKernelInfo) -> ExecResult<Self> {
        let min = info.attr_or("min", f32::MIN)?;
        let max = info.attr_or("max", f32::MAX)?;
        Ok(Clip6 { info, min, max })
    }
}

impl OpKernel for Clip6 {
    fn info(&self) -> &OpKernelInfo {
        &self.info
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> ExecResult<()> {
        let x_value = ctx
            .input_value(0)
            .ok_or_else(|| ExecError::invalid_argument("Clip", "input X is required"))?;
        let x = x_value.get::<Tensor>();
        let clipped: Vec<f32> = x
            .data::<f32>()
            .iter()
            .map(|v| v.max(self.min).min(self.max))
            .collect();

        let shape = x.shape().clone();
        let out = ctx
            .output_tensor(0, &shape)?
            .ok_or_else(|| ExecError::invalid_argument("Clip", "output Y is required"))?;
        out.data_mut::<f32>().copy_from_slice(&clipped);
        Ok(())
    }
}

/// `Clip` with bounds supplied as optional scalar tensor inputs.
pub struct Clip11 {
    info: OpKernelInfo,
}

impl Clip11 {
    pub fn new(info: OpKernelInfo) -> Self {
        Clip11 { info }
    }
}

impl OpKernel for Clip11 {
    fn info(&self) -> &OpKernelInfo {
        &self.info
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> ExecResult<()> {
        let min = scalar_bound(ctx, 1, "min")?;
        let max = scalar_bound(ctx, 2, "max")?;
        let x_value = ctx
            .input_value(0)
            .ok_or_else(|| ExecError::invalid_argument("Clip", "input X is required"))?;
        let x = x_value.get::<Tensor>();
        let clipped: Vec<f32> = x
            .data::<f32>()
            .iter()
            .map(|v| {
                let mut v = *v;
                if let Some(min) = min {
                    v = v.max(min);
                }
                if let Some(max) = max {
                    v = v.min(max);
                }
                v
            })
            .collect();

        let shape = x.shape().clone();
        let out = ctx
            .output_tensor(0, &shape)?
            .ok_or_else(|| ExecError::invalid_argument("Clip", "output Y is required"))?;
        out.data_mut::<f32>().copy_from_slice(&clipped);
        Ok(())
    }
}

/// Reads the optional scalar bound at `index`; `Ok(None)` when the node
/// omits it or stops its input list short of it.
fn scalar_bound(ctx: &OpKernelContext<'_>, index: usize, name: &str) -> ExecResult<Option<f32>> {
    if index >= ctx.input_count() {
        return Ok(None);
    }
    let Some(tensor) = ctx.input::<Tensor>(index) else {
        return Ok(None);
    };
    if !tensor.shape().is_scalar() {
        return Err(ExecError::invalid_argument(
            "Clip",
            format!("{name} input must be a scalar tensor, got shape {}", tensor.shape()),
        ));
    }
    Ok(Some(tensor.data::<f32>()[0]))
}
