//! GPU-accelerated kernels using WGPU.
//!
//! This module mirrors the CPU kernels with WGSL compute shaders:
//!
//! - `gemm`: row-major matrix multiply with optional transposes and element offsets
//! - `im2col` / `col2im`: patch unrolling; `col2im` gathers per output pixel, so no
//!   two invocations write the same element
//! - `add_bias` / `grad_bias`: per-channel broadcast and reduction
//! - `activation` / `activation_backward`: element-wise activations
//!
//! The device, queue and every pipeline are created once, lazily, inside
//! `GPU_CONTEXT`. When no adapter or device can be obtained the context is
//! absent, a warning is logged, and [`context`] returns `None` so dispatch falls
//! back to the CPU.
//!
//! Each call uploads its inputs, records all passes into one command encoder,
//! submits once and blocks until the results are read back.

use bytemuck::{Pod, Zeroable};
use std::sync::mpsc;
use wgpu::util::DeviceExt;

mod activation;
pub use self::activation::{activation_backward, activation_forward};

mod deconv;
pub use self::deconv::{deconv_backward, deconv_forward};

const GEMM: &str = include_str!("shaders/gemm.wgsl");
const IM2COL: &str = include_str!("shaders/im2col.wgsl");
const COL2IM: &str = include_str!("shaders/col2im.wgsl");
const ADD_BIAS: &str = include_str!("shaders/add_bias.wgsl");
const GRAD_BIAS: &str = include_str!("shaders/grad_bias.wgsl");
const ACTIVATION: &str = include_str!("shaders/activation.wgsl");
const ACTIVATION_BACKWARD: &str = include_str!("shaders/activation_backward.wgsl");

/// Threads per workgroup of the 1-D kernels.
const WORKGROUP_1D: u32 = 256;
/// Tile edge of the GEMM kernel.
const GEMM_TILE: u32 = 16;
/// Per-dimension dispatch limit guaranteed by `wgpu::Limits::default()`.
const MAX_GROUPS_PER_DIM: u32 = 65_535;

/// Basic wrapper for common GPU errors.
#[derive(Debug)]
pub enum GpuError {
    /// An error in requesting the adapter.
    Adapter(wgpu::RequestAdapterError),
    /// An error in requesting the GPU (device).
    Device(wgpu::RequestDeviceError),
    /// Waiting on the device failed.
    Poll(wgpu::PollError),
    /// Mapping a readback buffer failed.
    Map(wgpu::BufferAsyncError),
}

impl core::fmt::Display for GpuError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Adapter(e) => write!(f, "Adapter error: {e}"),
            Self::Device(e) => write!(f, "Device error: {e}"),
            Self::Poll(e) => write!(f, "Poll error: {e}"),
            Self::Map(e) => write!(f, "Buffer map error: {e}"),
        }
    }
}

/// A type of error closely related to the GPU.
#[derive(Debug)]
pub struct GpuFailure {
    /// The optional type of failure that occurred.
    pub kind: Option<GpuError>,
}

impl From<GpuError> for GpuFailure {
    fn from(kind: GpuError) -> Self {
        Self { kind: Some(kind) }
    }
}

impl From<wgpu::PollError> for GpuFailure {
    fn from(e: wgpu::PollError) -> Self {
        GpuError::Poll(e).into()
    }
}

impl From<wgpu::BufferAsyncError> for GpuFailure {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        GpuError::Map(e).into()
    }
}

impl core::fmt::Display for GpuFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if let Some(kind) = &self.kind {
            write!(f, "GPU failure: {kind}")
        } else {
            write!(f, "Unknown GPU failure")
        }
    }
}

impl core::error::Error for GpuFailure {}

/// Uniform block of `gemm.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub(crate) struct GemmParams {
    pub m: u32,
    pub n: u32,
    pub k: u32,
    pub lda: u32,
    pub ldb: u32,
    pub ldc: u32,
    pub trans_a: u32,
    pub trans_b: u32,
    pub a_off: u32,
    pub b_off: u32,
    pub c_off: u32,
    pub alpha: f32,
    pub beta: f32,
    pub reserved: [u32; 3],
}

/// Uniform block of `im2col.wgsl` and `col2im.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub(crate) struct ColParams {
    pub channels: u32,
    pub height: u32,
    pub width: u32,
    pub size: u32,
    pub stride: u32,
    pub pad: u32,
    pub height_col: u32,
    pub width_col: u32,
    pub im_off: u32,
    pub col_off: u32,
    pub total: u32,
    pub reserved: u32,
}

/// Uniform block of the bias kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub(crate) struct BiasParams {
    pub channels: u32,
    pub spatial: u32,
    pub total: u32,
    pub reserved: u32,
}

/// Uniform block of the activation kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub(crate) struct ActParams {
    pub kind: u32,
    pub total: u32,
    pub reserved: [u32; 2],
}

struct Pipelines {
    gemm: wgpu::ComputePipeline,
    im2col: wgpu::ComputePipeline,
    col2im: wgpu::ComputePipeline,
    add_bias: wgpu::ComputePipeline,
    grad_bias: wgpu::ComputePipeline,
    activation: wgpu::ComputePipeline,
    activation_backward: wgpu::ComputePipeline,
}

impl Pipelines {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            gemm: compute_pipeline(device, "gemm", GEMM),
            im2col: compute_pipeline(device, "im2col", IM2COL),
            col2im: compute_pipeline(device, "col2im", COL2IM),
            add_bias: compute_pipeline(device, "add_bias", ADD_BIAS),
            grad_bias: compute_pipeline(device, "grad_bias", GRAD_BIAS),
            activation: compute_pipeline(device, "activation", ACTIVATION),
            activation_backward: compute_pipeline(
                device,
                "activation_backward",
                ACTIVATION_BACKWARD,
            ),
        }
    }
}

/// Holds the WGPU device, queue and the compiled pipelines.
///
/// Initialized once globally and reused for all operations via `lazy_static`.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// A queue for information related to the device.
    pub queue: wgpu::Queue,
    pipelines: Pipelines,
}

impl GpuContext {
    /// Selects the default adapter, creates a device and queue, and compiles
    /// every kernel.
    ///
    /// # Errors
    ///
    /// `GpuError` if adapter or device acquisition fails.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(GpuError::Adapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("deconvnet"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        let pipelines = Pipelines::new(&device);
        Ok(Self {
            device,
            queue,
            pipelines,
        })
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Copies `data` into a new storage buffer.
    fn upload(&self, label: &str, data: &[f32]) -> wgpu::Buffer {
        if data.is_empty() {
            return self.scratch(label, 1);
        }
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// A zero-initialized storage buffer of `len` floats.
    fn scratch(&self, label: &str, len: usize) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: byte_len(len.max(1)),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Records one compute pass. Binding 0 is the uniform `params`, the
    /// storage `buffers` follow from binding 1 in order.
    fn dispatch<P: Pod>(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        label: &str,
        params: &P,
        buffers: &[&wgpu::Buffer],
        groups: (u32, u32),
    ) {
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let layout = pipeline.get_bind_group_layout(0);
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform.as_entire_binding(),
        }];
        entries.extend(buffers.iter().enumerate().map(|(i, buf)| wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: buf.as_entire_binding(),
        }));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layout,
            entries: &entries,
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups.0, groups.1, 1);
    }

    pub(crate) fn gemm(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: GemmParams,
        a: &wgpu::Buffer,
        b: &wgpu::Buffer,
        c: &wgpu::Buffer,
    ) {
        let groups = (params.n.div_ceil(GEMM_TILE), params.m.div_ceil(GEMM_TILE));
        self.dispatch(encoder, &self.pipelines.gemm, "gemm", &params, &[a, b, c], groups);
    }

    pub(crate) fn im2col(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: ColParams,
        image: &wgpu::Buffer,
        columns: &wgpu::Buffer,
    ) {
        let groups = groups_1d(params.total);
        self.dispatch(encoder, &self.pipelines.im2col, "im2col", &params, &[image, columns], groups);
    }

    pub(crate) fn col2im(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: ColParams,
        columns: &wgpu::Buffer,
        image: &wgpu::Buffer,
    ) {
        let groups = groups_1d(params.total);
        self.dispatch(encoder, &self.pipelines.col2im, "col2im", &params, &[columns, image], groups);
    }

    pub(crate) fn add_bias(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: BiasParams,
        biases: &wgpu::Buffer,
        data: &wgpu::Buffer,
    ) {
        let groups = groups_1d(params.total);
        self.dispatch(encoder, &self.pipelines.add_bias, "add_bias", &params, &[biases, data], groups);
    }

    pub(crate) fn grad_bias(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: BiasParams,
        grad: &wgpu::Buffer,
        bias_grad: &wgpu::Buffer,
    ) {
        let groups = groups_1d(params.channels);
        self.dispatch(encoder, &self.pipelines.grad_bias, "grad_bias", &params, &[grad, bias_grad], groups);
    }

    pub(crate) fn activation(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: ActParams,
        data: &wgpu::Buffer,
    ) {
        let groups = groups_1d(params.total);
        self.dispatch(encoder, &self.pipelines.activation, "activation", &params, &[data], groups);
    }

    pub(crate) fn activation_backward(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: ActParams,
        output: &wgpu::Buffer,
        grad: &wgpu::Buffer,
    ) {
        let groups = groups_1d(params.total);
        self.dispatch(
            encoder,
            &self.pipelines.activation_backward,
            "activation_backward",
            &params,
            &[output, grad],
            groups,
        );
    }

    /// Records a copy of the first `len` floats of `src` into a mappable buffer.
    fn stage(&self, encoder: &mut wgpu::CommandEncoder, src: &wgpu::Buffer, len: usize) -> wgpu::Buffer {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: byte_len(len.max(1)),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if len > 0 {
            encoder.copy_buffer_to_buffer(src, 0, &staging, 0, byte_len(len));
        }
        staging
    }

    /// Blocks until `staging` is mapped and copies it into `out`.
    fn read(&self, staging: &wgpu::Buffer, out: &mut [f32]) -> Result<(), GpuFailure> {
        if out.is_empty() {
            return Ok(());
        }
        let slice = staging.slice(..byte_len(out.len()));
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait)?;
        rx.recv().map_err(|_| GpuFailure { kind: None })??;

        {
            let view = slice.get_mapped_range();
            out.copy_from_slice(bytemuck::cast_slice(&view));
        }
        staging.unmap();
        Ok(())
    }
}

const fn byte_len(len: usize) -> u64 {
    (len * core::mem::size_of::<f32>()) as u64
}

/// Grid for a 1-D kernel over `total` invocations, folded into a second
/// dimension once the first exceeds the per-dimension limit. Shaders rebuild
/// the flat index from `num_workgroups`.
fn groups_1d(total: u32) -> (u32, u32) {
    let groups = total.div_ceil(WORKGROUP_1D).max(1);
    if groups <= MAX_GROUPS_PER_DIM {
        (groups, 1)
    } else {
        (MAX_GROUPS_PER_DIM, groups.div_ceil(MAX_GROUPS_PER_DIM))
    }
}

fn compute_pipeline(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new() {
        Ok(ctx) => {
            log::info!("wgpu backend initialised");
            Some(ctx)
        }
        Err(e) => {
            log::warn!("wgpu backend unavailable, falling back to CPU: {e}");
            None
        }
    };
}

/// The shared GPU context, or `None` if no device could be initialised.
#[must_use]
pub fn context() -> Option<&'static GpuContext> {
    GPU_CONTEXT.as_ref()
}
