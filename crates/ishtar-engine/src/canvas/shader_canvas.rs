use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::device::ComputeContext;

use super::Pixels;

/// Workgroup width used by canvas kernels: one invocation per pixel, 1-D.
pub const KERNEL_WORKGROUP_SIZE: u32 = 64;

/// First binding index available for user-supplied kernel arguments.
const USER_BINDING_BASE: u32 = 2;

/// Composite behavior used when the canvas is blitted over the frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BlendMode {
    /// Canvas pixels replace the destination.
    #[default]
    Opaque,
    /// Straight-alpha blending; the usual mode for compositing.
    Alpha,
    /// Additive; useful for lighting and glow layers.
    Additive,
    /// Destination multiplied by source; useful for tinting and shadow maps.
    Modulate,
}

/// Canvas dimensions as seen by kernels at binding 1.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DimsUniform {
    width: u32,
    height: u32,
    _pad: [u32; 2], // 16-byte alignment
}

/// A compiled kernel bound to this canvas.
struct Kernel {
    entry: String,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
}

/// A pixel canvas shaded by compute kernels.
///
/// Owns the CPU pixel array and the device-side buffers mirroring it. The
/// storage and readback buffers are allocated once, sized exactly to the
/// pixel array, and never resized.
///
/// A kernel must be bound with [`set_shader`](Self::set_shader) before
/// [`shade`](Self::shade) is invoked.
pub struct ShaderCanvas {
    width: u32,
    height: u32,

    /// Blit position in physical pixels. Adjust freely between frames.
    pub origin: (i32, i32),

    pixels: Pixels,

    /// Device-side mirror of `pixels`; kernels read and write this.
    pixel_buffer: wgpu::Buffer,

    /// Mappable staging buffer for the download half of the shade cycle.
    readback: wgpu::Buffer,

    dims_ubo: wgpu::Buffer,

    kernel: Option<Kernel>,
    blend: BlendMode,
}

impl ShaderCanvas {
    /// Creates a canvas with all pixels zeroed.
    pub fn new(ctx: &ComputeContext, width: u32, height: u32) -> Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "canvas has zero size");

        let pixels = Pixels::new(width, height);
        let byte_len = pixels.byte_len() as u64;

        let pixel_buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("ishtar canvas pixels"),
            size: byte_len,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("ishtar canvas readback"),
            size: byte_len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let dims = DimsUniform {
            width,
            height,
            _pad: [0; 2],
        };
        let dims_ubo = ctx
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ishtar canvas dims"),
                contents: bytemuck::bytes_of(&dims),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        Ok(Self {
            width,
            height,
            origin: (0, 0),
            pixels,
            pixel_buffer,
            readback,
            dims_ubo,
            kernel: None,
            blend: BlendMode::default(),
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read access to the CPU pixel array.
    #[inline]
    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    /// Write access to the CPU pixel array.
    ///
    /// Changes become visible to kernels on the next [`shade`](Self::shade)
    /// and to the screen on the next blit update.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut Pixels {
        &mut self.pixels
    }

    /// Resets the pixel array to all black with alpha 0.
    ///
    /// A kernel that rewrites every pixel does this for free; reach for this
    /// only when shading partially or infrequently.
    pub fn blank(&mut self) {
        self.pixels.blank();
    }

    /// Sets the composite behavior used when this canvas is blitted.
    pub fn set_blend_mode(&mut self, blend: BlendMode) {
        self.blend = blend;
    }

    #[inline]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    /// Entry-point name of the currently bound kernel, if any.
    pub fn kernel_entry(&self) -> Option<&str> {
        self.kernel.as_ref().map(|k| k.entry.as_str())
    }

    /// Binds the kernel named `entry` from the context's program.
    ///
    /// Replaces any previously bound kernel. The canvas supplies bindings 0
    /// (pixel buffer) and 1 (dimensions); see the module docs for the full
    /// contract.
    pub fn set_shader(&mut self, ctx: &ComputeContext, entry: &str) -> Result<()> {
        self.set_shader_with(ctx, entry, Vec::new())
    }

    /// Like [`set_shader`](Self::set_shader), additionally binding
    /// user-supplied resources. Every extra entry must use binding 2 or
    /// higher.
    pub fn set_shader_with(
        &mut self,
        ctx: &ComputeContext,
        entry: &str,
        extra: Vec<wgpu::BindGroupEntry<'_>>,
    ) -> Result<()> {
        for e in &extra {
            anyhow::ensure!(
                e.binding >= USER_BINDING_BASE,
                "binding {} is reserved by the canvas; user arguments start at {}",
                e.binding,
                USER_BINDING_BASE,
            );
        }

        // Unknown entry points and ill-formed kernels surface here as
        // validation errors carrying the compiler diagnostics.
        let error_scope = ctx.device().push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = ctx
            .device()
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("ishtar canvas kernel"),
                layout: None,
                module: ctx.program(),
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(error_scope.pop()) {
            anyhow::bail!("error building kernel {entry:?}: {err}");
        }

        let mut entries = Vec::with_capacity(2 + extra.len());
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: self.pixel_buffer.as_entire_binding(),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: 1,
            resource: self.dims_ubo.as_entire_binding(),
        });
        entries.extend(extra);

        let layout = pipeline.get_bind_group_layout(0);
        let error_scope = ctx.device().push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ishtar canvas bindings"),
            layout: &layout,
            entries: &entries,
        });
        if let Some(err) = pollster::block_on(error_scope.pop()) {
            anyhow::bail!("error binding kernel {entry:?} arguments: {err}");
        }

        self.kernel = Some(Kernel {
            entry: entry.to_string(),
            pipeline,
            bind_group,
        });
        Ok(())
    }

    /// Runs the bound kernel over every pixel and reads the result back.
    ///
    /// Fully blocking: upload, dispatch, queue wait, and download complete
    /// before this returns. Fails if no kernel has been bound.
    pub fn shade(&mut self, ctx: &ComputeContext) -> Result<()> {
        let kernel = self
            .kernel
            .as_ref()
            .context("no kernel bound; call set_shader before shade")?;

        debug_assert_eq!(self.pixels.byte_len() as u64, self.pixel_buffer.size());

        ctx.queue()
            .write_buffer(&self.pixel_buffer, 0, self.pixels.as_bytes());

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ishtar shade encoder"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ishtar shade pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&kernel.pipeline);
            cpass.set_bind_group(0, &kernel.bind_group, &[]);
            cpass.dispatch_workgroups(
                dispatch_size(self.width * self.height, KERNEL_WORKGROUP_SIZE),
                1,
                1,
            );
        }
        encoder.copy_buffer_to_buffer(
            &self.pixel_buffer,
            0,
            &self.readback,
            0,
            self.pixels.byte_len() as u64,
        );
        ctx.queue().submit(std::iter::once(encoder.finish()));

        // Blocking download: map the staging buffer once the queue drains.
        let slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        ctx.device()
            .poll(wgpu::PollType::wait_indefinitely())
            .context("failed waiting for the shade dispatch")?;
        rx.recv()
            .context("readback callback dropped")?
            .context("failed to map readback buffer")?;

        {
            let mapped = slice.get_mapped_range();
            self.pixels.as_bytes_mut().copy_from_slice(&mapped);
        }
        self.readback.unmap();

        Ok(())
    }
}

/// Number of 1-D workgroups covering `invocations` at `workgroup` width.
pub(crate) fn dispatch_size(invocations: u32, workgroup: u32) -> u32 {
    invocations.div_ceil(workgroup)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── dispatch_size ─────────────────────────────────────────────────────

    #[test]
    fn exact_multiple_needs_no_extra_group() {
        assert_eq!(dispatch_size(128, 64), 2);
    }

    #[test]
    fn remainder_rounds_up() {
        assert_eq!(dispatch_size(129, 64), 3);
        assert_eq!(dispatch_size(1, 64), 1);
    }

    #[test]
    fn zero_invocations_dispatch_nothing() {
        assert_eq!(dispatch_size(0, 64), 0);
    }

    // ── uniform layout ────────────────────────────────────────────────────

    #[test]
    fn dims_uniform_is_16_bytes() {
        assert_eq!(std::mem::size_of::<DimsUniform>(), 16);
    }

    #[test]
    fn blend_mode_defaults_to_opaque() {
        assert_eq!(BlendMode::default(), BlendMode::Opaque);
    }
}
