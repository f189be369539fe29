use std::path::Path;

use anyhow::{Context, Result};

use super::select;

/// Initialization parameters for the headless compute layer.
///
/// Favor the defaults for portability; raise limits only when a kernel
/// strictly needs them.
#[derive(Debug, Clone, Default)]
pub struct ComputeInit {
    /// Required wgpu features.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,
}

/// Owns the compute half of the GPU runtime:
/// - creates and stores Instance/Adapter/Device/Queue
/// - compiles every supplied kernel source into a single program
///
/// One context per process is the intended usage; canvases borrow it for
/// each shading cycle.
pub struct ComputeContext {
    /// wgpu instance used to create the adapter.
    instance: wgpu::Instance,

    /// Description of the selected adapter.
    adapter_info: wgpu::AdapterInfo,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Kernel program compiled from all supplied sources.
    program: wgpu::ShaderModule,
}

impl ComputeContext {
    /// Creates a context on the best-scoring adapter and compiles `sources`
    /// into one kernel program.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(sources: &[String], init: ComputeInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Scored scan first; let wgpu pick if nothing scores above zero.
        let adapter = match select::select_adapter(&instance) {
            Some(a) => a,
            None => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .context("failed to find a usable compute adapter")?,
        };

        let adapter_info = adapter.get_info();
        log::info!(
            "compute context on {:?} [{:?}]",
            adapter_info.name,
            adapter_info.backend,
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ishtar compute device"),
                required_features: init.required_features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create compute device/queue")?;

        let program = compile_program(&device, sources).await?;

        Ok(Self {
            instance,
            adapter_info,
            device,
            queue,
            program,
        })
    }

    /// Reads each path and compiles the sources into one program.
    pub async fn from_files<P: AsRef<Path>>(paths: &[P], init: ComputeInit) -> Result<Self> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let code = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read kernel source {}", path.display()))?;
            sources.push(code);
        }
        Self::new(&sources, init).await
    }

    /// Returns a description of the selected adapter.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns the compiled kernel program.
    pub fn program(&self) -> &wgpu::ShaderModule {
        &self.program
    }

    /// Returns the instance the context was created from.
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }
}

/// Concatenates the sources and compiles them as one WGSL module, so kernels
/// are addressed by entry-point name regardless of which source declared
/// them.
///
/// Compilation problems surface through a validation error scope; the
/// returned error carries the compiler diagnostics.
async fn compile_program(device: &wgpu::Device, sources: &[String]) -> Result<wgpu::ShaderModule> {
    anyhow::ensure!(!sources.is_empty(), "no kernel sources supplied");

    let code = sources.join("\n");

    let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("ishtar kernel program"),
        source: wgpu::ShaderSource::Wgsl(code.into()),
    });
    if let Some(err) = error_scope.pop().await {
        anyhow::bail!("error building kernel program: {err}");
    }

    Ok(module)
}
