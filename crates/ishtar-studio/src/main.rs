use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use ishtar_engine::canvas::ShaderCanvas;
use ishtar_engine::coords::ColorRgba;
use ishtar_engine::core::{App, AppControl, FrameCtx};
use ishtar_engine::device::{ComputeContext, ComputeInit, ScreenInit};
use ishtar_engine::logging::{LoggingConfig, init_logging};
use ishtar_engine::render::CanvasRenderer;
use ishtar_engine::window::{Runtime, RuntimeConfig};

const CANVAS_WIDTH: u32 = 960;
const CANVAS_HEIGHT: u32 = 540;

/// Time argument bound at the first user binding (2) of the plasma kernel.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ShadeParams {
    t: f32,
    _pad: [f32; 3],
}

struct PlasmaApp {
    compute: ComputeContext,
    canvas: ShaderCanvas,
    renderer: CanvasRenderer,
    params_ubo: wgpu::Buffer,
}

impl PlasmaApp {
    fn new() -> Result<Self> {
        let sources = vec![include_str!("shaders/plasma.wgsl").to_string()];
        let compute = pollster::block_on(ComputeContext::new(&sources, ComputeInit::default()))?;

        let params_ubo = compute.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("plasma params"),
            size: std::mem::size_of::<ShadeParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut canvas = ShaderCanvas::new(&compute, CANVAS_WIDTH, CANVAS_HEIGHT)?;
        canvas.set_shader_with(
            &compute,
            "plasma",
            vec![wgpu::BindGroupEntry {
                binding: 2,
                resource: params_ubo.as_entire_binding(),
            }],
        )?;

        Ok(Self {
            compute,
            canvas,
            renderer: CanvasRenderer::new(),
            params_ubo,
        })
    }
}

impl App for PlasmaApp {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        if let WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                    state: ElementState::Pressed,
                    ..
                },
            ..
        } = event
        {
            return AppControl::Exit;
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        let params = ShadeParams {
            t: ctx.time.elapsed,
            _pad: [0.0; 3],
        };
        self.compute
            .queue()
            .write_buffer(&self.params_ubo, 0, bytemuck::bytes_of(&params));

        if let Err(e) = self.canvas.shade(&self.compute) {
            log::error!("shade failed: {e:#}");
            return AppControl::Exit;
        }

        let canvas = &self.canvas;
        let renderer = &mut self.renderer;
        ctx.render(ColorRgba::black(), |rctx, target| {
            renderer.update(rctx, canvas);
            renderer.render(rctx, target, canvas);
        })
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let app = PlasmaApp::new()?;
    log::info!(
        "shading on {:?}; Escape closes the window",
        app.compute.adapter_info().name
    );

    Runtime::run(
        RuntimeConfig {
            title: "ishtar plasma".to_string(),
            initial_size: winit::dpi::LogicalSize::new(CANVAS_WIDTH as f64, CANVAS_HEIGHT as f64),
        },
        ScreenInit::default(),
        app,
    )
}
