use std::{process::ExitCode, sync::Arc};

use anyhow::Context as _;
use env_logger::Env;
use ultraviolet::Vec2;

use ray_cat::{
    camera::{Camera, CameraSettings},
    config_loader::{Config, ConfigFileLoader},
    players::{PlayerRegistry, World},
    render::Renderer,
    scene::Scene,
    shader_loader::load_ray_tracing_shaders,
    time::Time,
    vulkan::{context::Context, device::RayTracingDevice},
};

struct App {
    renderer: Renderer,
    scene: Scene,
    world: World,
    /// Filled by the network layer, empty when playing alone.
    players: PlayerRegistry,
    camera: Camera,
    time: Time,
}

impl App {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let context = Context::new_headless().context("Could not create a ray tracing device")?;
        let device: Arc<dyn RayTracingDevice> = Arc::new(context);

        let shaders = load_ray_tracing_shaders(&config.shader_directory)?;
        let renderer = Renderer::new(device, &shaders, config)?;

        let mut camera = match &config.cached.camera_position {
            Some(cached) => Camera::from_cached(cached, CameraSettings::default()),
            None => Camera::new(CameraSettings::default()),
        };
        camera.on_resize(config.viewport_width, config.viewport_height);

        Ok(Self {
            renderer,
            scene: Scene::with_ground(),
            world: World::new(config.local_player_speed),
            players: PlayerRegistry::new(),
            camera,
            time: Time::new(),
        })
    }

    fn main_loop(&mut self, frame_count: Option<u64>) -> anyhow::Result<()> {
        while frame_count.map_or(true, |count| self.time.frame() < count) {
            self.time.update();

            // Without input the local player walks in a circle.
            let angle = self.time.elapsed().as_secs_f32();
            self.world.move_local(
                Vec2::new(angle.cos(), angle.sin()),
                self.time.delta_seconds(),
            );
            if self.world.update(&mut self.scene, &self.players) {
                self.renderer.invalidate_scene();
            }

            let report = self
                .renderer
                .render(&self.scene, &self.camera)
                .with_context(|| format!("Frame {} failed", self.time.frame()))?;
            if self.time.frame() % 60 == 0 {
                log::debug!(
                    "Frame {}: {:.2} ms, {} primitives, traced {}",
                    report.frame,
                    self.time.delta().as_secs_f64() * 1000.0,
                    report.primitive_count,
                    report.traced
                );
            }
        }
        Ok(())
    }
}

fn run() -> anyhow::Result<()> {
    let mut config_loader = ConfigFileLoader::new("config.json");
    let config = config_loader.load_config()?.clone();

    let mut app = App::new(&config)?;
    let result = app.main_loop(config.frame_count);
    app.renderer.destroy();
    log::info!("Rendered {} frames", app.time.frame());

    config_loader.get_or_load_config()?.cached.camera_position =
        Some(app.camera.cached_position());
    config_loader.save_config()?;
    result
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
