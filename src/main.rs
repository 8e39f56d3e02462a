//! PID Beam entry point
//!
//! In the browser this wires the canvas, buttons and the simulated-playback
//! timer to a [`PlaybackController`](pid_beam::sim::PlaybackController).
//! Natively it runs headless: `simulate` plays a dataset from an archive and
//! `live` records JSON frames read from stdin.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_app {
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{HtmlCanvasElement, HtmlInputElement, Response};

    use pid_beam::audio::{AudioManager, SoundEffect};
    use pid_beam::platform::SystemClock;
    use pid_beam::renderer::SceneRenderer;
    use pid_beam::sim::{
        CanvasSize, Frame, Gains, Intent, PlaybackController, Scene, SimulationCatalog, Surface,
        TickOutcome, TickToken,
    };
    use pid_beam::telemetry::LogTransport;
    use pid_beam::{Settings, StoredSettings};

    const ARCHIVE_URL: &str = "simulation.pak";

    /// Viewer instance holding all state
    struct App {
        canvas: HtmlCanvasElement,
        controller: PlaybackController,
        renderer: Option<SceneRenderer>,
        audio: AudioManager,
        tick_interval_ms: f64,
    }

    impl App {
        fn new(canvas: HtmlCanvasElement, settings: &Settings) -> Self {
            Self {
                canvas,
                controller: PlaybackController::new(
                    settings,
                    Box::new(LogTransport),
                    Box::new(StoredSettings::new(settings)),
                    Box::new(SystemClock),
                ),
                renderer: None,
                audio: AudioManager::new(settings),
                tick_interval_ms: settings.tick_interval_ms(),
            }
        }

        /// Match the drawing buffer to the element's current layout size
        ///
        /// Called before every frame so scenes are always scaled to the
        /// canvas as it is displayed now.
        fn sync_canvas_size(&mut self) -> CanvasSize {
            let dpr = web_sys::window().map_or(1.0, |w| w.device_pixel_ratio());
            let width = (self.canvas.client_width() as f64 * dpr) as u32;
            let height = (self.canvas.client_height() as f64 * dpr) as u32;
            if width > 0
                && height > 0
                && (width != self.canvas.width() || height != self.canvas.height())
            {
                self.canvas.set_width(width);
                self.canvas.set_height(height);
                log::info!("Canvas resized to {}x{}", width, height);
            }
            let size = CanvasSize::new(self.canvas.width(), self.canvas.height());
            self.controller.set_canvas(size);
            size
        }

        fn draw(&mut self, scene: &Scene) {
            if scene.celebrate {
                self.audio.play(SoundEffect::Balanced);
            }
            if let Some(ref mut renderer) = self.renderer {
                match renderer.render(scene) {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        let size = renderer.size;
                        renderer.resize(size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of memory!");
                    }
                    Err(e) => log::warn!("Render error: {:?}", e),
                }
            }
        }
    }

    thread_local! {
        static APP: RefCell<Option<Rc<RefCell<App>>>> = const { RefCell::new(None) };
    }

    /// Frame ingress for the rig connection
    ///
    /// `s` is `undefined`/`null` when the sensor does not see the ball.
    #[wasm_bindgen]
    pub fn push_frame(m: f64, s: Option<f64>) {
        let Some(app) = APP.with(|cell| cell.borrow().clone()) else {
            log::warn!("Frame received before startup finished");
            return;
        };
        let mut a = app.borrow_mut();
        a.sync_canvas_size();
        let frame = Frame::new(m as f32, s.map(|v| v as f32));
        if let Some(scene) = a.controller.ingest(frame) {
            a.draw(&scene);
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("PID Beam starting...");

        let window = web_sys::window().expect("no window");
        let document = window.document().expect("no document");

        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .expect("no canvas")
            .dyn_into()
            .expect("not a canvas");

        let settings = Settings::load();
        let app = Rc::new(RefCell::new(App::new(canvas.clone(), &settings)));
        let size = app.borrow_mut().sync_canvas_size();

        // Initialize WebGPU
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        let surface = instance
            .create_surface(wgpu::SurfaceTarget::Canvas(canvas.clone()))
            .expect("Failed to create surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to get adapter");

        log::info!("Using adapter: {:?}", adapter.get_info().name);

        match SceneRenderer::new(surface, &adapter, size).await {
            Ok(renderer) => app.borrow_mut().renderer = Some(renderer),
            Err(e) => log::error!("Failed to create device: {}", e),
        }

        APP.with(|cell| *cell.borrow_mut() = Some(app.clone()));

        setup_buttons(app.clone());
        load_archive(app.clone());

        // Show the level beam until the first frame arrives
        {
            let mut a = app.borrow_mut();
            a.sync_canvas_size();
            if let Some(scene) = a.controller.ingest(Frame::lost(0.0)) {
                a.draw(&scene);
            }
        }

        log::info!("PID Beam running!");
    }

    /// Read a gain field, treating blanks and garbage as zero
    fn read_gain(id: &str) -> f64 {
        web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(id))
            .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
            .and_then(|input| input.value().trim().parse().ok())
            .unwrap_or(0.0)
    }

    fn read_gains() -> Gains {
        Gains::new(read_gain("kp"), read_gain("ki"), read_gain("kd"))
    }

    fn setup_buttons(app: Rc<RefCell<App>>) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };

        let buttons = [
            ("start-btn", Surface::Live, 1),
            ("stop-btn", Surface::Live, 0),
            ("simulate-btn", Surface::Simulation, 1),
            ("sim-stop-btn", Surface::Simulation, 0),
        ];

        for (id, surface, r) in buttons {
            let Some(btn) = document.get_element_by_id(id) else {
                log::warn!("Missing button #{}", id);
                continue;
            };
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
                if let Some(intent) = Intent::from_button(surface, read_gains(), r) {
                    handle_intent(&app, intent);
                }
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn handle_intent(app: &Rc<RefCell<App>>, intent: Intent) {
        let token = {
            let mut a = app.borrow_mut();
            a.audio.resume();
            match a.controller.handle(intent) {
                Ok(token) => {
                    let effect = match intent {
                        Intent::Stop => SoundEffect::Stop,
                        _ => SoundEffect::Start,
                    };
                    a.audio.play(effect);
                    token
                }
                Err(e) => {
                    log::warn!("Cannot {:?}: {}", intent, e);
                    None
                }
            }
        };
        if let Some(token) = token {
            schedule_tick(app.clone(), token, 0.0);
        }
    }

    fn schedule_tick(app: Rc<RefCell<App>>, token: TickToken, delay_ms: f64) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move || run_tick(app, token));
        let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
            closure.as_ref().unchecked_ref(),
            delay_ms as i32,
        );
        closure.forget();
    }

    fn run_tick(app: Rc<RefCell<App>>, token: TickToken) {
        let (next, delay) = {
            let mut a = app.borrow_mut();
            a.sync_canvas_size();
            match a.controller.tick(token) {
                TickOutcome::Rendered { scene, next } => {
                    a.draw(&scene);
                    (next, a.tick_interval_ms)
                }
                TickOutcome::Finished | TickOutcome::Stale => return,
            }
        };
        schedule_tick(app, next, delay);
    }

    fn load_archive(app: Rc<RefCell<App>>) {
        wasm_bindgen_futures::spawn_local(async move {
            let text = match fetch_text(ARCHIVE_URL).await {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to fetch {}: {:?}", ARCHIVE_URL, e);
                    return;
                }
            };
            match SimulationCatalog::from_json(&text) {
                Ok((catalog, report)) => {
                    for skipped in &report.skipped {
                        log::warn!("Skipped dataset: {}", skipped);
                    }
                    app.borrow_mut().controller.install_catalog(catalog);
                }
                Err(e) => log::error!("Failed to parse {}: {}", ARCHIVE_URL, e),
            }
        });
    }

    async fn fetch_text(url: &str) -> Result<String, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let response: Response = JsFuture::from(window.fetch_with_str(url))
            .await?
            .dyn_into()?;
        if !response.ok() {
            return Err(JsValue::from_str(&format!("HTTP {}", response.status())));
        }
        JsFuture::from(response.text()?)
            .await?
            .as_string()
            .ok_or_else(|| JsValue::from_str("response body is not text"))
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_app::run().await;
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::error::Error;
    use std::io::BufRead;
    use std::time::Duration;

    use pid_beam::platform::SystemClock;
    use pid_beam::sim::{Frame, Gains, PlaybackController, Scene, SimulationCatalog, TickOutcome};
    use pid_beam::telemetry::LogTransport;
    use pid_beam::{Settings, StoredSettings};

    pub const USAGE: &str = "\
usage: pid-beam simulate <archive> [--kp <gain>] [--ki <gain>] [--kd <gain>]
       pid-beam live [--kp <gain>] [--ki <gain>] [--kd <gain>]";

    #[derive(Debug)]
    pub enum Command {
        Simulate { archive: String, gains: Gains },
        Live { gains: Gains },
    }

    /// Parse arguments (without the program name)
    pub fn parse(args: &[String]) -> Result<Command, String> {
        let (command, rest) = args.split_first().ok_or("missing command")?;

        let mut positional = Vec::new();
        let mut gains = Gains::default();
        let mut i = 0;
        while i < rest.len() {
            let arg = rest[i].as_str();
            match arg {
                "--kp" | "--ki" | "--kd" => {
                    let value = rest
                        .get(i + 1)
                        .ok_or_else(|| format!("{} needs a value", arg))?;
                    let value: f64 = value
                        .parse()
                        .map_err(|_| format!("invalid gain for {}: {}", arg, value))?;
                    match arg {
                        "--kp" => gains.p = value,
                        "--ki" => gains.i = value,
                        _ => gains.d = value,
                    }
                    i += 2;
                }
                _ if arg.starts_with("--") => return Err(format!("unknown option {}", arg)),
                _ => {
                    positional.push(rest[i].clone());
                    i += 1;
                }
            }
        }

        match command.as_str() {
            "simulate" => match positional.as_slice() {
                [archive] => Ok(Command::Simulate {
                    archive: archive.clone(),
                    gains,
                }),
                _ => Err("simulate takes exactly one archive path".to_string()),
            },
            "live" if positional.is_empty() => Ok(Command::Live { gains }),
            "live" => Err("live takes no positional arguments".to_string()),
            other => Err(format!("unknown command {}", other)),
        }
    }

    fn controller(settings: &Settings) -> PlaybackController {
        PlaybackController::new(
            settings,
            Box::new(LogTransport),
            Box::new(StoredSettings::new(settings)),
            Box::new(SystemClock),
        )
    }

    fn report(scene: &Scene) {
        if scene.celebrate {
            log::info!("Balanced!");
        }
        if let Some(ball) = &scene.ball {
            log::debug!("ball at ({:.1}, {:.1}) px", ball.center.x, ball.center.y);
        }
    }

    pub fn simulate(settings: &Settings, archive: &str, gains: Gains) -> Result<(), Box<dyn Error>> {
        let json = std::fs::read_to_string(archive)?;
        let (catalog, load) = SimulationCatalog::from_json(&json)?;
        for skipped in &load.skipped {
            log::warn!("Skipped dataset: {}", skipped);
        }

        let mut controller = controller(settings);
        controller.install_catalog(catalog);

        let interval = Duration::from_secs_f64(settings.tick_interval_ms() / 1000.0);
        let mut token = controller.simulate(gains)?;
        let mut frames = 0usize;
        loop {
            match controller.tick(token) {
                TickOutcome::Rendered { scene, next } => {
                    report(&scene);
                    frames += 1;
                    token = next;
                    std::thread::sleep(interval);
                }
                TickOutcome::Finished | TickOutcome::Stale => break,
            }
        }
        log::info!(
            "Played {} frames, balanced={}",
            frames,
            controller.renderer().state().celebrated
        );
        Ok(())
    }

    pub fn live(settings: &Settings, gains: Gains) -> Result<(), Box<dyn Error>> {
        let mut controller = controller(settings);
        controller.start(gains);

        let stdin = std::io::stdin();
        for (n, line) in stdin.lock().lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Frame>(&line) {
                Ok(frame) => {
                    if let Some(scene) = controller.ingest(frame) {
                        report(&scene);
                    }
                }
                Err(e) => log::warn!("Skipping line {}: {}", n + 1, e),
            }
        }

        controller.stop();
        Ok(())
    }

}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use std::process::ExitCode;

    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {}\n{}", e, cli::USAGE);
            return ExitCode::from(2);
        }
    };

    let settings = pid_beam::Settings::load();
    let result = match command {
        cli::Command::Simulate { archive, gains } => cli::simulate(&settings, &archive, gains),
        cli::Command::Live { gains } => cli::live(&settings, gains),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
