#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = native::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

// The browser build starts from `showcase_scene::web::run` instead.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::any::Any;
    use std::env;
    use std::fmt;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;

    use anyhow::{anyhow, Context, Result};
    use glam::Vec2;
    use pollster::block_on;
    use winit::dpi::LogicalSize;
    use winit::event_loop::{ControlFlow, EventLoop};
    use winit::window::Window;

    use showcase_scene::app::{final_state_lines, ShowcaseApp};
    use showcase_scene::{
        requests_for, AssetLoader, LoopHandle, Renderer, SceneDescription, SceneState,
        StaticViewport, WindowViewport,
    };

    const SIMULATED_FRAME: f32 = 1.0 / 60.0;

    pub fn run() -> Result<()> {
        let options = CliOptions::parse(env::args().skip(1))?;
        let description = match &options.scene {
            Some(path) => {
                let xml = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read scene description {path}"))?;
                SceneDescription::from_xml(&xml)
                    .with_context(|| format!("failed to parse scene description {path}"))?
            }
            None => SceneDescription::default(),
        };

        if options.summary_only {
            return run_headless(description, &options);
        }
        match run_interactive(description.clone(), &options) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install a GPU driver to enable rendering)."
                    );
                    run_headless(description, &options)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Loads every asset, replays the scripted clicks, steps the requested
    /// number of frames and prints the result.
    fn run_headless(description: SceneDescription, options: &CliOptions) -> Result<()> {
        let viewport = Arc::new(StaticViewport::new(1280, 720));
        let requests = requests_for(&description, &options.assets);
        let mut state = SceneState::new(description, viewport);
        for outcome in AssetLoader::spawn(requests).wait_all() {
            state.apply_outcome(outcome);
        }

        let loaded = [state.character(), state.draggable(), state.ball()]
            .iter()
            .filter(|model| model.is_some())
            .count();
        let background = state
            .background()
            .map(|image| format!("{}x{}", image.width, image.height))
            .unwrap_or_else(|| "none".to_string());
        println!("Loaded {loaded}/3 models, background {background}");

        for &click in &options.clicks {
            state.pointer_moved(click);
            let outcome = state.pointer_clicked(click);
            println!(
                "Click at ({}, {}): character {}, ball {}{}",
                click.x,
                click.y,
                hit_word(outcome.character_hit),
                hit_word(outcome.ball_hit),
                if outcome.suppressed {
                    " (suppressed while dragging)"
                } else {
                    ""
                }
            );
        }

        for _ in 0..options.frames {
            state.advance(SIMULATED_FRAME);
        }
        println!("Simulated {} frame(s)", options.frames);
        print_final_state(&state);
        Ok(())
    }

    fn hit_word(hit: bool) -> &'static str {
        if hit {
            "hit"
        } else {
            "missed"
        }
    }

    fn print_final_state(state: &SceneState) {
        println!("Final scene state:");
        for line in final_state_lines(state) {
            println!("{line}");
        }
    }

    fn run_interactive(description: SceneDescription, options: &CliOptions) -> Result<()> {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
        panic::set_hook(default_hook);
        let event_loop = event_loop
            .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
            .map_err(|err| WindowInitError::from_error("event loop", err))?;

        #[allow(deprecated)]
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("Showcase Scene")
                        .with_inner_size(LogicalSize::new(1280.0, 720.0)),
                )
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let renderer = block_on(Renderer::new(Arc::clone(&window)))?;
        let size = window.inner_size();
        let viewport = Arc::new(WindowViewport::new(size.width, size.height));

        let pending = AssetLoader::spawn(requests_for(&description, &options.assets));
        let state = SceneState::new(description, viewport.clone());
        let mut app = ShowcaseApp::new(renderer, state, viewport, pending, LoopHandle::new());

        let mut last_error = None;
        #[allow(deprecated)]
        event_loop
            .run(|event, elwt| {
                elwt.set_control_flow(ControlFlow::Poll);
                if let Err(err) = app.process_event(&event, elwt) {
                    last_error = Some(err);
                    elwt.exit();
                }
            })
            .context("event loop failed")?;

        print_final_state(app.state());
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[derive(Debug)]
    struct WindowInitError {
        message: String,
    }

    impl WindowInitError {
        fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {}", panic_message(panic)),
            }
        }

        fn from_error(stage: &str, err: impl fmt::Display) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {err}"),
            }
        }
    }

    impl fmt::Display for WindowInitError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl std::error::Error for WindowInitError {}

    fn panic_message(panic: Box<dyn Any + Send>) -> String {
        match panic.downcast::<String>() {
            Ok(msg) => *msg,
            Err(panic) => match panic.downcast::<&'static str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "unknown panic".into(),
            },
        }
    }

    const USAGE: &str = "Usage: showcase-scene [--scene <file.xml>] [--assets <dir>] [--summary-only] [--frames <n>] [--click <x>,<y>]...";

    #[derive(Debug, PartialEq)]
    struct CliOptions {
        scene: Option<String>,
        assets: String,
        summary_only: bool,
        frames: u32,
        clicks: Vec<Vec2>,
    }

    impl CliOptions {
        fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
            let mut options = Self {
                scene: None,
                assets: ".".to_string(),
                summary_only: false,
                frames: 0,
                clicks: Vec::new(),
            };
            let mut args = args.into_iter();
            while let Some(arg) = args.next() {
                let mut value = |flag: &str| {
                    args.next()
                        .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
                };
                match arg.as_str() {
                    "--scene" => options.scene = Some(value("--scene")?),
                    "--assets" => options.assets = value("--assets")?,
                    "--summary-only" => options.summary_only = true,
                    "--frames" => {
                        let raw = value("--frames")?;
                        options.frames = raw
                            .parse()
                            .with_context(|| format!("invalid frame count {raw:?}"))?;
                    }
                    "--click" => {
                        let raw = value("--click")?;
                        options.clicks.push(parse_point(&raw)?);
                    }
                    "-h" | "--help" => return Err(anyhow!("{USAGE}")),
                    other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
                }
            }
            Ok(options)
        }
    }

    fn parse_point(raw: &str) -> Result<Vec2> {
        let (x, y) = raw
            .split_once(',')
            .ok_or_else(|| anyhow!("expected <x>,<y> but got {raw:?}"))?;
        let x: f32 = x.trim().parse().with_context(|| format!("invalid x in {raw:?}"))?;
        let y: f32 = y.trim().parse().with_context(|| format!("invalid y in {raw:?}"))?;
        Ok(Vec2::new(x, y))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn parse(args: &[&str]) -> Result<CliOptions> {
            CliOptions::parse(args.iter().map(|arg| arg.to_string()))
        }

        #[test]
        fn defaults_without_arguments() {
            let options = parse(&[]).unwrap();
            assert_eq!(options.assets, ".");
            assert!(!options.summary_only);
            assert_eq!(options.frames, 0);
            assert!(options.clicks.is_empty());
        }

        #[test]
        fn parses_every_flag() {
            let options = parse(&[
                "--scene",
                "scene.xml",
                "--assets",
                "public",
                "--summary-only",
                "--frames",
                "12",
                "--click",
                "640,360",
                "--click",
                "10.5, 20",
            ])
            .unwrap();
            assert_eq!(options.scene.as_deref(), Some("scene.xml"));
            assert_eq!(options.assets, "public");
            assert!(options.summary_only);
            assert_eq!(options.frames, 12);
            assert_eq!(
                options.clicks,
                vec![Vec2::new(640.0, 360.0), Vec2::new(10.5, 20.0)]
            );
        }

        #[test]
        fn rejects_bad_input() {
            assert!(parse(&["--frames"]).is_err());
            assert!(parse(&["--frames", "many"]).is_err());
            assert!(parse(&["--click", "12"]).is_err());
            assert!(parse(&["--fullscreen"]).is_err());
        }
    }
}
