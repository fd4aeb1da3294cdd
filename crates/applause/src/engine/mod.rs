//! The engine context and frame orchestrator.
//!
//! [`Engine`] owns per-process state: configuration, the message bus, the
//! librarian, timers, the FPS clock, LUTs, the collaborator glue and
//! (optionally) networking. [`Engine::frame`] runs the fixed phase sequence
//! that turns all of it into one deterministic frame; the order is a hard
//! contract, inputs feed physics velocities, physics resolves collisions,
//! networking may deliver commands, the scene update then observes
//! authoritative body state.

use crate::bus::{Bus, CommandFlags, Flow, Payload, Topic};
use crate::error::{Error, ErrorKind, Result};
use crate::glue::{GlueParts, Viewport};
use crate::input::InputPipeline;
use crate::librarian::Librarian;
use crate::logger::{self, LogFlags};
use crate::net::{NetConfig, Networking};
use crate::scene::{Scene, SceneRequests};
use crate::settings::Settings;
use crate::track::{self, ClassGuard};
use log::*;
use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

pub mod fps;
pub mod lut;
pub mod profiler;
pub mod timers;

pub use fps::FpsCounter;
pub use lut::{lut_find, Lut, LutPreset};
pub use profiler::{measure_time, FrameProfiler, PhaseTimes};
pub use timers::{TimerAction, TimerId, TimerOps, Timers};

/// Subsystem switches plus the recognized options. Field-for-field the
/// configuration surface the demos drive.
#[derive(Default)]
pub struct EngineConfig {
    pub debug: bool,
    pub quiet: bool,
    pub input: bool,
    pub font: bool,
    pub sound: bool,
    pub phys: bool,
    pub graphics: bool,
    pub ui: bool,
    pub settings: bool,

    pub title: String,
    /// Root for librarian URIs.
    pub base_url: Option<String>,
    /// Default UI font, loaded through the font boundary at init when
    /// `font` is on.
    pub default_font_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    /// Color-grading LUTs baked at init; identity when empty and graphics
    /// is on.
    pub lut_presets: Vec<LutPreset>,
    /// Exit after this many wall-clock seconds (counted in status
    /// messages).
    pub exit_timeout: Option<u32>,
    /// Connect to a log/command server at this address.
    pub server_addr: Option<String>,
    pub abort_on_error: bool,
}

/// Demo-supplied hooks invoked at fixed points of the frame.
pub trait EngineHooks {
    fn frame(&mut self, engine: &mut Engine, scene: &mut Scene) {
        let _ = (engine, scene);
    }
    fn resize(&mut self, engine: &mut Engine, width: u32, height: u32) {
        let _ = (engine, width, height);
    }
    fn settings_loaded(&mut self, settings: &mut Settings) {
        let _ = settings;
    }
    /// The debug-UI slot, between scene update and render.
    fn debug_ui(&mut self, engine: &mut Engine, scene: &mut Scene) {
        let _ = (engine, scene);
    }
}

/// Hookless runs (tests, the headless server).
pub struct NoHooks;
impl EngineHooks for NoHooks {}

#[derive(Debug, Clone)]
pub struct OsInfo {
    pub name: String,
    pub mobile: bool,
}

/// Commands observed on the bus that only the orchestrator can act on;
/// collected by a subscriber, applied at end of frame.
#[derive(Default)]
struct CommandState {
    exit_timeout: Option<u32>,
    timeout_elapsed: bool,
    global_exit: bool,
    restart: bool,
    modality_toggles: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Exit,
    Restart,
}

pub struct Engine {
    cfg: EngineConfig,
    pub bus: Bus,
    pub librarian: Librarian,
    pub settings: Option<Settings>,
    pub timers: Timers,
    pub fps: FpsCounter,
    pub profiler: FrameProfiler,
    pub luts: Vec<Lut>,
    pub os_info: OsInfo,

    pub renderer: Box<dyn crate::glue::Renderer>,
    pub physics: Box<dyn crate::glue::Physics>,
    pub audio: Option<Box<dyn crate::glue::Audio>>,
    pub font: Option<Box<dyn crate::glue::Font>>,
    pub display: Box<dyn crate::glue::Display>,
    pub net: Option<Networking>,
    pub input: InputPipeline,

    start: Instant,
    now: Duration,
    default_font: Option<crate::glue::FontId>,
    commands: Rc<RefCell<CommandState>>,
    exit_cleanup: Vec<Box<dyn FnOnce(i32)>>,
    modality: bool,
    fullscreen: bool,
    restart_requested: bool,
    _class: ClassGuard,
}

fn config_is_valid(cfg: &EngineConfig) -> bool {
    if cfg.graphics && cfg.title.is_empty() {
        return false;
    }
    if cfg.ui && !cfg.graphics {
        return false;
    }
    if !cfg.lut_presets.is_empty() && !cfg.graphics {
        return false;
    }
    true
}

impl Engine {
    /// Brings the engine up. Initialization errors propagate and abort;
    /// partial state unwinds through drops.
    pub fn new(cfg: EngineConfig, parts: GlueParts) -> Result<Self> {
        if !config_is_valid(&cfg) {
            return Err(Error::new(ErrorKind::InvalidArguments));
        }

        let mut log_flags = LogFlags::DEFAULT;
        if cfg.debug {
            log_flags |= LogFlags::RING;
        }
        if cfg.server_addr.is_some() {
            // the networked sink feeds off the ring
            log_flags |= LogFlags::RING;
        }
        if cfg.quiet {
            log_flags |= LogFlags::QUIET;
        }
        logger::init(log_flags);

        let os_info = OsInfo {
            name: std::env::consts::OS.to_string(),
            mobile: false,
        };
        info!("applause {} on {}", crate::VERSION, os_info.name);

        let bus = Bus::new();
        let librarian = Librarian::new(cfg.base_url.as_deref());

        let mut luts = Vec::new();
        if cfg.graphics {
            let presets = if cfg.lut_presets.is_empty() {
                vec![LutPreset::Identity]
            } else {
                cfg.lut_presets.clone()
            };
            for preset in presets {
                luts.push(Lut::generate(preset, 32)?);
            }
        }

        let commands = Rc::new(RefCell::new(CommandState {
            exit_timeout: cfg.exit_timeout,
            ..CommandState::default()
        }));
        let mailbox = commands.clone();
        bus.subscribe(Topic::Command, move |message| {
            let Payload::Command(cmd) = &message.payload else {
                return Flow::Handled;
            };
            let mut state = mailbox.borrow_mut();
            if cmd.flags.contains(CommandFlags::STATUS) {
                if let Some(left) = state.exit_timeout.as_mut() {
                    *left = left.saturating_sub(1);
                    if *left == 0 {
                        state.timeout_elapsed = true;
                    }
                }
            }
            if cmd.flags.contains(CommandFlags::GLOBAL_EXIT) {
                state.global_exit = true;
            }
            if cmd.flags.contains(CommandFlags::RESTART) {
                state.restart = true;
            }
            if cmd.flags.contains(CommandFlags::TOGGLE_MODALITY) {
                state.modality_toggles += 1;
            }
            if cmd.flags.contains(CommandFlags::TOGGLE_NOISE) {
                logger::toggle_noise();
            }
            Flow::Handled
        });

        let input = InputPipeline::new(&bus);

        if cfg.abort_on_error {
            logger::set_abort_on_error(true);
        }

        let GlueParts {
            mut renderer,
            physics,
            audio,
            font,
            mut display,
        } = parts;
        let audio = if cfg.sound { audio } else { None };
        let mut font = if cfg.font { font } else { None };

        let mut default_font = None;
        if let Some(font) = font.as_deref_mut() {
            let name = cfg.default_font_name.as_deref().unwrap_or("default.ttf");
            default_font = Some(font.font_new(name)?);
        }

        if cfg.graphics {
            let (width, height) = if cfg.width > 0 && cfg.height > 0 {
                (cfg.width, cfg.height)
            } else {
                display.get_sizes()
            };
            renderer.set_viewport(Viewport {
                x: 0,
                y: 0,
                width,
                height,
            });
            if cfg.fullscreen {
                display.enter_fullscreen();
            }
        }

        let settings = cfg.settings.then(|| Settings::load(&librarian));

        let net = match (&cfg.server_addr, cfg!(feature = "final")) {
            (Some(addr), false) => {
                let net_cfg = NetConfig {
                    server_ip: addr.clone(),
                    ..NetConfig::default()
                };
                match Networking::client(net_cfg, &bus) {
                    Ok(net) => Some(net),
                    Err(err) => {
                        warn!("networking disabled: {err}");
                        None
                    }
                }
            }
            _ => None,
        };

        let mut engine = Self {
            cfg,
            bus,
            librarian,
            settings,
            timers: Timers::new(),
            fps: FpsCounter::new(),
            profiler: FrameProfiler::new(),
            luts,
            os_info,
            renderer,
            physics,
            audio,
            font,
            display,
            net,
            input,
            start: Instant::now(),
            now: Duration::ZERO,
            default_font,
            commands,
            exit_cleanup: Vec::new(),
            modality: false,
            fullscreen: false,
            restart_requested: false,
            _class: ClassGuard::new("engine"),
        };
        engine.fullscreen = engine.cfg.fullscreen;
        engine.restore_window_geometry();

        Ok(engine)
    }

    /// A headless engine with everything interesting enabled; the test and
    /// server configuration.
    pub fn headless(cfg: EngineConfig) -> Result<Self> {
        let (width, height) = (cfg.width.max(1), cfg.height.max(1));
        Self::new(cfg, GlueParts::headless(width, height))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Monotonic time of the current frame, seconds.
    pub fn current_time(&self) -> f64 {
        self.now.as_secs_f64()
    }

    pub fn lut_find(&self, name: &str) -> Result<&Lut> {
        lut_find(&self.luts, name)
    }

    /// The font loaded from `default_font_name` at init, if the font
    /// subsystem is on.
    pub fn default_font(&self) -> Option<crate::glue::FontId> {
        self.default_font
    }

    /// Registers a teardown hook; hooks run in reverse order at shutdown.
    pub fn at_exit(&mut self, hook: impl FnOnce(i32) + 'static) {
        self.exit_cleanup.push(Box::new(hook));
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    fn restore_window_geometry(&mut self) {
        let Some(settings) = &self.settings else {
            return;
        };
        let x = settings.get_num(Some("window"), "x").unwrap_or(0.0) as i32;
        let y = settings.get_num(Some("window"), "y").unwrap_or(0.0) as i32;
        let width = settings.get_num(Some("window"), "width").unwrap_or(0.0) as u32;
        let height = settings.get_num(Some("window"), "height").unwrap_or(0.0) as u32;
        if width > 0 && height > 0 {
            self.display.set_window_pos_size(x, y, width, height);
        }
    }

    fn persist_window_geometry(&mut self) {
        let Some(settings) = &mut self.settings else {
            return;
        };
        let (x, y, width, height) = self.display.get_window_pos_size();
        settings.set_num(Some("window"), "x", x as f64);
        settings.set_num(Some("window"), "y", y as f64);
        settings.set_num(Some("window"), "width", width as f64);
        settings.set_num(Some("window"), "height", height as f64);
    }

    /// One frame, phases in contract order.
    pub fn frame(&mut self, scene: &mut Scene, hooks: &mut dyn EngineHooks) {
        let mut times = PhaseTimes::default();

        // frame boundary: deferred completions first, then the clock
        self.librarian.pump();
        self.now = self.start.elapsed();
        self.fps.tick(self.now, &self.bus);
        self.timers.run(self.now.as_secs_f64());

        let vp = self.renderer.viewport();
        if vp.width > 0 && vp.height > 0 {
            scene.set_dimensions(vp.width, vp.height);
        }

        // input: fuzzer, then the platform queue, then the scene reads it
        if self.cfg.input {
            self.input.fuzzer_step(&self.bus);
            self.input.dispatch(&self.bus);
        }
        let requests = scene.drain_inputs();

        let fine = self.fps.fine_f64();
        let dt = f64::from(self.fps.delta.subsec_nanos()) / 1e9;
        let step_physics = self.cfg.phys;
        let debug_ui = self.cfg.ui;

        // character motion feeds the physics step
        times.characters = measure_time(|| {
            if scene.control.is_some() {
                scene.characters_move(fine);
            }
        })
        .1;

        times.physics = measure_time(|| {
            if step_physics {
                self.physics.step(dt);
            }
        })
        .1;

        times.net = measure_time(|| {
            #[cfg(not(feature = "final"))]
            if let Some(net) = &mut self.net {
                if let Err(err) = net.poll() {
                    debug!("network poll: {err}");
                }
                if net.restart_received() {
                    self.restart_requested = true;
                }
            }
        })
        .1;

        // scene update observes post-step body state
        times.updates = measure_time(|| {
            scene.update(self.physics.as_mut(), fine);
            scene.cameras_calc();
        })
        .1;

        times.callback = measure_time(|| {
            if debug_ui {
                hooks.debug_ui(self, scene);
            }
            hooks.frame(self, scene);
        })
        .1;

        // render and present
        let (queue, build_time) = measure_time(|| scene.build_render_queue());
        times.render = build_time
            + measure_time(|| {
                self.renderer.frame_begin();
                self.renderer.models_render(&queue, &scene.options);
                self.renderer.frame_end();
                self.renderer.debug(&scene.options);
                self.display.swap_buffers();
            })
            .1;

        self.profiler.push_frame(times);

        self.apply_requests(requests, scene, hooks);
        self.apply_commands(scene);
    }

    fn apply_requests(
        &mut self,
        requests: SceneRequests,
        scene: &mut Scene,
        hooks: &mut dyn EngineHooks,
    ) {
        if requests.exit {
            self.display.request_exit();
        }
        if requests.fullscreen_toggle {
            if self.fullscreen {
                self.display.leave_fullscreen();
            } else {
                self.display.enter_fullscreen();
            }
            self.fullscreen = !self.fullscreen;
        }
        if let Some((width, height)) = requests.resize {
            self.renderer.set_viewport(Viewport {
                x: 0,
                y: 0,
                width,
                height,
            });
            self.persist_window_geometry();
            scene.set_dimensions(width, height);
            hooks.resize(self, width, height);
        }
    }

    fn apply_commands(&mut self, scene: &mut Scene) {
        let mut state = self.commands.borrow_mut();
        if state.global_exit || state.timeout_elapsed {
            self.display.request_exit();
            state.global_exit = false;
            state.timeout_elapsed = false;
        }
        if state.restart {
            self.restart_requested = true;
            state.restart = false;
        }
        for _ in 0..state.modality_toggles {
            self.modality = !self.modality;
        }
        state.modality_toggles = 0;
        drop(state);

        scene.set_paused(self.modality);
    }

    /// Drives frames until an exit request or a restart command. Settings
    /// are reported loaded before the first frame.
    pub fn run(&mut self, scene: &mut Scene, hooks: &mut dyn EngineHooks) -> RunOutcome {
        if let Some(settings) = &mut self.settings {
            hooks.settings_loaded(settings);
        }

        while !self.display.exit_requested() {
            self.frame(scene, hooks);
            if self.restart_requested {
                return RunOutcome::Restart;
            }
        }
        RunOutcome::Exit
    }

    /// Tears the engine down: exit hooks in reverse order, networking
    /// drained, settings stored, log ring flushed, leak check last.
    pub fn shutdown(mut self, status: i32) {
        while let Some(hook) = self.exit_cleanup.pop() {
            hook(status);
        }
        if let Some(mut net) = self.net.take() {
            net.shutdown();
        }
        if let Some(font) = self.font.as_deref_mut() {
            if let Some(id) = self.default_font.take() {
                font.font_done(id);
            }
        }
        if let Some(mut settings) = self.settings.take() {
            let _ = settings.store(&self.librarian);
        }
        logger::ring_flush();

        if track::any_active() {
            // `self` still counts for "engine" until this frame ends; more
            // than that is a leak worth looking at.
            debug!("live instances at shutdown:\n{}", track::classes_snapshot());
        }
    }

    /// Re-executes the current binary with the original arguments. Only
    /// returns on failure.
    #[cfg(unix)]
    pub fn restart_exec() -> Error {
        use std::os::unix::process::CommandExt;
        let args: Vec<String> = std::env::args().collect();
        info!("restarting: {:?}", args);
        let err = std::process::Command::new(&args[0]).args(&args[1..]).exec();
        error!("restart failed: {err}");
        Error::from(err)
    }

    #[cfg(not(unix))]
    pub fn restart_exec() -> Error {
        Error::new(ErrorKind::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CommandMsg, Message};

    fn quiet_cfg() -> EngineConfig {
        EngineConfig {
            quiet: true,
            input: true,
            phys: true,
            width: 640,
            height: 480,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn graphics_without_title_is_invalid() {
        let cfg = EngineConfig {
            graphics: true,
            ..EngineConfig::default()
        };
        assert!(Engine::headless(cfg).is_err());
    }

    #[test]
    fn ui_requires_graphics() {
        let cfg = EngineConfig {
            ui: true,
            ..EngineConfig::default()
        };
        assert!(Engine::headless(cfg).is_err());
    }

    #[test]
    fn frames_advance_scene_and_swap() {
        let mut engine = Engine::headless(quiet_cfg()).unwrap();
        let mut scene = Scene::new(&engine.bus);
        let mut hooks = NoHooks;

        for _ in 0..3 {
            engine.frame(&mut scene, &mut hooks);
        }
        assert_eq!(scene.frames_total, 3);
        assert!(engine.profiler.frames.len() == 3);
    }

    #[test]
    fn global_exit_command_requests_exit() {
        let mut engine = Engine::headless(quiet_cfg()).unwrap();
        let mut scene = Scene::new(&engine.bus);

        engine.bus.send(Message::command(CommandMsg {
            flags: CommandFlags::GLOBAL_EXIT,
            ..CommandMsg::default()
        }));
        engine.frame(&mut scene, &mut NoHooks);
        assert!(engine.display.exit_requested());
    }

    #[test]
    fn font_flag_gates_the_default_font() {
        let mut cfg = quiet_cfg();
        cfg.font = true;
        cfg.default_font_name = Some("mono.ttf".into());
        let engine = Engine::headless(cfg).unwrap();
        assert!(engine.font.is_some());
        assert!(engine.default_font().is_some());
        engine.shutdown(0);

        // flag off: the glue part is dropped, nothing is loaded
        let engine = Engine::headless(quiet_cfg()).unwrap();
        assert!(engine.font.is_none());
        assert!(engine.default_font().is_none());
        engine.shutdown(0);
    }

    #[test]
    fn modality_toggle_pauses_scene() {
        let mut engine = Engine::headless(quiet_cfg()).unwrap();
        let mut scene = Scene::new(&engine.bus);

        engine.bus.send(Message::command(CommandMsg {
            flags: CommandFlags::TOGGLE_MODALITY,
            ..CommandMsg::default()
        }));
        engine.frame(&mut scene, &mut NoHooks);
        assert!(scene.is_paused());

        engine.bus.send(Message::command(CommandMsg {
            flags: CommandFlags::TOGGLE_MODALITY,
            ..CommandMsg::default()
        }));
        engine.frame(&mut scene, &mut NoHooks);
        assert!(!scene.is_paused());
    }

    #[test]
    fn exit_cleanup_runs_in_reverse() {
        use std::{cell::RefCell, rc::Rc};

        let engine = Engine::headless(quiet_cfg());
        let mut engine = engine.unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));
        for name in ["first", "second"] {
            let order = order.clone();
            engine.at_exit(move |_| order.borrow_mut().push(name));
        }
        engine.shutdown(0);
        assert_eq!(*order.borrow(), vec!["second", "first"]);
    }
}
