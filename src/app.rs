use crate::chart::ChartLayer;
use crate::config::{load_settings, project_paths, save_settings_atomic, Cli, Settings};
use crate::logging;
use crate::sky::SkyLayer;
use crate::stage::{Layer, LayerId, Stage};
use crate::surface::{Surface, Viewport};
use crate::term::{draw_center_box, draw_text, frame_to_cells, Frame, Terminal};
use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::Color;
use rand::{rngs::StdRng, SeedableRng};
use std::time::{Duration, Instant};

const HELP_LINES: [&str; 7] = [
    "q / Esc   quit",
    "space     pause",
    "s         toggle sky layer",
    "w         toggle chart lines",
    "r         regenerate",
    "u         toggle status line",
    "h         close help",
];

pub(crate) struct App {
    settings: Settings,
    term: Terminal,
    stage: Stage,
    rng: StdRng,
    sky: Option<LayerId>,
    chart: Option<LayerId>,
    paused: bool,
    show_help: bool,
    should_quit: bool,
    fps_smooth: f32,
}

impl App {
    fn init(settings: Settings) -> anyhow::Result<Self> {
        let mut rng = if settings.seed != 0 {
            StdRng::seed_from_u64(settings.seed)
        } else {
            StdRng::from_entropy()
        };

        let term = Terminal::begin().context("entering the alternate screen")?;
        let viewport = Viewport {
            cols: term.cols,
            rows: term.rows,
        };
        let mut stage = Stage::new(settings.clone(), viewport);

        let sky = if settings.scene.wants_sky() {
            stage.mount(Box::new(SkyLayer::new()), &mut rng)
        } else {
            None
        };
        let chart = if settings.scene.wants_chart() {
            stage.mount(Box::new(ChartLayer::new()), &mut rng)
        } else {
            None
        };

        Ok(Self {
            settings,
            term,
            stage,
            rng,
            sky,
            chart,
            paused: false,
            show_help: false,
            should_quit: false,
            fps_smooth: 0.0,
        })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let fps = self.settings.fps_cap.clamp(10, 240);
        let frame_dt = Duration::from_secs_f32(1.0 / fps as f32);
        let mut last = Instant::now();

        while !self.should_quit {
            let started = Instant::now();
            self.handle_events()?;
            if self.should_quit {
                break;
            }

            if !self.paused {
                self.stage.run_frame(&mut self.rng);
            }
            self.render()?;

            let dt = started.saturating_duration_since(last).as_secs_f32();
            last = started;
            if dt > 0.0 {
                let inst = 1.0 / dt;
                self.fps_smooth = if self.fps_smooth == 0.0 {
                    inst
                } else {
                    self.fps_smooth * 0.9 + inst * 0.1
                };
            }

            spin_sleep(frame_dt, started);
        }
        Ok(())
    }

    fn handle_events(&mut self) -> anyhow::Result<()> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => match k.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        self.should_quit = true;
                        return Ok(());
                    }
                    KeyCode::Char(' ') => self.paused = !self.paused,
                    KeyCode::Char('h') | KeyCode::Char('H') => self.show_help = !self.show_help,
                    KeyCode::Char('u') | KeyCode::Char('U') => {
                        self.settings.show_hud = !self.settings.show_hud
                    }
                    KeyCode::Char('s') | KeyCode::Char('S') => {
                        let current = self.sky;
                        self.sky = self.toggle(current, || Box::new(SkyLayer::new()));
                    }
                    KeyCode::Char('w') | KeyCode::Char('W') => {
                        let current = self.chart;
                        self.chart = self.toggle(current, || Box::new(ChartLayer::new()));
                    }
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        let vp = self.stage.viewport();
                        self.stage.resize(vp, &mut self.rng);
                    }
                    _ => {}
                },
                Event::Resize(cols, rows) => {
                    self.term.resize(cols, rows);
                    self.stage.resize(Viewport { cols, rows }, &mut self.rng);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn toggle(
        &mut self,
        current: Option<LayerId>,
        make: impl FnOnce() -> Box<dyn Layer>,
    ) -> Option<LayerId> {
        match current {
            Some(id) => {
                self.stage.unmount(id);
                None
            }
            None => {
                let layer: Box<dyn Layer> = make();
                self.stage.mount(layer, &mut self.rng)
            }
        }
    }

    fn render(&mut self) -> anyhow::Result<()> {
        let (cols, rows) = (self.term.cols, self.term.rows);
        let ratio = Surface::measure(Viewport { cols, rows }, &self.settings)
            .map(|s| s.pixel_ratio)
            .unwrap_or(1.0);

        let mut frame = Frame::new(cols, rows, ratio);
        for (canvas, opacity) in self.stage.canvases() {
            frame.composite(canvas, opacity);
        }
        frame_to_cells(&frame, ratio, &mut self.term.cur);

        if self.settings.show_hud {
            let mut parts = vec!["skyscene".to_string()];
            parts.extend(self.stage.statuses());
            parts.push(format!(
                "sky:{} chart:{}",
                on_off(self.sky.is_some()),
                on_off(self.chart.is_some())
            ));
            if self.paused {
                parts.push("paused".to_string());
            }
            parts.push(format!("fps:{:.0}", self.fps_smooth));
            parts.push("(h help)".to_string());
            let hud = parts.join("  ");
            draw_text(&mut self.term.cur, 0, 0, &hud, Color::DarkGrey, Color::Black);
        }

        if self.show_help {
            draw_center_box(&mut self.term.cur, "skyscene", &HELP_LINES);
        }

        self.term.present()
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

pub(crate) fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = project_paths()?;
    logging::init(&paths.log_path, cli.log)?;

    let mut settings = load_settings(&paths.settings_path);
    settings.apply_cli(&cli);
    if cli.save_settings {
        save_settings_atomic(&paths.settings_path, &settings)?;
        tracing::info!(path = %paths.settings_path.display(), "settings saved");
    }

    let mut app = App::init(settings)?;
    let res = app.run();
    let restored = app.term.end();
    if let Err(e) = &res {
        tracing::error!(error = %e, "main loop failed");
    }
    res.and(restored)
}

/* -----------------------------
   Frame pacing helper
------------------------------ */

fn spin_sleep(target: Duration, now: Instant) {
    let end = now + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        let left = end - t;
        if left > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}
