use anyhow::{bail, Result};
use crossterm::event::{self, Event, KeyEventKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::controls::{stepped_width, ControlAction, ControlSurface};
use crate::core::config::AppConfig;
use crate::core::session::{Session, TickOutcome};
use crate::decoder::{ScaledSurface, VideoSource};
use crate::renderer::{DisplayManager, OutputSink, StreamSink};
use crate::shared::constants;
use crate::sync::FrameTicker;
use crate::utils::logger;

/// Fixed seed when configured, entropy otherwise.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn new_session(config: &AppConfig) -> Result<Session<StdRng>> {
    let resolution = config.resolution();
    let surface = ScaledSurface::new(resolution.width, resolution.height);
    Session::new(config, Box::new(surface), make_rng(config.seed))
}

/// Full-screen live view until the user quits or the source fails.
pub fn run_live(config: &AppConfig, mut source: Box<dyn VideoSource>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        logger::warn(&format!("Ctrl-C handler not installed: {}", e));
    }

    let mut session = new_session(config)?;
    let mut controls = ControlSurface::new(config.width_step);
    let mut ticker = FrameTicker::new(config.max_fps);
    let mut display = DisplayManager::new()?;

    session.start(source.as_mut())?;
    display.show_status(&session.status_line())?;
    logger::info(&format!(
        "Live view started: {} @ {:.0}fps cap",
        session.resolution(),
        config.max_fps
    ));

    let mut failure = None;
    while running.load(Ordering::SeqCst) {
        let mut status_dirty = false;
        let mut quit = false;

        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            let Some(action) = controls.handle_key(key) else {
                continue;
            };
            status_dirty = true;
            session.set_notice(None);

            match action {
                ControlAction::Quit => {
                    quit = true;
                    break;
                }
                ControlAction::TogglePause => session.toggle_pause(source.as_mut()),
                ControlAction::ApplyWidth(width) => session.change_resolution(width, source.as_mut()),
                ControlAction::StepWidth(delta) => {
                    let width = stepped_width(session.resolution().width, delta);
                    session.change_resolution(width, source.as_mut());
                }
                ControlAction::ToggleColor => session.toggle_color(),
                ControlAction::ToggleAxis => session.toggle_axis(),
                ControlAction::ToggleFlicker => session.toggle_flicker(),
                ControlAction::InputChanged => {}
                ControlAction::Rejected(err) => {
                    logger::debug(&format!("Rejected width input: {:?}", err));
                    session.set_notice(Some(err.to_string()));
                }
            }
            session.set_input(controls.input());
        }
        if quit {
            break;
        }

        if let Some(err) = session.poll_source(source.as_mut(), &mut display)? {
            failure = Some(err);
            break;
        }

        let outcome = session.tick(source.as_mut(), &mut display)?;
        if status_dirty && outcome != TickOutcome::Rendered {
            display.show_status(&session.status_line())?;
        }

        ticker.wait_for_next_frame();
    }

    session.shutdown(source.as_mut());
    let stats = ticker.stats();
    logger::info(&format!(
        "Live view ended ({:?}): {} frames, {} ticks, {:.1}/{:.0} ticks/s, {} resyncs",
        session.lifecycle(),
        session.frame_counter(),
        stats.ticks,
        stats.effective_fps(),
        stats.target_fps,
        stats.resyncs
    ));

    if let Some(err) = failure {
        if std::io::stdout().is_terminal() {
            wait_for_dismiss(&running)?;
        }
        drop(display);
        bail!("{}: {}", constants::FATAL_CAPTURE_MESSAGE, err);
    }
    Ok(())
}

/// Leaves the fatal screen up until any key (or Ctrl-C).
fn wait_for_dismiss(running: &AtomicBool) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Renders the first available frame to `out` and returns.
pub fn run_snapshot<W: Write>(config: &AppConfig, mut source: Box<dyn VideoSource>, out: W) -> Result<W> {
    let mut session = new_session(config)?;
    let mut sink = StreamSink::new(out);
    let deadline = Instant::now() + Duration::from_millis(constants::STARTUP_TIMEOUT_MS);

    session.start(source.as_mut())?;
    let result = loop {
        if let Some(err) = session.poll_source(source.as_mut(), &mut sink)? {
            break Err(anyhow::Error::new(err));
        }
        if session.tick(source.as_mut(), &mut sink)? == TickOutcome::Rendered {
            break Ok(());
        }
        if Instant::now() >= deadline {
            break Err(anyhow::anyhow!(
                "no frame within {}ms",
                constants::STARTUP_TIMEOUT_MS
            ));
        }
        std::thread::sleep(Duration::from_millis(5));
    };
    session.shutdown(source.as_mut());

    result?;
    Ok(sink.into_inner())
}
