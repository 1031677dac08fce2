//! TerraView Time Player.
//!
//! Headless-Abspieler für persistierte Sessions: lädt ein
//! Session-Dokument, stellt Zeit- und Animationszustand wieder her und
//! treibt die Animation eine feste Anzahl Schritte weit. Gedacht zum
//! Prüfen von Session-Dateien ohne laufenden Viewer.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use terraview_time_engine::{
    parse_session_state, AnimationManagerStateController, PrimaryTimeSpanChangeListener,
    TimeManagerStateController, TimeSpanList, Toolbox,
};

fn main() -> Result<()> {
    PlayerRunner::run()
}

struct PlayerRunner;

impl PlayerRunner {
    fn run() -> Result<()> {
        // Logger initialisieren
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();

        log::info!(
            "TerraView Time Player v{} startet...",
            env!("CARGO_PKG_VERSION")
        );

        let mut args = std::env::args().skip(1);
        let session_path = args
            .next()
            .context("Aufruf: TerraView-TimePlayer <session.xml> [schritte]")?;
        let steps: usize = match args.next() {
            Some(text) => text
                .parse()
                .with_context(|| format!("Ungueltige Schrittzahl: '{text}'"))?,
            None => 10,
        };

        let toolbox = Toolbox::from_config_file();

        let printer: Arc<dyn PrimaryTimeSpanChangeListener> = Arc::new(SpanPrinter {
            seen: AtomicUsize::new(0),
        });
        toolbox.time_manager.add_primary_time_span_listener(&printer);

        let content = std::fs::read_to_string(&session_path)
            .with_context(|| format!("Session-Datei nicht lesbar: {session_path}"))?;
        let session = parse_session_state(&content)?;

        TimeManagerStateController::new(Arc::clone(&toolbox.time_manager))
            .restore_state(&session.time)?;
        AnimationManagerStateController::new(Arc::clone(&toolbox.animation_manager))
            .restore_state(&session.animation)?;

        let Some(plan) = toolbox.animation_manager.current_plan() else {
            log::warn!("Dokument enthält keinen Animationsplan, nichts abzuspielen");
            return Ok(());
        };

        // Automatisches Abspielen anhalten und deterministisch schreiten
        toolbox.animation_manager.pause(&plan)?;
        for _ in 0..steps {
            if !toolbox.animation_manager.step_next(&plan, false)? {
                log::info!("Planende erreicht");
                break;
            }
        }

        log::info!("Fertig, Session abgespielt: {session_path}");
        Ok(())
    }
}

/// Schreibt jede Primär-Änderung ins Log.
struct SpanPrinter {
    seen: AtomicUsize,
}

impl PrimaryTimeSpanChangeListener for SpanPrinter {
    fn primary_time_spans_changed(&self, spans: &TimeSpanList) {
        let count = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("[{count:03}] Anzeigezeit: {}", spans.primary());
    }

    fn primary_time_spans_cleared(&self) {
        log::info!("Anzeigezeit geleert");
    }
}
