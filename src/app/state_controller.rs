//! Sichern und Wiederherstellen des Manager-Zustands über das
//! Session-Dokument. Läuft ausschließlich über den öffentlichen
//! Vertrag der Manager.

use crate::core::{
    AnimationManager, AnimationPlan, ContinuousAnimationPlan, DefaultAnimationPlan, Direction,
    Duration, Fade, TimeManager, TimeSpan, WILDCARD_CONSTRAINT_KEY,
};
use crate::shared::options::{FALLBACK_MILLIS_PER_FRAME, MIN_MILLIS_PER_FRAME};
use crate::xml::{AnimationSessionState, PlayState, TimeSessionState};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// Übersetzt den Zustand des [`TimeManager`] von und zum Session-Dokument.
pub struct TimeManagerStateController {
    manager: Arc<TimeManager>,
}

impl TimeManagerStateController {
    pub fn new(manager: Arc<TimeManager>) -> Self {
        Self { manager }
    }

    /// Liest den aktuellen Zustand in die Dokument-Form aus.
    pub fn save_state(&self) -> TimeSessionState {
        let primary = self.manager.primary_active_time_spans().primary();
        let mut held = Vec::new();
        for (key, spans) in self.manager.secondary_active_time_span_map() {
            let constraint = if key == WILDCARD_CONSTRAINT_KEY {
                None
            } else {
                Some(key.clone())
            };
            for span in spans {
                held.push((constraint.clone(), span));
            }
        }

        TimeSessionState {
            primary: if primary.is_zero() { None } else { Some(primary) },
            held,
            fade: self
                .manager
                .fade()
                .map(|fade| (fade.fade_in(), fade.fade_out())),
        }
    }

    /// Stellt den Zustand aus der Dokument-Form wieder her. Bestehende
    /// sekundäre Spannen werden ersetzt.
    pub fn restore_state(&self, state: &TimeSessionState) -> Result<()> {
        match state.primary {
            Some(span) => {
                self.manager
                    .set_primary_active_time_span(span)
                    .context("Primaere Spanne konnte nicht gesetzt werden")?;
            }
            None => {
                self.manager
                    .clear_active_time_spans()
                    .context("Zeitspannen konnten nicht geleert werden")?;
            }
        }

        for key in self.manager.secondary_active_time_span_map().keys() {
            self.manager
                .remove_secondary_active_time_spans(key)
                .context("Alte sekundaere Spannen konnten nicht entfernt werden")?;
        }

        let mut grouped: IndexMap<String, Vec<TimeSpan>> = IndexMap::new();
        for (constraint, span) in &state.held {
            let key = constraint
                .clone()
                .unwrap_or_else(|| WILDCARD_CONSTRAINT_KEY.to_string());
            grouped.entry(key).or_default().push(*span);
        }
        for (key, spans) in grouped {
            self.manager
                .set_secondary_active_time_spans(&key, spans)
                .with_context(|| format!("Gehaltene Spannen fuer '{key}' nicht gesetzt"))?;
        }

        let fade = state
            .fade
            .map(|(fade_in, fade_out)| Fade::new(fade_in, fade_out));
        self.manager
            .set_fade(fade)
            .context("Fade konnte nicht gesetzt werden")?;
        Ok(())
    }
}

/// Übersetzt den Zustand des [`AnimationManager`] von und zum
/// Session-Dokument.
pub struct AnimationManagerStateController {
    manager: Arc<AnimationManager>,
}

impl AnimationManagerStateController {
    pub fn new(manager: Arc<AnimationManager>) -> Self {
        Self { manager }
    }

    pub fn save_state(&self) -> AnimationSessionState {
        let plan = self.manager.current_plan();
        let play_state = if self.manager.is_playing() {
            match self.manager.animation_state().map(|state| state.direction()) {
                Some(Direction::Backward) => PlayState::Reverse,
                _ => PlayState::Forward,
            }
        } else {
            PlayState::Stop
        };

        let millis_per_frame = self
            .manager
            .change_rate()
            .as_millis()
            .unwrap_or(FALLBACK_MILLIS_PER_FRAME as i64)
            .max(0) as u64;

        let sequence = plan
            .as_ref()
            .map(|plan| plan.animation_sequence())
            .unwrap_or_default();
        let advance_duration = plan.as_ref().and_then(|plan| plan.advance_duration());
        let loop_interval = if advance_duration.is_some() {
            sequence.first().copied()
        } else {
            None
        };

        AnimationSessionState {
            play_state,
            millis_per_frame,
            loop_behavior: plan
                .as_ref()
                .map(|plan| plan.loop_behavior())
                .unwrap_or_default(),
            loop_interval,
            advance_duration,
            sequence,
        }
    }

    /// Stellt Plan, Tickrate und Abspielzustand wieder her.
    ///
    /// Frame-Dauern von höchstens 1 ms sind aus alten Dokumenten bekannt
    /// und werden mit Warnung auf 500 ms gesetzt. Ein Dokument mit
    /// Vorschub-Dauer beschreibt einen kontinuierlichen Plan; dessen
    /// Sequenz wird zu einer Gesamtspanne zusammengefasst.
    pub fn restore_state(&self, state: &AnimationSessionState) -> Result<()> {
        let millis_per_frame = if state.millis_per_frame < MIN_MILLIS_PER_FRAME {
            log::warn!(
                "Unbrauchbare Frame-Dauer {} ms im Dokument, verwende {} ms",
                state.millis_per_frame,
                FALLBACK_MILLIS_PER_FRAME
            );
            FALLBACK_MILLIS_PER_FRAME
        } else {
            state.millis_per_frame
        };
        let rate = Duration::millis(millis_per_frame as i64);

        let plan: Option<Arc<dyn AnimationPlan>> = if let Some(advance) = state.advance_duration {
            let loop_span = combine_sequence(&state.sequence).or(state.loop_interval);
            match loop_span {
                Some(loop_span) => {
                    let window = state
                        .sequence
                        .first()
                        .map(|span| Duration::millis(span.duration_millis()))
                        .unwrap_or(advance);
                    let plan = ContinuousAnimationPlan::new(loop_span, window, advance)
                        .context("Kontinuierlicher Plan nicht herstellbar")?;
                    Some(Arc::new(plan))
                }
                None => None,
            }
        } else if !state.sequence.is_empty() {
            Some(Arc::new(DefaultAnimationPlan::new(
                state.sequence.clone(),
                state.loop_behavior,
            )))
        } else {
            None
        };

        match plan {
            Some(plan) => {
                let direction = match state.play_state {
                    PlayState::Forward => Some(Direction::Forward),
                    PlayState::Reverse => Some(Direction::Backward),
                    PlayState::Stop => None,
                };
                self.manager
                    .set_plan(plan, None, direction, Some(rate))
                    .context("Plan aus Dokument nicht installierbar")?;
            }
            None => {
                self.manager
                    .abandon_plan()
                    .context("Bestehender Plan nicht verwerfbar")?;
                self.manager
                    .set_change_rate(rate)
                    .context("Tickrate nicht uebernommen")?;
            }
        }
        Ok(())
    }
}

/// Gesamtspanne über alle Nicht-ZERO-Spannen einer Sequenz.
fn combine_sequence(spans: &[TimeSpan]) -> Option<TimeSpan> {
    let mut start = None;
    let mut end = None;
    for span in spans {
        if span.is_zero() {
            continue;
        }
        start = Some(match start {
            None => span.start(),
            Some(existing) if span.start() < existing => span.start(),
            Some(existing) => existing,
        });
        end = Some(match end {
            None => span.end(),
            Some(existing) if span.end() > existing => span.end(),
            Some(existing) => existing,
        });
    }
    match (start, end) {
        (Some(start), Some(end)) => Some(TimeSpan::new(start, end)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_combine_sequence_spans_overall_range() {
        let first = TimeSpan::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).single().expect("gültig"),
            Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).single().expect("gültig"),
        );
        let second = TimeSpan::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).single().expect("gültig"),
            Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).single().expect("gültig"),
        );

        let combined = combine_sequence(&[first, second]).expect("Spanne erwartet");
        assert_eq!(combined.start(), second.start());
        assert_eq!(combined.end(), first.end());
    }

    #[test]
    fn test_combine_sequence_skips_zero_spans() {
        assert!(combine_sequence(&[TimeSpan::zero()]).is_none());
        assert!(combine_sequence(&[]).is_none());
    }
}
