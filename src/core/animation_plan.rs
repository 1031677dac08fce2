//! Animationspläne: Schrittfolgen über Zeitspannen mit Loop-Verhalten.

use super::animation_state::{AnimationState, Direction};
use super::duration::{Duration, InconvertibleUnits};
use super::time_span::TimeSpan;
use chrono::TimeDelta;
use std::fmt;

/// Verhalten am Ende der Schrittfolge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopBehavior {
    /// Am Ende anhalten.
    #[default]
    Stop,
    /// Am Ende wieder von vorne beginnen.
    Wrap,
    /// Am Ende die Richtung umkehren.
    Bounce,
}

impl LoopBehavior {
    pub fn as_tag(&self) -> &'static str {
        match self {
            LoopBehavior::Stop => "STOP",
            LoopBehavior::Wrap => "WRAP",
            LoopBehavior::Bounce => "BOUNCE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<LoopBehavior> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "STOP" => Some(LoopBehavior::Stop),
            "WRAP" => Some(LoopBehavior::Wrap),
            "BOUNCE" => Some(LoopBehavior::Bounce),
            _ => None,
        }
    }
}

/// Vertrag eines Animationsplans.
///
/// Ein Plan bildet Zustände auf konkrete Zeitspannen ab und kennt seine
/// eigene Schritt-Logik. Das Ende eines Plans ohne Loop liefert `None`.
pub trait AnimationPlan: Send + Sync + fmt::Debug {
    /// Sucht den Zustand, dessen Fenster zur gegebenen Spanne passt.
    fn find_state(&self, span: &TimeSpan, direction: Direction) -> Option<AnimationState>;

    /// Nächster Zustand in der Richtung des übergebenen Zustands.
    fn determine_next_state(&self, state: &AnimationState) -> Option<AnimationState>;

    /// Konkrete Zeitspanne eines Zustands.
    fn time_span_for_state(&self, state: &AnimationState) -> TimeSpan;

    fn initial_state(&self) -> Option<AnimationState>;

    fn final_state(&self) -> Option<AnimationState>;

    fn is_empty_plan(&self) -> bool;

    /// `true` wenn Schritte auf die Listener-Bereitschaft warten sollen.
    fn is_using_processing_timeout(&self) -> bool;

    /// Die Schrittfolge des Plans für Persistenz und Anzeige.
    fn animation_sequence(&self) -> Vec<TimeSpan>;

    fn loop_behavior(&self) -> LoopBehavior;

    /// Fenster-Vorschub, sofern der Plan kontinuierlich arbeitet.
    fn advance_duration(&self) -> Option<Duration>;
}

// ── Diskreter Plan ──────────────────────────────────────────────────

/// Plan über eine feste, sortierte Folge von Zeitspannen.
#[derive(Debug, Clone)]
pub struct DefaultAnimationPlan {
    sequence: Vec<TimeSpan>,
    loop_behavior: LoopBehavior,
}

impl DefaultAnimationPlan {
    pub fn new(mut sequence: Vec<TimeSpan>, loop_behavior: LoopBehavior) -> Self {
        sequence.sort();
        Self {
            sequence,
            loop_behavior,
        }
    }

    fn state_at(&self, index: usize, direction: Direction) -> Option<AnimationState> {
        self.sequence
            .get(index)
            .map(|span| AnimationState::new(index as u32, *span, direction))
    }
}

impl AnimationPlan for DefaultAnimationPlan {
    fn find_state(&self, span: &TimeSpan, direction: Direction) -> Option<AnimationState> {
        // Exakter Treffer vor Enthaltensein des Startzeitpunkts
        let index = self
            .sequence
            .iter()
            .position(|candidate| candidate == span)
            .or_else(|| {
                self.sequence
                    .iter()
                    .position(|candidate| candidate.contains(span.start()))
            })?;
        self.state_at(index, direction)
    }

    fn determine_next_state(&self, state: &AnimationState) -> Option<AnimationState> {
        if self.sequence.is_empty() {
            return None;
        }
        let last = self.sequence.len() - 1;
        let index = state.step() as usize;

        match state.direction() {
            Direction::Forward => {
                if index < last {
                    self.state_at(index + 1, Direction::Forward)
                } else {
                    match self.loop_behavior {
                        LoopBehavior::Stop => None,
                        LoopBehavior::Wrap => self.state_at(0, Direction::Forward),
                        LoopBehavior::Bounce => {
                            if last == 0 {
                                None
                            } else {
                                self.state_at(last - 1, Direction::Backward)
                            }
                        }
                    }
                }
            }
            Direction::Backward => {
                if index > 0 {
                    self.state_at(index - 1, Direction::Backward)
                } else {
                    match self.loop_behavior {
                        LoopBehavior::Stop => None,
                        LoopBehavior::Wrap => self.state_at(last, Direction::Backward),
                        LoopBehavior::Bounce => {
                            if last == 0 {
                                None
                            } else {
                                self.state_at(1, Direction::Forward)
                            }
                        }
                    }
                }
            }
        }
    }

    fn time_span_for_state(&self, state: &AnimationState) -> TimeSpan {
        self.sequence
            .get(state.step() as usize)
            .copied()
            .unwrap_or_else(|| state.window())
    }

    fn initial_state(&self) -> Option<AnimationState> {
        self.state_at(0, Direction::Forward)
    }

    fn final_state(&self) -> Option<AnimationState> {
        if self.sequence.is_empty() {
            return None;
        }
        self.state_at(self.sequence.len() - 1, Direction::Forward)
    }

    fn is_empty_plan(&self) -> bool {
        self.sequence.is_empty()
    }

    fn is_using_processing_timeout(&self) -> bool {
        // Diskrete Schritte warten auf Render-Bereitschaft
        true
    }

    fn animation_sequence(&self) -> Vec<TimeSpan> {
        self.sequence.clone()
    }

    fn loop_behavior(&self) -> LoopBehavior {
        self.loop_behavior
    }

    fn advance_duration(&self) -> Option<Duration> {
        None
    }
}

// ── Kontinuierlicher Plan ───────────────────────────────────────────

/// Plan mit festem Fenster, das innerhalb einer Loop-Spanne um einen
/// Vorschub wandert und am Ende immer umbricht.
#[derive(Debug, Clone)]
pub struct ContinuousAnimationPlan {
    loop_span: TimeSpan,
    window: Duration,
    advance: Duration,
    window_millis: i64,
    advance_millis: i64,
}

impl ContinuousAnimationPlan {
    /// Fenster und Vorschub müssen feste Einheiten tragen.
    pub fn new(
        loop_span: TimeSpan,
        window: Duration,
        advance: Duration,
    ) -> Result<Self, InconvertibleUnits> {
        let window_millis = window.as_millis()?.max(1);
        let advance_millis = advance.as_millis()?.max(1);
        Ok(Self {
            loop_span,
            window,
            advance,
            window_millis,
            advance_millis,
        })
    }

    pub fn loop_span(&self) -> TimeSpan {
        self.loop_span
    }

    fn step_count(&self) -> i64 {
        let loop_millis = self.loop_span.duration_millis();
        if loop_millis <= 0 {
            return 0;
        }
        (loop_millis + self.advance_millis - 1) / self.advance_millis
    }

    fn state_at(&self, step: i64, direction: Direction) -> Option<AnimationState> {
        let count = self.step_count();
        if step < 0 || step >= count {
            return None;
        }
        let start = self.loop_span.start() + TimeDelta::milliseconds(step * self.advance_millis);
        let window = TimeSpan::from_start_duration(start, TimeDelta::milliseconds(self.window_millis));
        Some(AnimationState::new(step as u32, window, direction))
    }
}

impl AnimationPlan for ContinuousAnimationPlan {
    fn find_state(&self, span: &TimeSpan, direction: Direction) -> Option<AnimationState> {
        if self.is_empty_plan() || !self.loop_span.contains(span.start()) {
            return None;
        }
        let offset = (span.start() - self.loop_span.start()).num_milliseconds();
        let step = (offset / self.advance_millis).clamp(0, self.step_count() - 1);
        self.state_at(step, direction)
    }

    fn determine_next_state(&self, state: &AnimationState) -> Option<AnimationState> {
        let count = self.step_count();
        if count == 0 {
            return None;
        }
        let step = state.step() as i64;
        let next = match state.direction() {
            Direction::Forward => {
                if step + 1 >= count {
                    0
                } else {
                    step + 1
                }
            }
            Direction::Backward => {
                if step == 0 {
                    count - 1
                } else {
                    step - 1
                }
            }
        };
        self.state_at(next, state.direction())
    }

    fn time_span_for_state(&self, state: &AnimationState) -> TimeSpan {
        self.state_at(state.step() as i64, state.direction())
            .map(|resolved| resolved.window())
            .unwrap_or_else(|| state.window())
    }

    fn initial_state(&self) -> Option<AnimationState> {
        self.state_at(0, Direction::Forward)
    }

    fn final_state(&self) -> Option<AnimationState> {
        let count = self.step_count();
        if count == 0 {
            return None;
        }
        self.state_at(count - 1, Direction::Forward)
    }

    fn is_empty_plan(&self) -> bool {
        self.loop_span.is_zero() || self.loop_span.duration_millis() <= 0
    }

    fn is_using_processing_timeout(&self) -> bool {
        // Kontinuierlicher Vorschub wartet nicht auf Abonnenten
        false
    }

    fn animation_sequence(&self) -> Vec<TimeSpan> {
        // Persistiert wird die Gesamtspanne, nicht jedes Fenster
        vec![self.loop_span]
    }

    fn loop_behavior(&self) -> LoopBehavior {
        LoopBehavior::Wrap
    }

    fn advance_duration(&self) -> Option<Duration> {
        Some(self.advance)
    }
}

impl ContinuousAnimationPlan {
    pub fn window_duration(&self) -> Duration {
        self.window
    }
}
