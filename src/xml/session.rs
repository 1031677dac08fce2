//! Datenstrukturen des persistierten Session-Dokuments.

use crate::core::{Duration, LoopBehavior, TimeSpan};

/// Abspielzustand im persistierten Dokument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stop,
    Forward,
    Reverse,
}

impl PlayState {
    pub fn as_tag(&self) -> &'static str {
        match self {
            PlayState::Stop => "STOP",
            PlayState::Forward => "FORWARD",
            PlayState::Reverse => "REVERSE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<PlayState> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "STOP" => Some(PlayState::Stop),
            // PLAY ist der historische Alias fuer FORWARD
            "FORWARD" | "PLAY" => Some(PlayState::Forward),
            "REVERSE" => Some(PlayState::Reverse),
            _ => None,
        }
    }
}

/// Persistierter Zeitzustand: primäre Spanne, gehaltene Spannen mit
/// optionalem Constraint-Schlüssel, Fade-Dauern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSessionState {
    pub primary: Option<TimeSpan>,
    pub held: Vec<(Option<String>, TimeSpan)>,
    pub fade: Option<(Duration, Duration)>,
}

/// Persistierter Animationszustand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationSessionState {
    pub play_state: PlayState,
    pub millis_per_frame: u64,
    pub loop_behavior: LoopBehavior,
    pub loop_interval: Option<TimeSpan>,
    pub advance_duration: Option<Duration>,
    pub sequence: Vec<TimeSpan>,
}

/// Vollständiges Session-Dokument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub time: TimeSessionState,
    pub animation: AnimationSessionState,
}
