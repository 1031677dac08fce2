//! Fehler-Taxonomie des Zeit- und Animationskerns.

use super::duration::InconvertibleUnits;
use thiserror::Error;

/// Fehler des [`TimeManager`](super::TimeManager).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// Mutation aus einem Listener-Callback einer laufenden Mutation heraus.
    #[error("Zeitänderung läuft bereits: verschachtelte Mutation ist nicht erlaubt")]
    ReentrantChange,

    /// Die primären Zeitspannen dürfen niemals leer sein.
    #[error("Die primären Zeitspannen dürfen nicht leer sein")]
    EmptyPrimarySpans,

    /// Eine Dauer-Anforderung muss mindestens eine Dauer enthalten.
    #[error("Es muss mindestens eine Datendauer angefordert werden")]
    EmptyDurationRequest,

    /// Die Anforderung würde die Schnittmenge über alle Quellen leeren.
    #[error("Die Schnittmenge der angeforderten Datendauern wäre leer")]
    EmptyDurationIntersection,

    #[error(transparent)]
    InconvertibleUnits(#[from] InconvertibleUnits),
}

/// Fehler des [`AnimationManager`](super::AnimationManager).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnimationError {
    /// Der übergebene Plan ist nicht mehr der installierte Plan.
    /// Plan-Identität ist das Token der optimistischen Nebenläufigkeit:
    /// veraltete Aufrufer dürfen keinen neueren Plan verschieben.
    #[error("Plan-Mismatch: der übergebene Plan ist nicht der installierte Plan")]
    PlanMismatch,

    /// Mutation aus einem Listener-Callback einer laufenden Mutation heraus.
    #[error("Animationsänderung läuft bereits: verschachtelte Mutation ist nicht erlaubt")]
    ReentrantChange,

    #[error(transparent)]
    Time(#[from] TimeError),
}
