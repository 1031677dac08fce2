//! Halboffene Zeitintervalle `[start, end)` auf der absoluten Zeitachse.

use super::error::TimeError;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use std::fmt;
use thiserror::Error;

/// Halboffenes Intervall `[start, end)` in UTC, oder die ausgezeichnete
/// ZERO-Spanne (nicht gesetzt). Total geordnet nach Start, dann Ende.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSpan {
    /// Erstellt eine Spanne. Vertauschte Grenzen werden normalisiert.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Die ausgezeichnete ZERO-Spanne (nicht gesetzt).
    pub fn zero() -> Self {
        Self {
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn from_start_duration(start: DateTime<Utc>, duration: TimeDelta) -> Self {
        Self::new(start, start + duration)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn duration_millis(&self) -> i64 {
        self.duration().num_milliseconds()
    }

    /// `true` wenn der Zeitpunkt in `[start, end)` liegt.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Formatiert als ISO-8601-Intervall `start/end` (RFC-3339-Zeitpunkte).
    pub fn to_interval_string(&self) -> String {
        format!(
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    /// Parsed ein ISO-8601-Intervall `start/end`.
    pub fn parse_interval_string(text: &str) -> Result<Self, InvalidTimeSpan> {
        let trimmed = text.trim();
        let (start_text, end_text) = trimmed
            .split_once('/')
            .ok_or_else(|| InvalidTimeSpan(trimmed.to_string()))?;

        let start = DateTime::parse_from_rfc3339(start_text.trim())
            .map_err(|_| InvalidTimeSpan(trimmed.to_string()))?
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339(end_text.trim())
            .map_err(|_| InvalidTimeSpan(trimmed.to_string()))?
            .with_timezone(&Utc);

        Ok(Self::new(start, end))
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_interval_string())
    }
}

/// Text ließ sich nicht als ISO-8601-Intervall lesen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Ungültiges ISO-8601-Intervall: '{0}'")]
pub struct InvalidTimeSpan(pub String);

/// Geordnete, niemals leere Liste von Zeitspannen. Index 0 ist die
/// maßgebliche Spanne für Vergleiche.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpanList {
    spans: Vec<TimeSpan>,
}

impl TimeSpanList {
    /// Erstellt eine Liste. Eine leere Eingabe ist ein Aufruf-Fehler.
    pub fn new(spans: Vec<TimeSpan>) -> Result<Self, TimeError> {
        if spans.is_empty() {
            return Err(TimeError::EmptyPrimarySpans);
        }
        Ok(Self { spans })
    }

    pub fn singleton(span: TimeSpan) -> Self {
        Self { spans: vec![span] }
    }

    /// Die maßgebliche Spanne (Index 0).
    pub fn primary(&self) -> TimeSpan {
        self.spans[0]
    }

    pub fn as_slice(&self) -> &[TimeSpan] {
        &self.spans
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeSpan> {
        self.spans.iter()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Gesamtausdehnung über alle Nicht-ZERO-Spannen in Millisekunden.
    pub fn extent_millis(&self) -> i64 {
        let mut start: Option<DateTime<Utc>> = None;
        let mut end: Option<DateTime<Utc>> = None;
        for span in &self.spans {
            if span.is_zero() {
                continue;
            }
            start = Some(start.map_or(span.start(), |s| s.min(span.start())));
            end = Some(end.map_or(span.end(), |e| e.max(span.end())));
        }
        match (start, end) {
            (Some(s), Some(e)) => (e - s).num_milliseconds(),
            _ => 0,
        }
    }
}

impl Default for TimeSpanList {
    fn default() -> Self {
        Self::singleton(TimeSpan::zero())
    }
}
