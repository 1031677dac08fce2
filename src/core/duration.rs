//! Dauern mit Einheit (Millisekunden bis Jahre) und ISO-8601-Round-Trip.
//!
//! Feste Einheiten (Millisekunden bis Wochen) sind über Millisekunden
//! ineinander umrechenbar. Monate und Jahre sind Kalender-Einheiten mit
//! variabler Länge und nur untereinander vergleichbar. Ein Vergleich über
//! die Familien-Grenze hinweg schlägt mit [`InconvertibleUnits`] fehl.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use thiserror::Error;

/// Einheit einer [`Duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    /// Millisekunden pro Einheit. Nur für feste Einheiten definiert.
    fn millis_factor(self) -> Option<i64> {
        match self {
            TimeUnit::Milliseconds => Some(1),
            TimeUnit::Seconds => Some(1_000),
            TimeUnit::Minutes => Some(60_000),
            TimeUnit::Hours => Some(3_600_000),
            TimeUnit::Days => Some(86_400_000),
            TimeUnit::Weeks => Some(604_800_000),
            TimeUnit::Months | TimeUnit::Years => None,
        }
    }

    /// Monate pro Einheit. Nur für Kalender-Einheiten definiert.
    fn months_factor(self) -> Option<i64> {
        match self {
            TimeUnit::Months => Some(1),
            TimeUnit::Years => Some(12),
            _ => None,
        }
    }
}

/// Vergleich zweier Dauern über inkompatible Einheiten-Familien.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Dauern in {left:?} und {right:?} sind nicht ineinander umrechenbar")]
pub struct InconvertibleUnits {
    pub left: TimeUnit,
    pub right: TimeUnit,
}

/// Kanonische Darstellung für Vergleich und Hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Canonical {
    Millis(i64),
    Months(i64),
}

/// Vorzeichenbehaftete Dauer mit fester Einheit. Immutabel.
#[derive(Debug, Clone, Copy)]
pub struct Duration {
    magnitude: i64,
    unit: TimeUnit,
}

impl Duration {
    pub fn new(magnitude: i64, unit: TimeUnit) -> Self {
        Self { magnitude, unit }
    }

    pub fn millis(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Milliseconds)
    }

    pub fn seconds(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Seconds)
    }

    pub fn minutes(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Minutes)
    }

    pub fn hours(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Hours)
    }

    pub fn days(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Days)
    }

    pub fn weeks(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Weeks)
    }

    pub fn months(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Months)
    }

    pub fn years(magnitude: i64) -> Self {
        Self::new(magnitude, TimeUnit::Years)
    }

    pub fn magnitude(&self) -> i64 {
        self.magnitude
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    fn canonical(&self) -> Canonical {
        if let Some(factor) = self.unit.millis_factor() {
            Canonical::Millis(self.magnitude.saturating_mul(factor))
        } else if let Some(factor) = self.unit.months_factor() {
            Canonical::Months(self.magnitude.saturating_mul(factor))
        } else {
            // Alle Einheiten gehören genau einer Familie an
            Canonical::Millis(0)
        }
    }

    /// Gesamtdauer in Millisekunden. Schlägt für Kalender-Einheiten fehl.
    pub fn as_millis(&self) -> Result<i64, InconvertibleUnits> {
        self.unit
            .millis_factor()
            .map(|factor| self.magnitude.saturating_mul(factor))
            .ok_or(InconvertibleUnits {
                left: self.unit,
                right: TimeUnit::Milliseconds,
            })
    }

    /// Konvertiert in eine `std::time::Duration` (negativ wird zu 0 geklemmt).
    pub fn to_std(&self) -> Result<std::time::Duration, InconvertibleUnits> {
        let millis = self.as_millis()?;
        Ok(std::time::Duration::from_millis(millis.max(0) as u64))
    }

    /// Vergleicht zwei Dauern. `Err` wenn die Einheiten-Familien inkompatibel sind.
    pub fn try_cmp(&self, other: &Duration) -> Result<Ordering, InconvertibleUnits> {
        match (self.canonical(), other.canonical()) {
            (Canonical::Millis(a), Canonical::Millis(b)) => Ok(a.cmp(&b)),
            (Canonical::Months(a), Canonical::Months(b)) => Ok(a.cmp(&b)),
            _ => Err(InconvertibleUnits {
                left: self.unit,
                right: other.unit,
            }),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.magnitude < 0
    }

    /// Serialisiert als ISO-8601-Dauer (`PT5S`, `P1D`, `P2W`, `P3M`, ...).
    /// Millisekunden werden als Sekunden mit Nachkommastellen geschrieben.
    pub fn to_iso8601(&self) -> String {
        let sign = if self.magnitude < 0 { "-" } else { "" };
        let value = self.magnitude.unsigned_abs();
        match self.unit {
            TimeUnit::Milliseconds => {
                if value % 1_000 == 0 {
                    format!("{}PT{}S", sign, value / 1_000)
                } else {
                    format!("{}PT{}.{:03}S", sign, value / 1_000, value % 1_000)
                }
            }
            TimeUnit::Seconds => format!("{}PT{}S", sign, value),
            TimeUnit::Minutes => format!("{}PT{}M", sign, value),
            TimeUnit::Hours => format!("{}PT{}H", sign, value),
            TimeUnit::Days => format!("{}P{}D", sign, value),
            TimeUnit::Weeks => format!("{}P{}W", sign, value),
            TimeUnit::Months => format!("{}P{}M", sign, value),
            TimeUnit::Years => format!("{}P{}Y", sign, value),
        }
    }

    /// Parsed eine ISO-8601-Dauer. Einzelne Komponenten behalten ihre
    /// Einheit; mehrere feste Komponenten werden zu Millisekunden summiert.
    pub fn parse_iso8601(text: &str) -> Result<Self, InvalidDuration> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(
                r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.(\d{1,3}))?S)?)?$",
            )
            .expect("ISO-8601-Regex ist ein gueltiges Literal")
        });

        let trimmed = text.trim();
        let captures = pattern
            .captures(trimmed)
            .ok_or_else(|| InvalidDuration(trimmed.to_string()))?;

        let negative = captures.get(1).is_some();
        let group = |index: usize| -> Option<i64> {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse::<i64>().ok())
        };

        let years = group(2);
        let months = group(3);
        let weeks = group(4);
        let days = group(5);
        let hours = group(6);
        let minutes = group(7);
        let seconds = group(8);
        let millis_fraction = captures
            .get(9)
            .map(|m| {
                let digits = m.as_str();
                // Auf Millisekunden auffüllen ("5" → 500 ms)
                let padded = format!("{digits:0<3}");
                padded.parse::<i64>().unwrap_or(0)
            })
            .unwrap_or(0);

        let has_calendar = years.is_some() || months.is_some();
        let has_fixed = weeks.is_some()
            || days.is_some()
            || hours.is_some()
            || minutes.is_some()
            || seconds.is_some();

        if has_calendar && has_fixed {
            // Gemischte Kalender- und Fest-Komponenten sind nicht abbildbar
            return Err(InvalidDuration(trimmed.to_string()));
        }
        if !has_calendar && !has_fixed {
            return Err(InvalidDuration(trimmed.to_string()));
        }

        let apply_sign = |value: i64| if negative { -value } else { value };

        if has_calendar {
            let total_months =
                years.unwrap_or(0).saturating_mul(12) + months.unwrap_or(0);
            return Ok(match (years, months) {
                (Some(y), None) => Duration::years(apply_sign(y)),
                (None, Some(m)) => Duration::months(apply_sign(m)),
                _ => Duration::months(apply_sign(total_months)),
            });
        }

        // Einzelne feste Komponente behält ihre Einheit
        let components = [
            (weeks, TimeUnit::Weeks),
            (days, TimeUnit::Days),
            (hours, TimeUnit::Hours),
            (minutes, TimeUnit::Minutes),
            (seconds, TimeUnit::Seconds),
        ];
        let present: Vec<(i64, TimeUnit)> = components
            .iter()
            .filter_map(|(value, unit)| value.map(|v| (v, *unit)))
            .collect();

        if present.len() == 1 && millis_fraction == 0 {
            let (value, unit) = present[0];
            return Ok(Duration::new(apply_sign(value), unit));
        }

        let mut total_millis = millis_fraction;
        for (value, unit) in &present {
            let factor = unit.millis_factor().unwrap_or(1);
            total_millis += value.saturating_mul(factor);
        }
        Ok(Duration::millis(apply_sign(total_millis)))
    }
}

/// Text ließ sich nicht als ISO-8601-Dauer lesen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Ungültige ISO-8601-Dauer: '{0}'")]
pub struct InvalidDuration(pub String);

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Duration {}

impl Hash for Duration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.canonical() {
            Canonical::Millis(value) => {
                0u8.hash(state);
                value.hash(state);
            }
            Canonical::Months(value) => {
                1u8.hash(state);
                value.hash(state);
            }
        }
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_iso8601())
    }
}
