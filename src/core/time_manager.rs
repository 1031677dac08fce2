//! Der maßgebliche Zeitzustand der Anwendung.
//!
//! Der `TimeManager` besitzt die primären aktiven Zeitspannen (die
//! "aktuell angezeigte Zeit"), sekundäre Constraint-Spannen je Schlüssel,
//! die Fade-Einstellung und die je Quelle angeforderten Datendauern.
//! Vier Listener-Kategorien werden benachrichtigt; die Kategorie der
//! aktiven Spannen asynchron über einen zusammenfassenden Dispatcher.
//!
//! Jede Mutation läuft vollständig unter der Operations-Sperre des
//! Managers. Eine Mutation aus einem synchron aufgerufenen Listener
//! heraus schlägt sofort mit [`TimeError::ReentrantChange`] fehl.

use super::duration::Duration;
use super::error::TimeError;
use super::fade::Fade;
use super::time_span::{TimeSpan, TimeSpanList};
use crate::shared::{ChangeLock, CoalescingDispatcher, ListenerRegistry};
use indexmap::{IndexMap, IndexSet};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Reservierter Constraint-Schlüssel, der für alle Kontexte gilt.
/// Seine Spannen werden bei jedem schlüssel-spezifischen Lesen vereinigt.
pub const WILDCARD_CONSTRAINT_KEY: &str = "*";

/// Bis zu dieser Gesamtausdehnung ist die Mindest-Ladedauer 1 Tag,
/// darüber 1 Woche.
const SMALL_EXTENT_LIMIT_MILLIS: i64 = 27 * 86_400_000;

// ── Listener-Kategorien ─────────────────────────────────────────────

/// Asynchron (zusammenfassend) benachrichtigter Abonnent der aktiven Spannen.
pub trait ActiveTimeSpanChangeListener: Send + Sync {
    fn active_time_spans_changed(&self, snapshot: &ActiveTimeSpans);
}

/// Synchron benachrichtigter Abonnent der primären Spannen.
pub trait PrimaryTimeSpanChangeListener: Send + Sync {
    fn primary_time_spans_changed(&self, spans: &TimeSpanList);

    fn primary_time_spans_cleared(&self) {}
}

/// Abonnent der abgeleiteten Daten-Ladedauer.
pub trait DataLoadDurationChangeListener: Send + Sync {
    fn data_load_duration_changed(&self, duration: &Duration);
}

/// Abonnent der effektiven Schnittmenge der angeforderten Datendauern.
pub trait RequestedDataDurationsChangeListener: Send + Sync {
    fn requested_data_durations_changed(&self, durations: &[Duration]);
}

/// Konsistenter Schnappschuss des aktiven Zeitzustands.
#[derive(Debug, Clone)]
pub struct ActiveTimeSpans {
    pub primary: TimeSpanList,
    pub secondary: IndexMap<String, Vec<TimeSpan>>,
    /// Vorzeichen der letzten Änderungs-Richtung (-1, 0, +1).
    pub direction: i8,
    pub fade: Option<Fade>,
}

// ── Manager ─────────────────────────────────────────────────────────

struct TimeState {
    primary: TimeSpanList,
    secondary: IndexMap<String, Vec<TimeSpan>>,
    fade: Option<Fade>,
    requested: IndexMap<String, IndexSet<Duration>>,
    load_duration: Option<Duration>,
    last_direction: i8,
}

impl Default for TimeState {
    fn default() -> Self {
        Self {
            primary: TimeSpanList::default(),
            secondary: IndexMap::new(),
            fade: None,
            requested: IndexMap::new(),
            load_duration: None,
            last_direction: 0,
        }
    }
}

pub struct TimeManager {
    change_lock: ChangeLock,
    state: Mutex<TimeState>,
    active_listeners: Arc<ListenerRegistry<dyn ActiveTimeSpanChangeListener>>,
    primary_listeners: ListenerRegistry<dyn PrimaryTimeSpanChangeListener>,
    load_duration_listeners: ListenerRegistry<dyn DataLoadDurationChangeListener>,
    requested_listeners: ListenerRegistry<dyn RequestedDataDurationsChangeListener>,
    dispatcher: CoalescingDispatcher<ActiveTimeSpans>,
}

impl TimeManager {
    pub fn new() -> Self {
        let active_listeners: Arc<ListenerRegistry<dyn ActiveTimeSpanChangeListener>> =
            Arc::new(ListenerRegistry::new());
        let dispatch_registry = Arc::clone(&active_listeners);
        let dispatcher = CoalescingDispatcher::new("time-update", move |snapshot: ActiveTimeSpans| {
            dispatch_registry.notify(|listener| listener.active_time_spans_changed(&snapshot));
        });

        Self {
            change_lock: ChangeLock::new(),
            state: Mutex::new(TimeState::default()),
            active_listeners,
            primary_listeners: ListenerRegistry::new(),
            load_duration_listeners: ListenerRegistry::new(),
            requested_listeners: ListenerRegistry::new(),
            dispatcher,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Primäre Spannen ─────────────────────────────────────────────

    /// Ersetzt die primären Spannen durch eine einzelne Spanne.
    pub fn set_primary_active_time_span(&self, span: TimeSpan) -> Result<bool, TimeError> {
        self.set_primary_active_time_spans(vec![span])
    }

    /// Ersetzt die primären Spannen. No-op bei Wert-Gleichheit, Fehler
    /// bei leerer Eingabe oder bei Aufruf aus einer laufenden Änderung.
    ///
    /// Reihenfolge der Effekte: Richtungs-Vorzeichen merken, bei
    /// geänderter Gesamtausdehnung die Ladedauer neu ableiten und deren
    /// Listener benachrichtigen, dann die Primär-Listener, zuletzt die
    /// aktiven Spannen asynchron über den Dispatcher.
    pub fn set_primary_active_time_spans(
        &self,
        spans: Vec<TimeSpan>,
    ) -> Result<bool, TimeError> {
        if spans.is_empty() {
            return Err(TimeError::EmptyPrimarySpans);
        }
        // Wert-Gleichheit zuerst: ein No-op braucht keinen Änderungszyklus
        if self.lock_state().primary.as_slice() == spans.as_slice() {
            return Ok(false);
        }

        let _change = self
            .change_lock
            .begin()
            .map_err(|_| TimeError::ReentrantChange)?;

        let new_list = TimeSpanList::new(spans)?;
        let (duration_change, snapshot) = {
            let mut state = self.lock_state();
            if state.primary == new_list {
                return Ok(false);
            }

            match new_list.primary().cmp(&state.primary.primary()) {
                Ordering::Greater => state.last_direction = 1,
                Ordering::Less => state.last_direction = -1,
                Ordering::Equal => {}
            }

            let old_extent = state.primary.extent_millis();
            state.primary = new_list.clone();
            let duration_change = if state.primary.extent_millis() != old_extent {
                Self::recompute_load_duration_locked(&mut state)
            } else {
                None
            };
            (duration_change, Self::snapshot_locked(&state))
        };

        if let Some(duration) = duration_change {
            self.load_duration_listeners
                .notify(|listener| listener.data_load_duration_changed(&duration));
        }
        self.primary_listeners
            .notify(|listener| listener.primary_time_spans_changed(&new_list));
        self.dispatcher.submit(snapshot);
        Ok(true)
    }

    /// Setzt die primären Spannen auf die ZERO-Spanne zurück und leert
    /// alle sekundären Spannen. Benachrichtigt nur bei echter Änderung.
    pub fn clear_active_time_spans(&self) -> Result<bool, TimeError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| TimeError::ReentrantChange)?;

        let (primary_changed, secondary_changed, duration_change, snapshot) = {
            let mut state = self.lock_state();
            let cleared = TimeSpanList::default();
            let primary_changed = state.primary != cleared;
            let secondary_changed = !state.secondary.is_empty();
            if !primary_changed && !secondary_changed {
                return Ok(false);
            }

            let mut duration_change = None;
            if primary_changed {
                state.primary = cleared;
                duration_change = Self::recompute_load_duration_locked(&mut state);
            }
            state.secondary.clear();
            (
                primary_changed,
                secondary_changed,
                duration_change,
                Self::snapshot_locked(&state),
            )
        };

        if let Some(duration) = duration_change {
            self.load_duration_listeners
                .notify(|listener| listener.data_load_duration_changed(&duration));
        }
        if primary_changed {
            self.primary_listeners
                .notify(|listener| listener.primary_time_spans_cleared());
        }
        if primary_changed || secondary_changed {
            self.dispatcher.submit(snapshot);
        }
        Ok(true)
    }

    // ── Sekundäre Spannen ───────────────────────────────────────────

    /// Setzt die Spannen eines Constraint-Schlüssels. Eine leere Liste
    /// entfernt den Schlüssel vollständig.
    pub fn set_secondary_active_time_spans(
        &self,
        key: &str,
        spans: Vec<TimeSpan>,
    ) -> Result<bool, TimeError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| TimeError::ReentrantChange)?;

        let snapshot = {
            let mut state = self.lock_state();
            let changed = if spans.is_empty() {
                state.secondary.shift_remove(key).is_some()
            } else if state.secondary.get(key) == Some(&spans) {
                false
            } else {
                state.secondary.insert(key.to_string(), spans);
                true
            };
            if !changed {
                return Ok(false);
            }
            Self::snapshot_locked(&state)
        };

        self.dispatcher.submit(snapshot);
        Ok(true)
    }

    /// Entfernt eine konkrete Spanne aus allen Constraint-Schlüsseln.
    /// Leer werdende Schlüssel verschwinden aus der Map.
    pub fn remove_secondary_active_time_span(&self, span: &TimeSpan) -> Result<bool, TimeError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| TimeError::ReentrantChange)?;

        let snapshot = {
            let mut state = self.lock_state();
            let mut changed = false;
            state.secondary.retain(|_, spans| {
                let before = spans.len();
                spans.retain(|candidate| candidate != span);
                if spans.len() != before {
                    changed = true;
                }
                !spans.is_empty()
            });
            if !changed {
                return Ok(false);
            }
            Self::snapshot_locked(&state)
        };

        self.dispatcher.submit(snapshot);
        Ok(true)
    }

    /// Entfernt alle Spannen eines Constraint-Schlüssels.
    pub fn remove_secondary_active_time_spans(&self, key: &str) -> Result<bool, TimeError> {
        self.set_secondary_active_time_spans(key, Vec::new())
    }

    // ── Fade ────────────────────────────────────────────────────────

    /// Ersetzt die Fade-Einstellung. No-op bei Wert-Gleichheit.
    pub fn set_fade(&self, fade: Option<Fade>) -> Result<bool, TimeError> {
        if self.lock_state().fade == fade {
            return Ok(false);
        }

        let _change = self
            .change_lock
            .begin()
            .map_err(|_| TimeError::ReentrantChange)?;

        let snapshot = {
            let mut state = self.lock_state();
            if state.fade == fade {
                return Ok(false);
            }
            state.fade = fade;
            Self::snapshot_locked(&state)
        };

        self.dispatcher.submit(snapshot);
        Ok(true)
    }

    // ── Angeforderte Datendauern ────────────────────────────────────

    /// Registriert die akzeptierten Datendauern einer Quelle. Schlägt
    /// fehl wenn die Schnittmenge über alle Quellen dadurch leer würde;
    /// in dem Fall wird nichts verändert.
    pub fn request_data_durations(
        &self,
        source: &str,
        durations: &[Duration],
    ) -> Result<(), TimeError> {
        if durations.is_empty() {
            return Err(TimeError::EmptyDurationRequest);
        }

        let _change = self
            .change_lock
            .begin()
            .map_err(|_| TimeError::ReentrantChange)?;

        let (new_effective, duration_change) = {
            let mut state = self.lock_state();
            let new_set: IndexSet<Duration> = durations.iter().copied().collect();

            // Schnittmenge vorab prüfen: keine Teilmutation bei Fehler
            let intersection_empty = !new_set.iter().any(|candidate| {
                state
                    .requested
                    .iter()
                    .filter(|(existing, _)| existing.as_str() != source)
                    .all(|(_, set)| set.contains(candidate))
            });
            if intersection_empty {
                return Err(TimeError::EmptyDurationIntersection);
            }

            let old_effective = Self::effective_durations(&state.requested);
            state.requested.insert(source.to_string(), new_set);
            let new_effective = Self::effective_durations(&state.requested);
            if new_effective == old_effective {
                return Ok(());
            }
            let duration_change = Self::recompute_load_duration_locked(&mut state);
            (new_effective, duration_change)
        };

        self.requested_listeners
            .notify(|listener| listener.requested_data_durations_changed(&new_effective));
        if let Some(duration) = duration_change {
            self.load_duration_listeners
                .notify(|listener| listener.data_load_duration_changed(&duration));
        }
        Ok(())
    }

    /// Entfernt die Registrierung einer Quelle.
    pub fn release_data_duration_request(&self, source: &str) -> Result<bool, TimeError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| TimeError::ReentrantChange)?;

        let (new_effective, duration_change) = {
            let mut state = self.lock_state();
            let old_effective = Self::effective_durations(&state.requested);
            if state.requested.shift_remove(source).is_none() {
                return Ok(false);
            }
            let new_effective = Self::effective_durations(&state.requested);
            if new_effective == old_effective {
                return Ok(true);
            }
            let duration_change = Self::recompute_load_duration_locked(&mut state);
            (new_effective, duration_change)
        };

        self.requested_listeners
            .notify(|listener| listener.requested_data_durations_changed(&new_effective));
        if let Some(duration) = duration_change {
            self.load_duration_listeners
                .notify(|listener| listener.data_load_duration_changed(&duration));
        }
        Ok(true)
    }

    // ── Accessoren ──────────────────────────────────────────────────

    pub fn primary_active_time_spans(&self) -> TimeSpanList {
        self.lock_state().primary.clone()
    }

    /// Spannen eines Constraint-Schlüssels, vereinigt mit den
    /// Wildcard-Spannen.
    pub fn secondary_active_time_spans(&self, key: &str) -> Vec<TimeSpan> {
        let state = self.lock_state();
        let mut result: Vec<TimeSpan> = Vec::new();
        if key != WILDCARD_CONSTRAINT_KEY {
            if let Some(spans) = state.secondary.get(WILDCARD_CONSTRAINT_KEY) {
                result.extend(spans.iter().copied());
            }
        }
        if let Some(spans) = state.secondary.get(key) {
            for span in spans {
                if !result.contains(span) {
                    result.push(*span);
                }
            }
        }
        result
    }

    pub fn secondary_active_time_span_map(&self) -> IndexMap<String, Vec<TimeSpan>> {
        self.lock_state().secondary.clone()
    }

    pub fn fade(&self) -> Option<Fade> {
        self.lock_state().fade
    }

    pub fn data_load_duration(&self) -> Option<Duration> {
        self.lock_state().load_duration
    }

    /// Effektive Schnittmenge der angeforderten Datendauern über alle
    /// Quellen.
    pub fn requested_data_durations(&self) -> Vec<Duration> {
        Self::effective_durations(&self.lock_state().requested)
    }

    /// Vorzeichen der letzten Primär-Änderung (-1, 0, +1).
    pub fn last_change_direction(&self) -> i8 {
        self.lock_state().last_direction
    }

    /// Konsistenter Schnappschuss aus primären und sekundären Spannen,
    /// Richtungs-Vorzeichen und Fade.
    pub fn active_time_spans(&self) -> ActiveTimeSpans {
        Self::snapshot_locked(&self.lock_state())
    }

    // ── Listener-Registrierung ──────────────────────────────────────

    pub fn add_active_time_span_listener(
        &self,
        listener: &Arc<dyn ActiveTimeSpanChangeListener>,
    ) {
        self.active_listeners.add(listener);
    }

    pub fn remove_active_time_span_listener(
        &self,
        listener: &Arc<dyn ActiveTimeSpanChangeListener>,
    ) {
        self.active_listeners.remove(listener);
    }

    pub fn add_primary_time_span_listener(
        &self,
        listener: &Arc<dyn PrimaryTimeSpanChangeListener>,
    ) {
        self.primary_listeners.add(listener);
    }

    pub fn remove_primary_time_span_listener(
        &self,
        listener: &Arc<dyn PrimaryTimeSpanChangeListener>,
    ) {
        self.primary_listeners.remove(listener);
    }

    pub fn add_data_load_duration_listener(
        &self,
        listener: &Arc<dyn DataLoadDurationChangeListener>,
    ) {
        self.load_duration_listeners.add(listener);
    }

    pub fn remove_data_load_duration_listener(
        &self,
        listener: &Arc<dyn DataLoadDurationChangeListener>,
    ) {
        self.load_duration_listeners.remove(listener);
    }

    pub fn add_requested_data_durations_listener(
        &self,
        listener: &Arc<dyn RequestedDataDurationsChangeListener>,
    ) {
        self.requested_listeners.add(listener);
    }

    pub fn remove_requested_data_durations_listener(
        &self,
        listener: &Arc<dyn RequestedDataDurationsChangeListener>,
    ) {
        self.requested_listeners.remove(listener);
    }

    // ── Interne Ableitungen ─────────────────────────────────────────

    fn snapshot_locked(state: &TimeState) -> ActiveTimeSpans {
        ActiveTimeSpans {
            primary: state.primary.clone(),
            secondary: state.secondary.clone(),
            direction: state.last_direction,
            fade: state.fade,
        }
    }

    fn effective_durations(requested: &IndexMap<String, IndexSet<Duration>>) -> Vec<Duration> {
        let mut sources = requested.values();
        let Some(first) = sources.next() else {
            return Vec::new();
        };
        first
            .iter()
            .filter(|candidate| requested.values().all(|set| set.contains(*candidate)))
            .copied()
            .collect()
    }

    /// Leitet die Ladedauer neu ab. Liefert den neuen Wert, wenn er sich
    /// geändert hat und gesetzt ist.
    fn recompute_load_duration_locked(state: &mut TimeState) -> Option<Duration> {
        let candidates = Self::effective_durations(&state.requested);
        let selected =
            Self::select_load_duration(&candidates, state.primary.extent_millis());
        if selected != state.load_duration {
            state.load_duration = selected;
            selected
        } else {
            None
        }
    }

    /// Kleinste registrierte Dauer, die mindestens die ausdehnungs-
    /// abhängige Schwelle erreicht; sonst die größte verfügbare.
    /// Kandidaten mit inkompatibler Einheit qualifizieren sich nicht.
    fn select_load_duration(candidates: &[Duration], extent_millis: i64) -> Option<Duration> {
        let threshold = if extent_millis <= SMALL_EXTENT_LIMIT_MILLIS {
            Duration::days(1)
        } else {
            Duration::weeks(1)
        };

        let mut qualifying: Option<Duration> = None;
        let mut largest: Option<Duration> = None;
        for candidate in candidates {
            match candidate.try_cmp(&threshold) {
                Ok(Ordering::Less) => {}
                Ok(_) => {
                    qualifying = Some(match qualifying {
                        None => *candidate,
                        Some(best) => match candidate.try_cmp(&best) {
                            Ok(Ordering::Less) => *candidate,
                            _ => best,
                        },
                    });
                }
                Err(_) => continue,
            }
            largest = Some(match largest {
                None => *candidate,
                Some(big) => match candidate.try_cmp(&big) {
                    Ok(Ordering::Greater) => *candidate,
                    _ => big,
                },
            });
        }
        qualifying.or(largest)
    }
}

impl Default for TimeManager {
    fn default() -> Self {
        Self::new()
    }
}
