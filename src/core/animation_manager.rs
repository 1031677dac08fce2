//! Abspiel-Zustandsmaschine über einem installierten Animationsplan.
//!
//! Der `AnimationManager` treibt genau einen aktiven [`AnimationPlan`]
//! über einen periodischen Ticker und schiebt die Spanne jedes neuen
//! Zustands als primäre aktive Zeit in den [`TimeManager`]. Das ist die
//! einzige Brücke vom Animationszustand in den globalen Zeitzustand.
//!
//! Plan-Identität ist das Token der optimistischen Nebenläufigkeit:
//! jeder öffentliche Mutator verlangt eine Referenz auf den aktuell
//! installierten Plan und schlägt mit
//! [`AnimationError::PlanMismatch`] fehl, wenn sie veraltet ist.

use super::animation_plan::AnimationPlan;
use super::animation_state::{AnimationState, Direction};
use super::duration::Duration;
use super::error::AnimationError;
use super::time_manager::{PrimaryTimeSpanChangeListener, TimeManager};
use super::time_span::{TimeSpan, TimeSpanList};
use crate::shared::options::DEFAULT_CHANGE_RATE_MS;
use crate::shared::{
    spawn_fixed_delay, ChangeLock, EngineOptions, ListenerRegistry, PhasedChangeListener,
    PhasedChangeSupport, Ticker,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Abonnent der Animations-Lebenszyklus-Ereignisse.
pub trait AnimationChangeListener: Send + Sync {
    fn animation_started(&self, _direction: Direction) {}

    fn animation_stopped(&self) {}

    fn animation_rate_changed(&self, _rate: &Duration) {}

    fn animation_plan_established(&self, _plan: &Arc<dyn AnimationPlan>) {}

    fn animation_plan_cancelled(&self) {}
}

/// Richtungswahl eines Schritt-Aufrufs.
enum StepDirection {
    /// In der aktuellen Richtung weiter.
    Current,
    /// Entgegen der aktuellen Richtung.
    Opposite,
    /// Feste Richtung unabhängig vom Zustand.
    Fixed(Direction),
}

struct AnimationManagerState {
    plan: Option<Arc<dyn AnimationPlan>>,
    animation_state: Option<AnimationState>,
    ticker: Option<Ticker>,
    change_rate: Duration,
    /// Unterdrückt verschachtelte `set_plan`-Aufrufe während eines
    /// laufenden Planwechsels.
    ignore_plan_changes: bool,
}

impl AnimationManagerState {
    fn new(change_rate: Duration) -> Self {
        Self {
            plan: None,
            animation_state: None,
            ticker: None,
            change_rate,
            ignore_plan_changes: false,
        }
    }
}

pub struct AnimationManager {
    time_manager: Arc<TimeManager>,
    options: EngineOptions,
    change_lock: ChangeLock,
    state: Mutex<AnimationManagerState>,
    listeners: ListenerRegistry<dyn AnimationChangeListener>,
    phased: PhasedChangeSupport,
    weak_self: Weak<AnimationManager>,
    /// Hält den Abgleich-Listener am Leben; die Registry des
    /// TimeManager referenziert ihn nur schwach.
    resync: Arc<PrimarySpanResync>,
}

impl AnimationManager {
    /// Erstellt den Manager und abonniert die Primär-Änderungen des
    /// TimeManager für die gesamte Lebensdauer.
    pub fn new(time_manager: Arc<TimeManager>, options: EngineOptions) -> Arc<Self> {
        let change_rate = Duration::millis(options.change_rate_ms as i64);
        let manager = Arc::new_cyclic(|weak: &Weak<AnimationManager>| Self {
            time_manager,
            options,
            change_lock: ChangeLock::new(),
            state: Mutex::new(AnimationManagerState::new(change_rate)),
            listeners: ListenerRegistry::new(),
            phased: PhasedChangeSupport::new(),
            weak_self: weak.clone(),
            resync: Arc::new(PrimarySpanResync { manager: weak.clone() }),
        });

        let listener: Arc<dyn PrimaryTimeSpanChangeListener> = manager.resync.clone();
        manager.time_manager.add_primary_time_span_listener(&listener);
        manager
    }

    fn lock_state(&self) -> MutexGuard<'_, AnimationManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Plan-Lebenszyklus ───────────────────────────────────────────

    /// Installiert einen neuen Plan und leitet den Animationszustand ab:
    /// `init_state` falls gegeben; sonst der Endzustand des Plans wenn
    /// noch kein Zustand existierte; sonst der Zustand zur aktuellen
    /// primären Spanne in bisheriger Richtung, ersatzweise der nach
    /// Startdatum nächstgelegene, ersatzweise der Anfangszustand.
    ///
    /// `direction` startet anschließend das Abspielen, `change_rate`
    /// setzt vorher die Tickrate. Fehler daraus werden geloggt, nicht
    /// propagiert: der soeben gesetzte Plan ist per Definition aktuell.
    pub fn set_plan(
        &self,
        plan: Arc<dyn AnimationPlan>,
        init_state: Option<AnimationState>,
        direction: Option<Direction>,
        change_rate: Option<Duration>,
    ) -> Result<(), AnimationError> {
        // Verschachtelter Aufruf aus einem Listener des laufenden
        // Planwechsels wird unterdrückt, nicht als Fehler gemeldet
        if self.lock_state().ignore_plan_changes && self.change_lock.held_by_current_thread() {
            log::debug!("Planwechsel unterdrückt: es läuft bereits einer");
            return Ok(());
        }

        let change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;

        let (had_old, old_ticker, prior_state) = {
            let mut state = self.lock_state();
            state.ignore_plan_changes = true;
            let had_old = state.plan.take().is_some();
            (had_old, state.ticker.take(), state.animation_state)
        };

        if let Some(ticker) = old_ticker {
            ticker.cancel();
        }
        if had_old {
            self.listeners.notify(|listener| listener.animation_stopped());
            self.listeners
                .notify(|listener| listener.animation_plan_cancelled());
        }

        let new_state = match (init_state, prior_state) {
            (Some(state), _) => Some(state),
            (None, None) => plan.final_state(),
            (None, Some(prior)) => {
                let current_span = self.time_manager.primary_active_time_spans().primary();
                plan.find_state(&current_span, prior.direction())
                    .or_else(|| {
                        Self::nearest_state_by_start(plan.as_ref(), &current_span, prior.direction())
                    })
                    .or_else(|| plan.initial_state())
            }
        };

        {
            let mut state = self.lock_state();
            state.plan = Some(Arc::clone(&plan));
            state.animation_state = new_state;
            state.ignore_plan_changes = false;
        }
        self.listeners
            .notify(|listener| listener.animation_plan_established(&plan));

        // Rate und Abspielstart laufen außerhalb der Operations-Sperre
        drop(change);
        if let Some(rate) = change_rate {
            if let Err(e) = self.set_change_rate(rate) {
                log::error!("Tickrate nach Planwechsel nicht übernommen: {e}");
            }
        }
        if let Some(direction) = direction {
            if let Err(e) = self.play(&plan, direction) {
                log::error!("Abspielen nach Planwechsel fehlgeschlagen: {e}");
            }
        }
        Ok(())
    }

    /// Verwirft den aktuellen Plan: Ticker stoppen, Plan entfernen,
    /// Stopp- und Abbruch-Benachrichtigung feuern.
    pub fn abandon_plan(&self) -> Result<(), AnimationError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;

        let (had_plan, ticker) = {
            let mut state = self.lock_state();
            (state.plan.take().is_some(), state.ticker.take())
        };
        if let Some(ticker) = ticker {
            ticker.cancel();
        }
        if had_plan {
            self.listeners.notify(|listener| listener.animation_stopped());
            self.listeners
                .notify(|listener| listener.animation_plan_cancelled());
        }
        Ok(())
    }

    // ── Abspielen ───────────────────────────────────────────────────

    /// Startet das Abspielen in der gewünschten Richtung. Kehrt bei
    /// Bedarf den Zustand um. Startet den Ticker nur, wenn nicht schon
    /// gespielt wird.
    pub fn play(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        direction: Direction,
    ) -> Result<(), AnimationError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;

        let started = {
            let mut state = self.lock_state();
            Self::validate_plan(&state, plan)?;
            if let Some(current) = state.animation_state {
                if current.direction() != direction {
                    state.animation_state = Some(current.reverse());
                }
            }
            if state.ticker.is_none() {
                self.start_ticker_locked(&mut state);
                true
            } else {
                false
            }
        };

        if started {
            self.listeners
                .notify(|listener| listener.animation_started(direction));
        }
        Ok(())
    }

    /// Pausiert das Abspielen. Die Stopp-Benachrichtigung feuert auch
    /// dann, wenn bereits pausiert war.
    pub fn pause(&self, plan: &Arc<dyn AnimationPlan>) -> Result<(), AnimationError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;

        let ticker = {
            let mut state = self.lock_state();
            Self::validate_plan(&state, plan)?;
            state.ticker.take()
        };
        if let Some(ticker) = ticker {
            ticker.cancel();
        }
        self.listeners.notify(|listener| listener.animation_stopped());
        Ok(())
    }

    // ── Schritte ────────────────────────────────────────────────────

    /// Ein Schritt in der aktuellen Richtung weiter.
    pub fn step_next(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        wait_for_listeners: bool,
    ) -> Result<bool, AnimationError> {
        self.directed_step(plan, wait_for_listeners, StepDirection::Current)
    }

    /// Ein Schritt entgegen der aktuellen Richtung.
    pub fn step_previous(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        wait_for_listeners: bool,
    ) -> Result<bool, AnimationError> {
        self.directed_step(plan, wait_for_listeners, StepDirection::Opposite)
    }

    /// Ein Schritt vorwärts, unabhängig von der aktuellen Richtung.
    pub fn step_forward(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        wait_for_listeners: bool,
    ) -> Result<bool, AnimationError> {
        self.directed_step(
            plan,
            wait_for_listeners,
            StepDirection::Fixed(Direction::Forward),
        )
    }

    /// Ein Schritt rückwärts, unabhängig von der aktuellen Richtung.
    pub fn step_backward(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        wait_for_listeners: bool,
    ) -> Result<bool, AnimationError> {
        self.directed_step(
            plan,
            wait_for_listeners,
            StepDirection::Fixed(Direction::Backward),
        )
    }

    /// Springt direkt zum Anfangszustand des Plans.
    pub fn step_first(&self, plan: &Arc<dyn AnimationPlan>) -> Result<bool, AnimationError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;
        {
            let state = self.lock_state();
            Self::validate_plan(&state, plan)?;
        }
        match plan.initial_state() {
            Some(state) => self.commit_state(plan, state, false),
            None => Ok(false),
        }
    }

    /// Springt direkt zum Endzustand des Plans.
    pub fn step_last(&self, plan: &Arc<dyn AnimationPlan>) -> Result<bool, AnimationError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;
        {
            let state = self.lock_state();
            Self::validate_plan(&state, plan)?;
        }
        match plan.final_state() {
            Some(state) => self.commit_state(plan, state, false),
            None => Ok(false),
        }
    }

    /// Springt zum Zustand der übergebenen Spanne. Richtung: vorwärts
    /// wenn die Spanne nicht vor der aktuellen primären liegt. Ein
    /// laufender Ticker wird genau einmal gestoppt und neu gestartet.
    pub fn jump_to_step(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        step: TimeSpan,
        wait_for_listeners: bool,
    ) -> Result<bool, AnimationError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;

        let current_state = {
            let state = self.lock_state();
            Self::validate_plan(&state, plan)?;
            state.animation_state
        };

        let current_span = self.time_manager.primary_active_time_spans().primary();
        let direction = if step >= current_span {
            Direction::Forward
        } else {
            Direction::Backward
        };

        let Some(found) = plan.find_state(&step, direction) else {
            return Ok(false);
        };
        if let Some(current) = current_state {
            if current.same_position(&found) {
                return Ok(false);
            }
        }

        let running_ticker = {
            let mut state = self.lock_state();
            state.ticker.take()
        };
        let was_playing = running_ticker.is_some();
        if let Some(ticker) = running_ticker {
            ticker.cancel();
            self.listeners.notify(|listener| listener.animation_stopped());
        }

        let changed = self.commit_state(plan, found, wait_for_listeners)?;

        if was_playing {
            {
                let mut state = self.lock_state();
                self.start_ticker_locked(&mut state);
            }
            self.listeners
                .notify(|listener| listener.animation_started(direction));
        }
        Ok(changed)
    }

    // ── Tickrate ────────────────────────────────────────────────────

    /// Setzt die Tickrate. Ein laufender Ticker wird mit der neuen Rate
    /// neu aufgezogen, ohne Start/Stopp-Benachrichtigungen.
    pub fn set_change_rate(&self, rate: Duration) -> Result<(), AnimationError> {
        // Nur feste Einheiten ergeben eine Tick-Periode
        rate.to_std().map_err(super::error::TimeError::from)?;

        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;

        let changed = {
            let mut state = self.lock_state();
            if state.change_rate == rate {
                false
            } else {
                state.change_rate = rate;
                if let Some(ticker) = state.ticker.take() {
                    ticker.cancel();
                    self.start_ticker_locked(&mut state);
                }
                true
            }
        };

        if changed {
            self.listeners
                .notify(|listener| listener.animation_rate_changed(&rate));
        }
        Ok(())
    }

    // ── Accessoren ──────────────────────────────────────────────────

    pub fn animation_state(&self) -> Option<AnimationState> {
        self.lock_state().animation_state
    }

    pub fn current_plan(&self) -> Option<Arc<dyn AnimationPlan>> {
        self.lock_state().plan.clone()
    }

    pub fn change_rate(&self) -> Duration {
        self.lock_state().change_rate
    }

    pub fn is_playing(&self) -> bool {
        self.lock_state().ticker.is_some()
    }

    pub fn is_plan_established(&self) -> bool {
        self.lock_state().plan.is_some()
    }

    // ── Listener-Registrierung ──────────────────────────────────────

    pub fn add_animation_change_listener(&self, listener: &Arc<dyn AnimationChangeListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_animation_change_listener(&self, listener: &Arc<dyn AnimationChangeListener>) {
        self.listeners.remove(listener);
    }

    /// Abonniert den dreiphasigen Zeitwechsel (prepare/pre-commit/commit).
    pub fn add_phased_change_listener(&self, listener: &Arc<dyn PhasedChangeListener>) {
        self.phased.add(listener);
    }

    pub fn remove_phased_change_listener(&self, listener: &Arc<dyn PhasedChangeListener>) {
        self.phased.remove(listener);
    }

    // ── Interna ─────────────────────────────────────────────────────

    fn validate_plan(
        state: &AnimationManagerState,
        plan: &Arc<dyn AnimationPlan>,
    ) -> Result<(), AnimationError> {
        match &state.plan {
            Some(installed) if Arc::ptr_eq(installed, plan) => Ok(()),
            _ => Err(AnimationError::PlanMismatch),
        }
    }

    fn directed_step(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        wait_for_listeners: bool,
        choice: StepDirection,
    ) -> Result<bool, AnimationError> {
        let _change = self
            .change_lock
            .begin()
            .map_err(|_| AnimationError::ReentrantChange)?;

        let current = {
            let state = self.lock_state();
            Self::validate_plan(&state, plan)?;
            state.animation_state
        };

        let Some(current) = current else {
            // Ohne Zustand beginnt der Schritt am Plananfang
            return match plan.initial_state() {
                Some(state) => self.commit_state(plan, state, wait_for_listeners),
                None => Ok(false),
            };
        };

        let requested = match choice {
            StepDirection::Current => current.direction(),
            StepDirection::Opposite => current.direction().opposite(),
            StepDirection::Fixed(direction) => direction,
        };
        let from = if current.direction() == requested {
            current
        } else {
            current.reverse()
        };
        self.do_step(plan, from, wait_for_listeners)
    }

    /// Gemeinsamer Schritt-Kern: nächsten Zustand erfragen und
    /// übernehmen. Kein nächster Zustand bedeutet reguläres Planende.
    fn do_step(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        from: AnimationState,
        wait_for_listeners: bool,
    ) -> Result<bool, AnimationError> {
        match plan.determine_next_state(&from) {
            Some(next) => self.commit_state(plan, next, wait_for_listeners),
            None => {
                let ticker = self.lock_state().ticker.take();
                if let Some(ticker) = ticker {
                    ticker.cancel();
                }
                self.listeners.notify(|listener| listener.animation_stopped());
                Ok(false)
            }
        }
    }

    /// Übernimmt einen neuen Animationszustand.
    ///
    /// Ein leerer Plan hat keine gültige Position: die primäre Zeit wird
    /// auf ZERO gezwungen und kein Zustand aufgezeichnet. Sonst läuft
    /// optional das dreiphasige Bereitschafts-Protokoll; bei Veto oder
    /// Timeout bleibt alles beim Alten (`Ok(false)`). Bei Erfolg wird
    /// der Zustand aufgezeichnet und die Spanne des Plans als primäre
    /// aktive Zeit gesetzt.
    fn commit_state(
        &self,
        plan: &Arc<dyn AnimationPlan>,
        new_state: AnimationState,
        wait_for_listeners: bool,
    ) -> Result<bool, AnimationError> {
        if plan.is_empty_plan() {
            let changed = self
                .time_manager
                .set_primary_active_time_span(TimeSpan::zero())?;
            return Ok(changed);
        }

        let span = plan.time_span_for_state(&new_state);
        if wait_for_listeners {
            let timeout = self.options.listener_ready_timeout();
            if !self.phased.update_value(span, timeout) {
                log::error!("Zeitwechsel nach {span} abgelehnt, Zustand bleibt unverändert");
                return Ok(false);
            }
        } else {
            self.phased.commit_now(&span);
        }

        {
            let mut state = self.lock_state();
            state.animation_state = Some(new_state);
        }
        self.time_manager.set_primary_active_time_span(span)?;
        Ok(true)
    }

    fn start_ticker_locked(&self, state: &mut AnimationManagerState) {
        let period = match state.change_rate.to_std() {
            Ok(period) if !period.is_zero() => period,
            _ => std::time::Duration::from_millis(DEFAULT_CHANGE_RATE_MS),
        };
        let weak = self.weak_self.clone();
        match spawn_fixed_delay("animation-ticker", period, move || match weak.upgrade() {
            Some(manager) => manager.tick(),
            None => false,
        }) {
            Ok(ticker) => state.ticker = Some(ticker),
            Err(e) => log::error!("Animations-Ticker konnte nicht starten: {e}"),
        }
    }

    /// Ein Ticker-Durchlauf. `false` beendet den Ticker.
    fn tick(&self) -> bool {
        let Some(plan) = self.current_plan() else {
            return false;
        };
        let wait = plan.is_using_processing_timeout();
        match self.step_next(&plan, wait) {
            Ok(_) => true,
            Err(AnimationError::PlanMismatch) => {
                // Sollte unter korrekter Sperrung nicht auftreten
                log::warn!("Ticker stoppt: der Plan wurde inzwischen ersetzt");
                false
            }
            Err(e) => {
                log::error!("Animationsschritt fehlgeschlagen: {e}");
                false
            }
        }
    }

    /// Sucht den nach Startdatum nächstgelegenen Zustand zur Spanne.
    fn nearest_state_by_start(
        plan: &dyn AnimationPlan,
        span: &TimeSpan,
        direction: Direction,
    ) -> Option<AnimationState> {
        let nearest = plan
            .animation_sequence()
            .into_iter()
            .min_by_key(|candidate| {
                (candidate.start() - span.start()).num_milliseconds().abs()
            })?;
        plan.find_state(&nearest, direction)
    }

    /// Gleicht den Animationszustand an eine von außen gesetzte primäre
    /// Spanne an. Der Ticker bleibt unberührt, außer es existiert kein
    /// passender Zustand im Plan.
    fn resync_to_primary(&self, span: TimeSpan) {
        let (plan, current) = {
            let state = self.lock_state();
            (state.plan.clone(), state.animation_state)
        };
        let Some(plan) = plan else {
            return;
        };

        let current_span = current.map(|state| plan.time_span_for_state(&state));
        let direction = match current_span {
            Some(existing) if span < existing => Direction::Backward,
            _ => Direction::Forward,
        };

        let Some(found) = plan.find_state(&span, direction) else {
            let ticker = self.lock_state().ticker.take();
            if let Some(ticker) = ticker {
                ticker.cancel();
                self.listeners.notify(|listener| listener.animation_stopped());
            }
            return;
        };

        if let Some(current) = current {
            if current.same_position(&found) {
                return;
            }
        }

        // Kein blockierender Eintritt: der Aufrufer hält die Sperre des
        // TimeManager, Warten auf die eigene Sperre könnte sich mit einer
        // laufenden Animations-Operation überkreuzen
        match self.change_lock.try_begin() {
            Ok(Some(_change)) => {
                // Der Plan kann sich zwischenzeitlich geändert haben
                {
                    let state = self.lock_state();
                    if Self::validate_plan(&state, &plan).is_err() {
                        return;
                    }
                }
                if let Err(e) = self.commit_state(&plan, found, false) {
                    log::warn!("Zeitabgleich nach externer Änderung fehlgeschlagen: {e}");
                }
            }
            Ok(None) => {
                log::debug!("Zeitabgleich übersprungen: andere Änderung läuft gerade");
            }
            Err(_) => {
                log::debug!("Zeitabgleich übersprungen: eigene Änderung läuft bereits");
            }
        }
    }
}

impl Drop for AnimationManager {
    fn drop(&mut self) {
        if let Some(ticker) = self.lock_state().ticker.take() {
            ticker.cancel();
        }
    }
}

/// Interner Listener: externe Primär-Änderungen in den Plan zurückspiegeln.
struct PrimarySpanResync {
    manager: Weak<AnimationManager>,
}

impl PrimaryTimeSpanChangeListener for PrimarySpanResync {
    fn primary_time_spans_changed(&self, spans: &TimeSpanList) {
        if let Some(manager) = self.manager.upgrade() {
            manager.resync_to_primary(spans.primary());
        }
    }
}
