use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use terraview_time_engine::{
    AnimationChangeListener, AnimationError, AnimationManager, AnimationPlan, AnimationState,
    DefaultAnimationPlan, Direction, Duration, EngineOptions, LoopBehavior, PhaseVote,
    PhasedChangeListener, TimeManager, TimeSpan,
};

fn instant(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0)
        .single()
        .expect("gültiger Zeitpunkt")
}

fn hour_span(start_hour: u32) -> TimeSpan {
    TimeSpan::new(instant(start_hour), instant(start_hour + 1))
}

fn five_step_plan(loop_behavior: LoopBehavior) -> Arc<dyn AnimationPlan> {
    Arc::new(DefaultAnimationPlan::new(
        (0..5).map(hour_span).collect(),
        loop_behavior,
    ))
}

/// Manager mit träger Tickrate, damit Tests deterministisch bleiben.
fn build_manager() -> (Arc<TimeManager>, Arc<AnimationManager>) {
    let time_manager = Arc::new(TimeManager::new());
    let options = EngineOptions {
        listener_ready_timeout_ms: 500,
        change_rate_ms: 3_600_000,
    };
    let animation = AnimationManager::new(Arc::clone(&time_manager), options);
    (time_manager, animation)
}

#[derive(Default)]
struct LifecycleCounter {
    started: AtomicUsize,
    stopped: AtomicUsize,
    rate_changed: AtomicUsize,
    established: AtomicUsize,
    cancelled: AtomicUsize,
    last_direction: Mutex<Option<Direction>>,
}

impl AnimationChangeListener for LifecycleCounter {
    fn animation_started(&self, direction: Direction) {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.last_direction.lock().expect("Test-Sperre") = Some(direction);
    }

    fn animation_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn animation_rate_changed(&self, _rate: &Duration) {
        self.rate_changed.fetch_add(1, Ordering::SeqCst);
    }

    fn animation_plan_established(&self, _plan: &Arc<dyn AnimationPlan>) {
        self.established.fetch_add(1, Ordering::SeqCst);
    }

    fn animation_plan_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

fn attach_counter(animation: &AnimationManager) -> Arc<LifecycleCounter> {
    let counter = Arc::new(LifecycleCounter::default());
    let listener: Arc<dyn AnimationChangeListener> = counter.clone();
    animation.add_animation_change_listener(&listener);
    counter
}

#[test]
fn test_stale_plan_reference_is_rejected() {
    let (_, animation) = build_manager();
    let installed = five_step_plan(LoopBehavior::Wrap);
    let stale = five_step_plan(LoopBehavior::Wrap);

    animation
        .set_plan(Arc::clone(&installed), None, None, None)
        .expect("Plan installieren");
    let state_before = animation.animation_state();

    let err = animation
        .step_next(&stale, false)
        .expect_err("Fremder Plan soll abgelehnt werden");
    assert_eq!(err, AnimationError::PlanMismatch);

    // Kein Zustandswechsel durch den abgelehnten Aufruf
    assert_eq!(animation.animation_state(), state_before);
}

#[test]
fn test_wrap_plan_steps_through_and_wraps_around() {
    let (time_manager, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");

    animation.step_first(&plan).expect("Erster Schritt");
    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(0)
    );
    assert_eq!(
        time_manager.primary_active_time_spans().primary(),
        hour_span(0),
        "Schritt setzt die primaere Zeit"
    );

    for _ in 0..4 {
        animation.step_next(&plan, false).expect("Schritt");
    }
    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(4)
    );

    // WRAP: ein weiterer Schritt springt an den Anfang zurueck
    animation.step_next(&plan, false).expect("Wrap-Schritt");
    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(0)
    );
}

#[test]
fn test_jump_stops_and_restarts_ticker_exactly_once() {
    let (_, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");
    animation.step_first(&plan).expect("Erster Schritt");

    let counter = attach_counter(&animation);
    animation.play(&plan, Direction::Forward).expect("Abspielen");
    assert!(animation.is_playing());
    let started_before = counter.started.load(Ordering::SeqCst);
    let stopped_before = counter.stopped.load(Ordering::SeqCst);

    animation
        .jump_to_step(&plan, hour_span(2), false)
        .expect("Sprung");

    assert_eq!(
        counter.started.load(Ordering::SeqCst),
        started_before + 1,
        "Genau ein Neustart"
    );
    assert_eq!(
        counter.stopped.load(Ordering::SeqCst),
        stopped_before + 1,
        "Genau ein Stopp"
    );
    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(2)
    );
    assert!(animation.is_playing(), "Ticker laeuft nach dem Sprung weiter");
}

#[test]
fn test_pause_fires_stopped_even_when_already_paused() {
    let (_, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");

    let counter = attach_counter(&animation);
    animation.pause(&plan).expect("Erste Pause");
    animation.pause(&plan).expect("Zweite Pause");

    // Feuert auch im bereits pausierten Zustand
    assert_eq!(counter.stopped.load(Ordering::SeqCst), 2);
}

#[test]
fn test_end_of_stop_plan_terminates_normally() {
    let (_, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Stop);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");
    animation.step_last(&plan).expect("Zum Ende springen");

    let counter = attach_counter(&animation);
    let stepped = animation.step_next(&plan, false).expect("Schritt am Planende");

    assert!(!stepped, "Planende ist kein Fehler, aber kein Schritt");
    assert_eq!(counter.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(4),
        "Zustand bleibt am Ende stehen"
    );
}

#[test]
fn test_set_plan_resyncs_to_current_primary_span() {
    let (time_manager, animation) = build_manager();
    let first = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&first), None, None, None)
        .expect("Ersten Plan installieren");
    animation.step_first(&first).expect("Erster Schritt");

    time_manager
        .set_primary_active_time_span(hour_span(2))
        .expect("Externe Zeitaenderung");

    let second = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&second), None, None, None)
        .expect("Zweiten Plan installieren");

    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(2),
        "Neuer Plan uebernimmt die aktuelle primaere Spanne"
    );
}

#[test]
fn test_external_primary_change_resyncs_animation_state() {
    let (time_manager, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");
    animation.step_first(&plan).expect("Erster Schritt");

    time_manager
        .set_primary_active_time_span(hour_span(3))
        .expect("Externe Zeitaenderung");

    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(3),
        "Externer Zeitwechsel verschiebt den Planzustand"
    );
    assert!(!animation.is_playing(), "Abspielen wird nicht gestartet");
}

#[test]
fn test_external_change_outside_plan_stops_ticker() {
    let (time_manager, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");
    animation.step_first(&plan).expect("Erster Schritt");
    animation.play(&plan, Direction::Forward).expect("Abspielen");
    assert!(animation.is_playing());

    let counter = attach_counter(&animation);
    // Weit ausserhalb des Plans: kein passender Zustand
    time_manager
        .set_primary_active_time_span(TimeSpan::new(
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single().expect("gültig"),
            Utc.with_ymd_and_hms(2030, 1, 2, 0, 0, 0).single().expect("gültig"),
        ))
        .expect("Externe Zeitaenderung");

    assert!(!animation.is_playing(), "Ohne passenden Zustand stoppt der Ticker");
    assert_eq!(counter.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn test_abandon_plan_fires_stop_and_cancel() {
    let (_, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");

    let counter = attach_counter(&animation);
    animation.abandon_plan().expect("Plan verwerfen");

    assert!(!animation.is_plan_established());
    assert_eq!(counter.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(counter.cancelled.load(Ordering::SeqCst), 1);

    let err = animation
        .step_next(&plan, false)
        .expect_err("Ohne Plan schlaegt der Schritt fehl");
    assert_eq!(err, AnimationError::PlanMismatch);
}

#[test]
fn test_replacing_plan_cancels_the_old_one() {
    let (_, animation) = build_manager();
    let first = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&first), None, None, None)
        .expect("Ersten Plan installieren");

    let counter = attach_counter(&animation);
    let second = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&second), None, None, None)
        .expect("Zweiten Plan installieren");

    assert_eq!(counter.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(counter.cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(counter.established.load(Ordering::SeqCst), 1);

    let err = animation
        .step_next(&first, false)
        .expect_err("Alter Plan ist kein Token mehr");
    assert_eq!(err, AnimationError::PlanMismatch);
}

#[test]
fn test_play_reverses_direction_in_place() {
    let (_, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");
    animation.step_first(&plan).expect("Erster Schritt");

    let counter = attach_counter(&animation);
    animation
        .play(&plan, Direction::Backward)
        .expect("Rueckwaerts abspielen");

    assert_eq!(
        animation.animation_state().expect("Zustand").direction(),
        Direction::Backward
    );
    assert_eq!(
        *counter.last_direction.lock().expect("Test-Sperre"),
        Some(Direction::Backward)
    );

    // Erneutes play in gleicher Richtung startet nicht noch einmal
    animation
        .play(&plan, Direction::Backward)
        .expect("Zweites Abspielen");
    assert_eq!(counter.started.load(Ordering::SeqCst), 1);
}

#[test]
fn test_set_change_rate_notifies_once_per_change() {
    let (_, animation) = build_manager();
    let counter = attach_counter(&animation);

    animation
        .set_change_rate(Duration::millis(250))
        .expect("Rate setzen");
    animation
        .set_change_rate(Duration::millis(250))
        .expect("Gleiche Rate erneut");

    assert_eq!(counter.rate_changed.load(Ordering::SeqCst), 1);
    assert_eq!(animation.change_rate(), Duration::millis(250));

    let err = animation
        .set_change_rate(Duration::months(1))
        .expect_err("Kalender-Einheit ergibt keine Tickrate");
    assert!(matches!(err, AnimationError::Time(_)));
}

struct VetoListener {
    commits: AtomicUsize,
}

impl PhasedChangeListener for VetoListener {
    fn prepare(
        &self,
        _span: &TimeSpan,
        _token: &terraview_time_engine::shared::CancellationToken,
    ) -> PhaseVote {
        PhaseVote::Veto
    }

    fn commit(&self, _span: &TimeSpan) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_vetoed_step_leaves_state_untouched() {
    let (time_manager, animation) = build_manager();
    let plan = five_step_plan(LoopBehavior::Wrap);
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");
    animation.step_first(&plan).expect("Erster Schritt");

    let veto = Arc::new(VetoListener {
        commits: AtomicUsize::new(0),
    });
    let listener: Arc<dyn PhasedChangeListener> = veto.clone();
    animation.add_phased_change_listener(&listener);

    let stepped = animation
        .step_next(&plan, true)
        .expect("Schritt laeuft ohne Fehler");

    assert!(!stepped, "Veto verhindert die Uebernahme");
    assert_eq!(veto.commits.load(Ordering::SeqCst), 0);
    assert_eq!(
        animation.animation_state().expect("Zustand").window(),
        hour_span(0),
        "Zustand bleibt beim alten Schritt"
    );
    assert_eq!(
        time_manager.primary_active_time_spans().primary(),
        hour_span(0),
        "Primaere Zeit bleibt unveraendert"
    );
}

/// Plan, der sich als geleert meldet, aber noch Zustaende kennt.
#[derive(Debug)]
struct EmptiedPlan {
    window: TimeSpan,
}

impl AnimationPlan for EmptiedPlan {
    fn find_state(&self, _span: &TimeSpan, direction: Direction) -> Option<AnimationState> {
        Some(AnimationState::new(0, self.window, direction))
    }

    fn determine_next_state(&self, state: &AnimationState) -> Option<AnimationState> {
        Some(*state)
    }

    fn time_span_for_state(&self, _state: &AnimationState) -> TimeSpan {
        self.window
    }

    fn initial_state(&self) -> Option<AnimationState> {
        Some(AnimationState::new(0, self.window, Direction::Forward))
    }

    fn final_state(&self) -> Option<AnimationState> {
        None
    }

    fn is_empty_plan(&self) -> bool {
        true
    }

    fn is_using_processing_timeout(&self) -> bool {
        false
    }

    fn animation_sequence(&self) -> Vec<TimeSpan> {
        Vec::new()
    }

    fn loop_behavior(&self) -> LoopBehavior {
        LoopBehavior::Stop
    }

    fn advance_duration(&self) -> Option<Duration> {
        None
    }
}

#[test]
fn test_emptied_plan_forces_primary_to_zero() {
    let (time_manager, animation) = build_manager();
    time_manager
        .set_primary_active_time_span(hour_span(2))
        .expect("Startzeit setzen");

    let plan: Arc<dyn AnimationPlan> = Arc::new(EmptiedPlan {
        window: hour_span(0),
    });
    animation
        .set_plan(Arc::clone(&plan), None, None, None)
        .expect("Plan installieren");

    animation.step_first(&plan).expect("Schritt auf geleertem Plan");

    assert!(
        time_manager.primary_active_time_spans().primary().is_zero(),
        "Geleerter Plan erzwingt die ZERO-Spanne"
    );
    // Es wird kein Zustand aufgezeichnet
    assert_eq!(animation.animation_state(), None);
}
