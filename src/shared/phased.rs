//! Dreiphasiger Wertwechsel: prepare, pre-commit, commit.
//!
//! Teure Abonnenten (z.B. Render-Subsysteme) können einen anstehenden
//! Zeitwechsel in den ersten beiden Phasen verzögern oder ablehnen.
//! Jede Phase läuft nebenläufig über alle Abonnenten und wird über eine
//! Countdown-Latch mit Timeout eingesammelt. Ein Veto oder ein Timeout
//! bricht den Wechsel ab; die Commit-Phase kennt kein Veto mehr.

use crate::core::TimeSpan;
use crate::shared::listeners::ListenerRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Zustand der Protokoll-Zustandsmaschine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Preparing,
    PreCommitting,
    Committing,
    Cancelled,
    TimedOut,
}

/// Antwort eines Abonnenten in den Veto-Phasen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseVote {
    Accept,
    Veto,
}

/// Explizites Abbruch-Token, das an jede untergeordnete Aufgabe geht.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Countdown-Latch: `wait_timeout` wird `true`, sobald alle Teilnehmer
/// heruntergezählt haben.
pub struct CountdownLatch {
    remaining: Mutex<usize>,
    done: Condvar,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            done: Condvar::new(),
        }
    }

    pub fn count_down(&self) {
        let mut remaining = self
            .remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *remaining > 0 {
            *remaining -= 1;
        }
        if *remaining == 0 {
            self.done.notify_all();
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut remaining = self
            .remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *remaining > 0 {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .done
                .wait_timeout(remaining, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            remaining = guard;
        }
        true
    }
}

/// Abonnent des dreiphasigen Zeitwechsels.
pub trait PhasedChangeListener: Send + Sync {
    fn prepare(&self, _span: &TimeSpan, _token: &CancellationToken) -> PhaseVote {
        PhaseVote::Accept
    }

    fn pre_commit(&self, _span: &TimeSpan, _token: &CancellationToken) -> PhaseVote {
        PhaseVote::Accept
    }

    fn commit(&self, span: &TimeSpan);
}

/// Registry plus Protokoll-Treiber für den dreiphasigen Wechsel.
pub struct PhasedChangeSupport {
    listeners: ListenerRegistry<dyn PhasedChangeListener>,
}

impl PhasedChangeSupport {
    pub fn new() -> Self {
        Self {
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn add(&self, listener: &Arc<dyn PhasedChangeListener>) {
        self.listeners.add(listener);
    }

    pub fn remove(&self, listener: &Arc<dyn PhasedChangeListener>) {
        self.listeners.remove(listener);
    }

    /// Führt den vollständigen Wechsel aus. `false` wenn ein Abonnent ein
    /// Veto eingelegt hat oder eine Phase das Timeout gerissen hat; der
    /// Wert gilt dann als nicht übernommen.
    pub fn update_value(&self, span: TimeSpan, per_phase_timeout: Duration) -> bool {
        let listeners = self.listeners.snapshot();
        if listeners.is_empty() {
            return true;
        }

        let token = CancellationToken::new();
        for phase in [PhaseState::Preparing, PhaseState::PreCommitting] {
            if !self.run_veto_phase(phase, &listeners, span, &token, per_phase_timeout) {
                return false;
            }
        }

        log::trace!("Zeitwechsel {span}: Phase {:?}", PhaseState::Committing);
        for listener in &listeners {
            listener.commit(&span);
        }
        true
    }

    /// Stellt den Wert ohne Warte-Protokoll zu (nur Commit-Phase).
    pub fn commit_now(&self, span: &TimeSpan) {
        self.listeners.notify(|listener| listener.commit(span));
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    fn run_veto_phase(
        &self,
        phase: PhaseState,
        listeners: &[Arc<dyn PhasedChangeListener>],
        span: TimeSpan,
        token: &CancellationToken,
        timeout: Duration,
    ) -> bool {
        log::trace!("Zeitwechsel {span}: Phase {phase:?}");
        let latch = Arc::new(CountdownLatch::new(listeners.len()));
        let vetoed = Arc::new(AtomicBool::new(false));

        for listener in listeners {
            let listener = Arc::clone(listener);
            let latch_thread = Arc::clone(&latch);
            let latch_err = Arc::clone(&latch);
            let vetoed = Arc::clone(&vetoed);
            let token = token.clone();
            let spawned = thread::Builder::new()
                .name("time-phase".to_string())
                .spawn(move || {
                    let vote = match phase {
                        PhaseState::Preparing => listener.prepare(&span, &token),
                        _ => listener.pre_commit(&span, &token),
                    };
                    if vote == PhaseVote::Veto {
                        vetoed.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                    latch_thread.count_down();
                });
            if let Err(e) = spawned {
                log::error!("Phasen-Thread konnte nicht starten: {e}");
                latch_err.count_down();
            }
        }

        if !latch.wait_timeout(timeout) {
            token.cancel();
            log::warn!(
                "Zeitwechsel {span}: Timeout in Phase {phase:?} nach {} ms",
                timeout.as_millis()
            );
            return false;
        }
        if vetoed.load(Ordering::SeqCst) {
            log::debug!("Zeitwechsel {span}: Veto in Phase {phase:?}");
            return false;
        }
        true
    }
}

impl Default for PhasedChangeSupport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Accepting {
        commits: AtomicUsize,
    }

    impl PhasedChangeListener for Accepting {
        fn commit(&self, _span: &TimeSpan) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Vetoing {
        commits: AtomicUsize,
    }

    impl PhasedChangeListener for Vetoing {
        fn prepare(&self, _span: &TimeSpan, _token: &CancellationToken) -> PhaseVote {
            PhaseVote::Veto
        }

        fn commit(&self, _span: &TimeSpan) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Stalling;

    impl PhasedChangeListener for Stalling {
        fn prepare(&self, _span: &TimeSpan, token: &CancellationToken) -> PhaseVote {
            // Blockiert bis zum Abbruch, simuliert einen hängenden Abonnenten
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            PhaseVote::Accept
        }

        fn commit(&self, _span: &TimeSpan) {}
    }

    #[test]
    fn test_all_accept_commits_once() {
        let support = PhasedChangeSupport::new();
        let listener = Arc::new(Accepting {
            commits: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn PhasedChangeListener> = listener.clone();
        support.add(&as_dyn);

        assert!(support.update_value(TimeSpan::zero(), Duration::from_secs(1)));
        assert_eq!(listener.commits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_veto_aborts_before_commit() {
        let support = PhasedChangeSupport::new();
        let listener = Arc::new(Vetoing {
            commits: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn PhasedChangeListener> = listener.clone();
        support.add(&as_dyn);

        assert!(!support.update_value(TimeSpan::zero(), Duration::from_secs(1)));
        assert_eq!(listener.commits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timeout_cancels_the_change() {
        let support = PhasedChangeSupport::new();
        let as_dyn: Arc<dyn PhasedChangeListener> = Arc::new(Stalling);
        support.add(&as_dyn);

        assert!(!support.update_value(TimeSpan::zero(), Duration::from_millis(50)));
    }

    #[test]
    fn test_no_listeners_is_trivially_accepted() {
        let support = PhasedChangeSupport::new();
        assert!(support.update_value(TimeSpan::zero(), Duration::from_millis(1)));
    }
}
