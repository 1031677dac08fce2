//! Periodische Aufgaben mit fester Pause zwischen den Läufen.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct TickerShared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Abbrechbares Handle auf eine periodisch laufende Aufgabe.
///
/// `cancel` setzt nur das Flag und weckt den Thread; es wird nicht
/// gejoint, damit eine Aufgabe ihren eigenen Ticker beenden kann.
pub struct Ticker {
    shared: Arc<TickerShared>,
    _thread: JoinHandle<()>,
}

impl Ticker {
    pub fn cancel(&self) {
        let mut cancelled = self
            .shared
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.shared.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .shared
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Startet eine Aufgabe mit fester Pause: erst `period` warten, dann
/// ausführen. Liefert die Aufgabe `false`, beendet sich der Ticker selbst.
pub fn spawn_fixed_delay(
    name: &str,
    period: Duration,
    mut task: impl FnMut() -> bool + Send + 'static,
) -> std::io::Result<Ticker> {
    let shared = Arc::new(TickerShared {
        cancelled: Mutex::new(false),
        wake: Condvar::new(),
    });

    let thread_shared = Arc::clone(&shared);
    let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
        loop {
            let started = Instant::now();
            let mut cancelled = thread_shared
                .cancelled
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            while !*cancelled {
                let elapsed = started.elapsed();
                if elapsed >= period {
                    break;
                }
                let (guard, _) = thread_shared
                    .wake
                    .wait_timeout(cancelled, period - elapsed)
                    .unwrap_or_else(PoisonError::into_inner);
                cancelled = guard;
            }
            if *cancelled {
                return;
            }
            drop(cancelled);

            if !task() {
                return;
            }
        }
    })?;

    Ok(Ticker {
        shared,
        _thread: thread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ticks_repeatedly_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = spawn_fixed_delay("test-ticker", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .expect("Ticker startet");

        let deadline = Instant::now() + Duration::from_secs(2);
        while ticks.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline, "Ticker tickt nicht");
            thread::sleep(Duration::from_millis(5));
        }

        ticker.cancel();
        let after_cancel = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        // Höchstens ein bereits laufender Tick darf noch durchkommen
        assert!(ticks.load(Ordering::SeqCst) <= after_cancel + 1);
    }

    #[test]
    fn test_task_can_stop_its_own_ticker() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let _ticker = spawn_fixed_delay("test-selfstop", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst) < 2
        })
        .expect("Ticker startet");

        thread::sleep(Duration::from_millis(100));
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
