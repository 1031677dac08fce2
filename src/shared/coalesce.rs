//! Zusammenfassender Dispatcher: Ein-Platz-Briefkasten, neuester Wert gewinnt.
//!
//! Ein dedizierter Worker-Thread konsumiert Schnappschüsse. Laufen mehrere
//! Änderungen auf, bevor der Worker die vorherige Benachrichtigung
//! abgearbeitet hat, wird nur der letzte Schnappschuss zugestellt.
//! Zwischenstände dürfen übersprungen werden; jeder Schnappschuss ist in
//! sich konsistent. Kein Puffer, keine MPSC-Queue.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

struct Mailbox<T> {
    slot: Mutex<MailboxSlot<T>>,
    posted: Condvar,
}

struct MailboxSlot<T> {
    value: Option<T>,
    shutdown: bool,
}

pub struct CoalescingDispatcher<T: Send + 'static> {
    mailbox: Arc<Mailbox<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> CoalescingDispatcher<T> {
    /// Startet den Worker-Thread. `consumer` wird für jeden zugestellten
    /// Schnappschuss auf dem Worker aufgerufen.
    pub fn new(name: &str, mut consumer: impl FnMut(T) + Send + 'static) -> Self {
        let mailbox = Arc::new(Mailbox {
            slot: Mutex::new(MailboxSlot {
                value: None,
                shutdown: false,
            }),
            posted: Condvar::new(),
        });

        let worker_mailbox = Arc::clone(&mailbox);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                let next = {
                    let mut slot = worker_mailbox
                        .slot
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    while slot.value.is_none() && !slot.shutdown {
                        slot = worker_mailbox
                            .posted
                            .wait(slot)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    if slot.value.is_none() && slot.shutdown {
                        return;
                    }
                    slot.value.take()
                };
                if let Some(value) = next {
                    consumer(value);
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Dispatcher-Thread '{name}' konnte nicht starten: {e}");
                None
            }
        };

        Self { mailbox, worker }
    }

    /// Legt einen Schnappschuss in den Briefkasten. Ein noch nicht
    /// zugestellter Wert wird ersetzt.
    pub fn submit(&self, value: T) {
        let mut slot = self
            .mailbox
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.shutdown {
            return;
        }
        slot.value = Some(value);
        self.mailbox.posted.notify_one();
    }
}

impl<T: Send + 'static> Drop for CoalescingDispatcher<T> {
    fn drop(&mut self) {
        {
            let mut slot = self
                .mailbox
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.shutdown = true;
            self.mailbox.posted.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_until(predicate: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !predicate() {
            assert!(Instant::now() < deadline, "Timeout beim Warten auf den Worker");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_delivers_latest_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let dispatcher = CoalescingDispatcher::new("test-dispatch", move |value: u32| {
            sink.lock().expect("Test-Sperre").push(value);
        });

        dispatcher.submit(1);
        wait_until(|| !seen.lock().expect("Test-Sperre").is_empty());
        let first = *seen.lock().expect("Test-Sperre").first().expect("Wert vorhanden");
        assert_eq!(first, 1);
    }

    #[test]
    fn test_coalesces_while_worker_is_busy() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let delivered_sink = Arc::clone(&delivered);
        let last_sink = Arc::clone(&last);

        let dispatcher = CoalescingDispatcher::new("test-coalesce", move |value: usize| {
            // Worker künstlich bremsen, damit Einreichungen auflaufen
            thread::sleep(Duration::from_millis(50));
            delivered_sink.fetch_add(1, Ordering::SeqCst);
            last_sink.store(value, Ordering::SeqCst);
        });

        for value in 1..=20 {
            dispatcher.submit(value);
        }
        wait_until(|| last.load(Ordering::SeqCst) == 20);

        // Deutlich weniger Zustellungen als Einreichungen
        assert!(delivered.load(Ordering::SeqCst) < 20);
    }
}
