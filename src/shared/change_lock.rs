//! Operations-Sperre mit sofortigem Fehler bei verschachtelten Aufrufen.
//!
//! Jede Manager-Mutation läuft komplett unter dieser Sperre, inklusive
//! der synchronen Listener-Benachrichtigungen. Andere Threads warten;
//! ein erneuter Eintritt aus demselben Thread (also aus einem Listener
//! der laufenden Mutation heraus) schlägt sofort fehl statt zu blockieren.
//! Bewusst keine reentrante Sperre: verschachtelte Mutationen sind
//! Programmierfehler im Aufrufer-Code und sollen sichtbar werden.

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use thiserror::Error;

/// Verschachtelter Mutations-Versuch aus demselben Thread.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Änderung läuft bereits in diesem Thread")]
pub struct ReentrantChange;

/// Sperre für genau eine laufende Manager-Operation.
#[derive(Debug, Default)]
pub struct ChangeLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl ChangeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Beginnt eine Operation. Blockiert solange ein anderer Thread eine
    /// Operation ausführt; schlägt fehl wenn der eigene Thread bereits
    /// eine ausführt.
    pub fn begin(&self) -> Result<ChangeGuard<'_>, ReentrantChange> {
        let current = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match *owner {
                Some(holder) if holder == current => return Err(ReentrantChange),
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => {
                    *owner = Some(current);
                    return Ok(ChangeGuard { lock: self });
                }
            }
        }
    }

    /// Versucht den Eintritt ohne zu warten. `Ok(None)` wenn ein anderer
    /// Thread gerade eine Operation ausführt.
    pub fn try_begin(&self) -> Result<Option<ChangeGuard<'_>>, ReentrantChange> {
        let current = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        match *owner {
            Some(holder) if holder == current => Err(ReentrantChange),
            Some(_) => Ok(None),
            None => {
                *owner = Some(current);
                Ok(Some(ChangeGuard { lock: self }))
            }
        }
    }

    /// `true` wenn der aktuelle Thread gerade eine Operation ausführt.
    pub fn held_by_current_thread(&self) -> bool {
        let owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        *owner == Some(thread::current().id())
    }
}

/// RAII-Wächter der laufenden Operation.
#[derive(Debug)]
pub struct ChangeGuard<'a> {
    lock: &'a ChangeLock,
}

impl Drop for ChangeGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self
            .lock
            .owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *owner = None;
        self.lock.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_nested_begin_fails_fast() {
        let lock = ChangeLock::new();
        let _guard = lock.begin().expect("Erster Eintritt muss gelingen");
        assert_eq!(lock.begin().expect_err("Zweiter Eintritt soll fehlschlagen"), ReentrantChange);
    }

    #[test]
    fn test_released_lock_can_be_taken_again() {
        let lock = ChangeLock::new();
        drop(lock.begin().expect("Erster Eintritt"));
        assert!(lock.begin().is_ok());
    }

    #[test]
    fn test_other_thread_waits_instead_of_failing() {
        let lock = Arc::new(ChangeLock::new());
        let guard = lock.begin().expect("Eintritt im Testthread");

        let other = Arc::clone(&lock);
        let handle = std::thread::spawn(move || other.begin().is_ok());

        // Freigeben, damit der andere Thread die Sperre bekommt
        drop(guard);
        assert!(handle.join().expect("Thread beendet sich"));
    }
}
