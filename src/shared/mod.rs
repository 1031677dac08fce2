//! Querschnitts-Bausteine: Sperren, Listener-Registry, Dispatcher, Ticker.

pub mod change_lock;
pub mod coalesce;
pub mod listeners;
pub mod options;
pub mod phased;
pub mod scheduler;

pub use change_lock::{ChangeGuard, ChangeLock, ReentrantChange};
pub use coalesce::CoalescingDispatcher;
pub use listeners::ListenerRegistry;
pub use options::EngineOptions;
pub use phased::{
    CancellationToken, CountdownLatch, PhaseState, PhaseVote, PhasedChangeListener,
    PhasedChangeSupport,
};
pub use scheduler::{spawn_fixed_delay, Ticker};
