//! TerraView Time Engine Library.
//! Zeit- und Animationskern als Library exportiert für Tests und Wiederverwendung.

pub mod app;
pub mod core;
pub mod shared;
pub mod xml;

pub use app::{AnimationManagerStateController, TimeManagerStateController, Toolbox};
pub use core::{
    AnimationChangeListener, AnimationError, AnimationManager, AnimationPlan, AnimationState,
    ContinuousAnimationPlan, DefaultAnimationPlan, Direction, Duration, Fade, LoopBehavior,
    TimeError, TimeManager, TimeSpan, TimeSpanList, TimeUnit,
};
pub use core::{
    ActiveTimeSpanChangeListener, ActiveTimeSpans, DataLoadDurationChangeListener,
    PrimaryTimeSpanChangeListener, RequestedDataDurationsChangeListener,
    WILDCARD_CONSTRAINT_KEY,
};
pub use shared::{EngineOptions, PhaseVote, PhasedChangeListener};
pub use xml::{parse_session_state, write_session_state, PlayState, SessionState};
