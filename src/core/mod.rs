//! Core-Domänentypen: Zeitspannen, Dauern, Zeit- und Animations-Manager.

pub mod animation_manager;
pub mod animation_plan;
pub mod animation_state;
pub mod duration;
pub mod error;
pub mod fade;
pub mod time_manager;
pub mod time_span;

pub use animation_manager::{AnimationChangeListener, AnimationManager};
pub use animation_plan::{
    AnimationPlan, ContinuousAnimationPlan, DefaultAnimationPlan, LoopBehavior,
};
pub use animation_state::{AnimationState, Direction};
pub use duration::{Duration, InconvertibleUnits, InvalidDuration, TimeUnit};
pub use error::{AnimationError, TimeError};
pub use fade::Fade;
pub use time_manager::{
    ActiveTimeSpanChangeListener, ActiveTimeSpans, DataLoadDurationChangeListener,
    PrimaryTimeSpanChangeListener, RequestedDataDurationsChangeListener, TimeManager,
    WILDCARD_CONSTRAINT_KEY,
};
pub use time_span::{InvalidTimeSpan, TimeSpan, TimeSpanList};
