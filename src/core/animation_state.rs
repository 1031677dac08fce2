//! Position innerhalb eines Animationsplans plus Abspielrichtung.

use super::time_span::TimeSpan;

/// Abspielrichtung einer Animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Zustand einer Animation: Schrittnummer, konkretes Zeitfenster und
/// Richtung. Wert-Gleichheit über alle drei Felder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationState {
    step: u32,
    window: TimeSpan,
    direction: Direction,
}

impl AnimationState {
    pub fn new(step: u32, window: TimeSpan, direction: Direction) -> Self {
        Self { step, window, direction }
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn window(&self) -> TimeSpan {
        self.window
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Kehrt die Richtung um, ohne die Position zu ändern.
    pub fn reverse(&self) -> AnimationState {
        AnimationState {
            step: self.step,
            window: self.window,
            direction: self.direction.opposite(),
        }
    }

    /// Gleiche Position im Plan, Richtung wird ignoriert.
    pub fn same_position(&self, other: &AnimationState) -> bool {
        self.step == other.step && self.window == other.window
    }
}
