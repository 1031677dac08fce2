//! Ein-/Ausblend-Dauern für die aktive Zeitdarstellung.

use super::duration::Duration;

/// Immutables Paar aus Einblend- und Ausblend-Dauer. Wert-Gleichheit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fade {
    fade_in: Duration,
    fade_out: Duration,
}

impl Fade {
    pub fn new(fade_in: Duration, fade_out: Duration) -> Self {
        Self { fade_in, fade_out }
    }

    pub fn fade_in(&self) -> Duration {
        self.fade_in
    }

    pub fn fade_out(&self) -> Duration {
        self.fade_out
    }

    /// Liefert ein neues Paar mit vertauschten Dauern.
    pub fn reverse(&self) -> Fade {
        Fade {
            fade_in: self.fade_out,
            fade_out: self.fade_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_swaps_without_mutating() {
        let fade = Fade::new(Duration::seconds(2), Duration::seconds(3));
        let reversed = fade.reverse();
        assert_eq!(reversed, Fade::new(Duration::seconds(3), Duration::seconds(2)));
        // Das Ausgangspaar bleibt unverändert
        assert_eq!(fade.fade_in(), Duration::seconds(2));
        assert_eq!(fade.fade_out(), Duration::seconds(3));
    }

    #[test]
    fn test_value_equality_across_units() {
        let a = Fade::new(Duration::seconds(60), Duration::minutes(2));
        let b = Fade::new(Duration::minutes(1), Duration::seconds(120));
        assert_eq!(a, b);
    }
}
