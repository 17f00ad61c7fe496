use chrono::{DateTime, Utc};

/// Display smoothing between authoritative wait-time pushes.
///
/// The server's value always wins; between pushes the countdown loses one
/// second's worth of minutes per tick, floored at zero. The raw value is
/// kept unrounded so repeated ticks do not lose the sub-decimal drift;
/// rounding happens at the display accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitCountdown {
    remaining: f64,
}

impl WaitCountdown {
    pub fn idle() -> Self {
        Self { remaining: 0.0 }
    }

    pub fn from_authoritative(minutes: i32) -> Self {
        Self {
            remaining: minutes.max(0) as f64,
        }
    }

    /// Local stand-in while no authoritative value has arrived yet:
    /// the same linear model, minus the time already spent in the queue.
    pub fn from_fallback(
        position: u32,
        created_at: DateTime<Utc>,
        avg_consultation_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let elapsed_minutes = (now - created_at).num_seconds() as f64 / 60.0;
        let base = position.saturating_sub(1) as f64 * avg_consultation_minutes as f64;
        Self {
            remaining: (base - elapsed_minutes).max(0.0),
        }
    }

    /// An authoritative value resets the countdown unconditionally.
    pub fn set_authoritative(&mut self, minutes: i32) {
        self.remaining = minutes.max(0) as f64;
    }

    /// One second elapsed.
    pub fn tick(&mut self) {
        self.remaining = (self.remaining - 1.0 / 60.0).max(0.0);
    }

    /// Minutes remaining, rounded to one decimal place.
    pub fn remaining_minutes(&self) -> f64 {
        (self.remaining * 10.0).round() / 10.0
    }

    /// Whole minutes shown to the patient: the ceiling of the countdown.
    pub fn display_minutes(&self) -> u32 {
        self.remaining_minutes().ceil() as u32
    }
}

impl Default for WaitCountdown {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn authoritative_value_initializes_countdown() {
        let countdown = WaitCountdown::from_authoritative(10);
        assert_eq!(countdown.remaining_minutes(), 10.0);
        assert_eq!(countdown.display_minutes(), 10);
    }

    #[test]
    fn thirty_ticks_still_display_the_full_minute() {
        // 10 minutes, 30 seconds elapsed: 9.5 remaining, shown as 10.
        let mut countdown = WaitCountdown::from_authoritative(10);
        for _ in 0..30 {
            countdown.tick();
        }
        assert_eq!(countdown.remaining_minutes(), 9.5);
        assert_eq!(countdown.display_minutes(), 10);
    }

    #[test]
    fn a_full_minute_of_ticks_drops_the_display() {
        let mut countdown = WaitCountdown::from_authoritative(10);
        for _ in 0..60 {
            countdown.tick();
        }
        assert_eq!(countdown.remaining_minutes(), 9.0);
        assert_eq!(countdown.display_minutes(), 9);
    }

    #[test]
    fn countdown_floors_at_zero() {
        let mut countdown = WaitCountdown::from_authoritative(0);
        countdown.tick();
        assert_eq!(countdown.remaining_minutes(), 0.0);
        assert_eq!(countdown.display_minutes(), 0);

        let mut nearly_done = WaitCountdown::from_authoritative(1);
        for _ in 0..120 {
            nearly_done.tick();
        }
        assert_eq!(nearly_done.remaining_minutes(), 0.0, "never goes negative");
    }

    #[test]
    fn new_authoritative_value_wins_over_extrapolation() {
        let mut countdown = WaitCountdown::from_authoritative(10);
        for _ in 0..90 {
            countdown.tick();
        }
        countdown.set_authoritative(15);
        assert_eq!(
            countdown.remaining_minutes(),
            15.0,
            "the server value replaces any local extrapolation"
        );
    }

    #[test]
    fn negative_authoritative_values_clamp_to_zero() {
        let countdown = WaitCountdown::from_authoritative(-5);
        assert_eq!(countdown.remaining_minutes(), 0.0);
    }

    #[test]
    fn fallback_subtracts_elapsed_time_from_the_linear_model() {
        let now = Utc::now();
        // Position 3 with 15-minute slots: 30 minutes from creation, 10 spent.
        let created_at = now - Duration::minutes(10);
        let countdown = WaitCountdown::from_fallback(3, created_at, 15, now);
        assert_eq!(countdown.remaining_minutes(), 20.0);

        // The head of the queue owes nothing regardless of elapsed time.
        let head = WaitCountdown::from_fallback(1, created_at, 15, now);
        assert_eq!(head.remaining_minutes(), 0.0);

        // Elapsed time past the estimate floors at zero.
        let overdue = WaitCountdown::from_fallback(2, now - Duration::minutes(40), 15, now);
        assert_eq!(overdue.remaining_minutes(), 0.0);
    }
}
