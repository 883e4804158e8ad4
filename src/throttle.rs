use std::time::{Duration, Instant};

/// Rate limiter for repeated log messages.
pub(crate) struct Throttle {
    period: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Whether at least one period has passed since the last time this
    /// returned `true`.
    pub(crate) fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Throttle;
    use std::time::Duration;

    #[test]
    fn first_call_is_ready() {
        let mut throttle = Throttle::new(Duration::from_secs(10));
        assert!(throttle.ready());
        assert!(!throttle.ready());
    }

    #[test]
    fn zero_period_is_always_ready() {
        let mut throttle = Throttle::new(Duration::from_secs(0));
        assert!(throttle.ready());
        assert!(throttle.ready());
    }
}
