//! Wall-clock timer for operator execution

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn now() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic() {
        let timer = Timer::now();
        let first = timer.elapsed_ms();
        let second = timer.elapsed_ms();
        assert!(first >= 0.0);
        assert!(second >= first);
    }
}
