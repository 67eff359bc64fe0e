use std::time::{Duration, Instant};

/// Counts frames between `start` and `stop`.
#[derive(Debug, Clone)]
pub struct Fps {
    start: Instant,
    end: Option<Instant>,
    frames: u64,
}

impl Fps {
    pub fn start() -> Self {
        Self::start_at(Instant::now())
    }

    pub fn start_at(start: Instant) -> Self {
        Self {
            start,
            end: None,
            frames: 0,
        }
    }

    pub fn update(&mut self) {
        self.frames += 1;
    }

    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    pub fn stop_at(&mut self, end: Instant) {
        self.end = Some(end);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Time between start and stop, or until now while still running.
    pub fn elapsed(&self) -> Duration {
        let end = self.end.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.start)
    }

    pub fn fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_over_elapsed() {
        let t0 = Instant::now();
        let mut fps = Fps::start_at(t0);
        for _ in 0..50 {
            fps.update();
        }
        fps.stop_at(t0 + Duration::from_secs(2));

        assert_eq!(fps.frames(), 50);
        assert_eq!(fps.elapsed(), Duration::from_secs(2));
        assert!((fps.fps() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_elapsed() {
        let t0 = Instant::now();
        let mut fps = Fps::start_at(t0);
        fps.update();
        fps.stop_at(t0);
        assert_eq!(fps.fps(), 0.0);
    }

    #[test]
    fn stop_before_start_saturates() {
        let t0 = Instant::now() + Duration::from_secs(1);
        let mut fps = Fps::start_at(t0);
        fps.stop_at(t0 - Duration::from_millis(500));
        assert_eq!(fps.elapsed(), Duration::ZERO);
    }

    #[test]
    fn running_counter_keeps_ticking() {
        let fps = Fps::start();
        let a = fps.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert!(fps.elapsed() > a);
    }
}
