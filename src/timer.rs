use tokio::time::Instant;

/// Extrapolates a playback position from an anchor and a monotonic clock.
///
/// Uses the tokio clock so paused-time tests advance it deterministically.
#[derive(Debug, PartialEq, Default)]
pub struct PlaybackTimer {
    /// Anchor position in seconds (finite, >= 0).
    anchor_position: f64,
    /// Monotonic instant corresponding to `anchor_position` while running.
    anchor_instant: Option<Instant>,
    rate: f64,
}

impl PlaybackTimer {
    pub fn new() -> Self {
        Self { rate: 1.0, ..Default::default() }
    }

    /// Moves the anchor; keeps running if it was running.
    pub fn set_position(&mut self, position: f64) {
        self.anchor_position = sanitize_position(position);
        if self.anchor_instant.is_some() {
            self.anchor_instant = Some(Instant::now());
        }
    }

    pub fn mark_playing(&mut self) {
        if self.anchor_instant.is_none() {
            self.anchor_instant = Some(Instant::now());
        }
    }

    /// Folds elapsed time into the anchor and stops the clock.
    pub fn mark_paused(&mut self) {
        self.anchor_position = self.estimate();
        self.anchor_instant = None;
    }

    pub fn set_rate(&mut self, rate: f64) {
        let position = self.estimate();
        self.rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        self.set_position(position);
    }

    pub fn is_running(&self) -> bool {
        self.anchor_instant.is_some()
    }

    pub fn estimate(&self) -> f64 {
        let base = self.anchor_position;
        let Some(inst) = self.anchor_instant else {
            return base;
        };
        let rate = if self.rate > 0.0 { self.rate } else { 1.0 };
        let val = base + inst.elapsed().as_secs_f64() * rate;
        if val.is_finite() { val } else { base }
    }
}

pub fn sanitize_position(p: f64) -> f64 {
    if !p.is_finite() || p < 0.0 { 0.0 } else { p }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn estimate_advances_only_while_playing() {
        let mut timer = PlaybackTimer::new();
        timer.set_position(10.0);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(timer.estimate(), 10.0);

        timer.mark_playing();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!((timer.estimate() - 12.0).abs() < 1e-6);

        timer.mark_paused();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!((timer.estimate() - 12.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_scales_elapsed_time() {
        let mut timer = PlaybackTimer::new();
        timer.set_rate(2.0);
        timer.mark_playing();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!((timer.estimate() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn sanitizes_positions() {
        assert_eq!(sanitize_position(f64::NAN), 0.0);
        assert_eq!(sanitize_position(-1.0), 0.0);
        assert_eq!(sanitize_position(4.5), 4.5);
    }
}
