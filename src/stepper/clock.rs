/// Communication time of the current epoch.
///
/// Times are seconds on the host's calendar axis. The clock only moves
/// forward by whole steps or back to the epoch start.
///
/// # Examples
///
/// ```
/// use cosim_bridge::stepper::clock::CommunicationClock;
///
/// let mut clock = CommunicationClock::default();
/// clock.begin_epoch(0.0, 1800.0, 600.0);
/// let mut times = Vec::new();
/// while !clock.reached_stop() {
///     times.push(clock.current());
///     clock.advance();
/// }
/// assert_eq!(times, vec![0.0, 600.0, 1200.0]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommunicationClock {
    start: f64,
    stop: f64,
    current: f64,
    step: f64,
}

impl CommunicationClock {
    /// Starts a new epoch `[start, stop]` with communication step `step`.
    ///
    /// # Arguments
    ///
    /// * `start` - Epoch start time in seconds
    /// * `stop` - Epoch stop time in seconds
    /// * `step` - Communication step size in seconds
    pub fn begin_epoch(&mut self, start: f64, stop: f64, step: f64) {
        self.start = start;
        self.stop = stop;
        self.step = step;
        self.current = start;
    }

    /// Moves the communication time forward by one step.
    pub fn advance(&mut self) {
        self.current += self.step;
    }

    /// Moves the communication time back to the epoch start.
    pub fn reset(&mut self) {
        self.current = self.start;
    }

    /// Whether the communication time has reached the epoch stop.
    ///
    /// Half a step of tolerance absorbs rounding in the accumulated time.
    pub fn reached_stop(&self) -> bool {
        self.current >= self.stop - 0.5 * self.step
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn step(&self) -> f64 {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_epoch_starts_at_start() {
        let mut clock = CommunicationClock::default();
        clock.begin_epoch(86_400.0, 172_800.0, 900.0);
        assert_eq!(clock.current(), 86_400.0);
        assert!(!clock.reached_stop());
    }

    #[test]
    fn advance_adds_one_step() {
        let mut clock = CommunicationClock::default();
        clock.begin_epoch(0.0, 3600.0, 600.0);
        clock.advance();
        clock.advance();
        assert_eq!(clock.current(), 1200.0);
    }

    #[test]
    fn reset_returns_exactly_to_start() {
        let mut clock = CommunicationClock::default();
        clock.begin_epoch(100.0, 400.0, 100.0);
        for _ in 0..3 {
            clock.advance();
        }
        assert!(clock.reached_stop());
        clock.reset();
        assert_eq!(clock.current(), clock.start());
    }

    #[test]
    fn fractional_steps_still_reach_stop() {
        let mut clock = CommunicationClock::default();
        clock.begin_epoch(0.0, 1.0, 0.1);
        let mut steps = 0;
        while !clock.reached_stop() {
            clock.advance();
            steps += 1;
        }
        assert_eq!(steps, 10);
    }
}
