//! Progressive sample accumulation of the path tracing strategy.

/// Accumulated sample count towards a target.
///
/// A reset restarts accumulation from zero; it does not cancel work that
/// was already submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accumulation {
    samples: u32,
    target: u32,
}

impl Accumulation {
    pub fn new(target: u32) -> Self {
        Self { samples: 0, target }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn set_target(&mut self, target: u32) {
        self.target = target;
    }

    pub fn reset(&mut self) {
        if self.samples > 0 {
            log::debug!("Accumulation: reset after {} samples", self.samples);
        }
        self.samples = 0;
    }

    /// Count one traced frame. Saturates at the target.
    pub fn advance(&mut self) {
        if !self.is_complete() {
            self.samples += 1;
        }
    }

    /// Whether the target was reached and tracing can stop.
    pub fn is_complete(&self) -> bool {
        self.samples >= self.target
    }

    /// Fraction of the target accumulated so far, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.target == 0 {
            return 1.0;
        }
        self.samples as f32 / self.target as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulation_saturates() {
        let mut acc = Accumulation::new(3);
        for _ in 0..5 {
            acc.advance();
        }
        assert_eq!(acc.samples(), 3);
        assert!(acc.is_complete());
        assert_eq!(acc.progress(), 1.0);
    }

    #[test]
    fn test_reset_restarts_from_zero() {
        let mut acc = Accumulation::new(4);
        acc.advance();
        acc.advance();
        assert_eq!(acc.progress(), 0.5);
        acc.reset();
        assert_eq!(acc.samples(), 0);
        assert!(!acc.is_complete());
    }

    #[test]
    fn test_zero_target_is_complete() {
        let acc = Accumulation::new(0);
        assert!(acc.is_complete());
        assert_eq!(acc.progress(), 1.0);
    }
}
