//! Smoothed gain scalar
//!
//! A target and a current value. While a sound plays, the current value walks
//! toward the target by a fixed step per tick so volume changes do not click.

/// Gain change applied per update tick while playing
pub const GAIN_STEP: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedGain {
    target: f32,
    current: f32,
}

impl SmoothedGain {
    pub fn new(value: f32) -> Self {
        let value = value.clamp(0.0, 1.0);
        Self {
            target: value,
            current: value,
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target.clamp(0.0, 1.0);
    }

    /// Jump straight to the target
    pub fn snap(&mut self) -> f32 {
        self.current = self.target;
        self.current
    }

    /// Move one step toward the target
    pub fn step(&mut self) -> f32 {
        let diff = self.target - self.current;
        if diff.abs() <= GAIN_STEP {
            self.current = self.target;
        } else {
            self.current += GAIN_STEP.copysign(diff);
        }
        self.current
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}

impl Default for SmoothedGain {
    fn default() -> Self {
        Self::new(1.0)
    }
}
