//! Closed-loop PID corrector with accumulator anti-windup.
//!
//! The controller returns a *correction*: a signed amount the caller adds to
//! the regulated value to move it toward `setpoint`. The integral accumulator
//! is clamped so that `ki * integral` alone can never leave the output range,
//! which keeps a long saturation from turning into a long overshoot.

use crate::error::{ensure_non_negative, AnimaError, Result};
use serde::{Deserialize, Serialize};

/// Gains, setpoint and output bounds for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub setpoint: f32,
    pub output_min: f32,
    pub output_max: f32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.1,
            ki: 0.01,
            kd: 0.05,
            setpoint: 0.0,
            output_min: -0.1,
            output_max: 0.1,
        }
    }
}

impl PidConfig {
    pub fn with_setpoint(mut self, setpoint: f32) -> Self {
        self.setpoint = setpoint;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("kp", self.kp)?;
        ensure_non_negative("ki", self.ki)?;
        ensure_non_negative("kd", self.kd)?;
        for (name, v) in [
            ("setpoint", self.setpoint),
            ("output_min", self.output_min),
            ("output_max", self.output_max),
        ] {
            if !v.is_finite() {
                return Err(AnimaError::config(format!("{} must be finite, got {}", name, v)));
            }
        }
        if self.output_min > self.output_max {
            return Err(AnimaError::config(format!(
                "output_min ({}) exceeds output_max ({})",
                self.output_min, self.output_max
            )));
        }
        Ok(())
    }
}

/// Internal memory of a controller, persisted across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidAccumulators {
    pub integral: f32,
    /// `None` until the first step, so the first derivative is zero.
    pub previous_error: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    config: PidConfig,
    acc: PidAccumulators,
}

impl PidController {
    pub fn new(config: PidConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            acc: PidAccumulators::default(),
        })
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn setpoint(&self) -> f32 {
        self.config.setpoint
    }

    pub fn accumulators(&self) -> PidAccumulators {
        self.acc
    }

    /// Restore persisted accumulators. Non-finite values are discarded and the
    /// integral is re-clamped against the current gains.
    pub fn restore(&mut self, acc: PidAccumulators) {
        let integral = if acc.integral.is_finite() { acc.integral } else { 0.0 };
        self.acc = PidAccumulators {
            integral: self.clamp_integral(integral),
            previous_error: acc.previous_error.filter(|e| e.is_finite()),
        };
    }

    pub fn reset(&mut self) {
        self.acc = PidAccumulators::default();
    }

    /// Advance the controller by `dt` seconds and return the clamped correction.
    pub fn step(&mut self, measured: f32, dt: f32) -> f32 {
        if !measured.is_finite() || !dt.is_finite() {
            return 0.0;
        }
        let PidConfig {
            kp,
            ki,
            kd,
            setpoint,
            output_min,
            output_max,
        } = self.config;

        let error = setpoint - measured;

        if dt > 0.0 && ki > 0.0 {
            self.acc.integral = self.clamp_integral(self.acc.integral + error * dt);
        }

        let derivative = match self.acc.previous_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.acc.previous_error = Some(error);

        let raw = kp * error + ki * self.acc.integral + kd * derivative;
        if raw.is_nan() {
            return 0.0;
        }
        raw.clamp(output_min, output_max)
    }

    fn clamp_integral(&self, integral: f32) -> f32 {
        let ki = self.config.ki;
        if ki <= 0.0 {
            return integral;
        }
        integral.clamp(self.config.output_min / ki, self.config.output_max / ki)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PidController {
        PidController::new(PidConfig::default()).unwrap()
    }

    #[test]
    fn test_zero_dt_has_no_derivative_kick() {
        let mut pid = controller();
        pid.step(0.5, 1.0);
        // error jumps from -0.5 to -1.0 with dt = 0
        let c = pid.step(1.0, 0.0);
        assert!(c.is_finite());
        // only the proportional and integral terms contribute
        let expected = (0.1 * -1.0 + 0.01 * pid.accumulators().integral).clamp(-0.1, 0.1);
        assert!((c - expected).abs() < 1e-6, "expected {}, got {}", expected, c);
    }

    #[test]
    fn test_first_step_has_no_derivative() {
        let mut pid = controller();
        let c = pid.step(0.2, 1.0);
        // kp * -0.2 + ki * -0.2
        assert!((c - (-0.02 - 0.002)).abs() < 1e-6, "got {}", c);
        assert_eq!(pid.accumulators().previous_error, Some(-0.2));
    }

    #[test]
    fn test_output_is_clamped() {
        let mut pid = controller();
        for measured in [100.0, -100.0, 0.9, -0.9] {
            let c = pid.step(measured, 0.5);
            assert!((-0.1..=0.1).contains(&c), "correction {} out of bounds", c);
        }
    }

    #[test]
    fn test_accumulator_anti_windup() {
        let mut pid = controller();
        // Hold far above the setpoint for a long time.
        for _ in 0..1000 {
            let c = pid.step(1.0, 1.0);
            assert!(c >= -0.1 - 1e-6);
        }
        let acc = pid.accumulators();
        assert!(
            (0.01 * acc.integral - (-0.1)).abs() < 1e-5,
            "integral contribution should sit exactly at output_min, got {}",
            0.01 * acc.integral
        );

        // Input returns to setpoint: the correction never exceeds the bounds
        // and the accumulator is not a thousand steps deep.
        for _ in 0..50 {
            let c = pid.step(0.0, 1.0);
            assert!((-0.1..=0.1).contains(&c), "correction {} escaped bounds", c);
        }
        assert!(pid.accumulators().integral >= -10.0 - 1e-4);
    }

    #[test]
    fn test_closed_loop_recovers_after_saturation() {
        let mut pid = controller();
        let mut x = 1.0f32;
        for _ in 0..500 {
            pid.step(x, 1.0);
        }
        let mut lowest = x;
        for _ in 0..400 {
            x += pid.step(x, 1.0);
            lowest = lowest.min(x);
        }
        // Integral held at its clamp: overshoot stays bounded instead of growing with hold time.
        assert!(lowest > -0.6, "overshoot too deep: {}", lowest);
        assert!(x.abs() < 0.05, "should settle near setpoint, got {}", x);
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let mut pid = controller();
        pid.step(0.3, 1.0);
        let before = pid.accumulators();
        assert_eq!(pid.step(f32::NAN, 1.0), 0.0);
        assert_eq!(pid.step(0.3, f32::INFINITY), 0.0);
        assert_eq!(pid.accumulators(), before);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = PidConfig {
            output_min: 0.2,
            output_max: -0.2,
            ..PidConfig::default()
        };
        assert!(matches!(
            PidController::new(bad),
            Err(AnimaError::OutOfRangeConfig(_))
        ));
        let nan = PidConfig {
            kp: f32::NAN,
            ..PidConfig::default()
        };
        assert!(PidController::new(nan).is_err());
    }

    #[test]
    fn test_restore_reclamps_integral() {
        let mut pid = controller();
        pid.restore(PidAccumulators {
            integral: 500.0,
            previous_error: Some(f32::NAN),
        });
        let acc = pid.accumulators();
        assert!((acc.integral - 10.0).abs() < 1e-4);
        assert_eq!(acc.previous_error, None);

        pid.reset();
        assert_eq!(pid.accumulators(), PidAccumulators::default());
    }
}
