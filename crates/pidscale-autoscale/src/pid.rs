//! PID controller with conditional-integration anti-windup.
//!
//! The controller is owned by exactly one control loop, so every mutation
//! goes through `&mut self` and no lock is needed.

use tokio::time::Instant;

/// Time step used for the first update and whenever the clock did not move.
const DEFAULT_DT: f64 = 1.0;

/// Sign convention of the error term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `err = reference - measured`.
    Normal,
    /// `err = measured - reference`. A measured value above the reference
    /// drives the output up, which is what lag-based scaling wants.
    Reverse,
}

/// Gains and output bounds of a [`PidController`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidSettings {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub min_output: f64,
    pub max_output: f64,
    pub direction: Direction,
}

/// Discrete PID controller.
#[derive(Debug, Clone)]
pub struct PidController {
    settings: PidSettings,
    integral: f64,
    last_error: f64,
    last_update: Option<Instant>,
}

impl PidController {
    pub fn new(settings: PidSettings) -> Self {
        Self {
            settings,
            integral: 0.0,
            last_error: 0.0,
            last_update: None,
        }
    }

    pub fn settings(&self) -> &PidSettings {
        &self.settings
    }

    /// Current integral accumulator.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    /// Compute the next output, clamped to `[min_output, max_output]`.
    ///
    /// The integral only advances when the new value would not be clamped
    /// away immediately: at the upper bound only a negative error is
    /// integrated, at the lower bound only a positive one.
    pub fn update(&mut self, reference: f64, measured: f64, now: Instant) -> f64 {
        let dt = match self.last_update {
            Some(prev) => now.saturating_duration_since(prev).as_secs_f64(),
            None => 0.0,
        };
        let dt = if dt <= 0.0 { DEFAULT_DT } else { dt };
        self.last_update = Some(now);

        let s = &self.settings;
        let err = match s.direction {
            Direction::Normal => reference - measured,
            Direction::Reverse => measured - reference,
        };

        let p = s.kp * err;
        let tentative = self.integral + err * dt;
        let d = s.kd * (err - self.last_error) / dt;
        let unclamped = p + s.ki * tentative + d;

        let output = if unclamped > s.max_output {
            if err < 0.0 {
                self.integral = tentative;
            }
            s.max_output
        } else if unclamped < s.min_output {
            if err > 0.0 {
                self.integral = tentative;
            }
            s.min_output
        } else {
            self.integral = tentative;
            unclamped
        };

        self.last_error = err;
        output
    }

    /// Replace gains and bounds, keeping integral and derivative history.
    pub fn update_config(&mut self, settings: PidSettings) {
        self.settings = settings;
    }

    /// Clear integral, last error and the update clock.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_update = None;
    }
}
