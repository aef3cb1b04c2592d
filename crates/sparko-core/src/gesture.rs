//! ============================================================================
//! Gesture Interpreter - Drag and button input to swipe decisions
//! ============================================================================
//! Pure classification. The interpreter never touches the queue or the
//! network; renderers animate from the returned value and from
//! `CardTilt::from_displacement`.
//!
//! - |dx| <  threshold  -> Cancel (card snaps back)
//! - dx  >= threshold  -> Like
//! - dx  <= -threshold -> Skip
//! - buttons always emit their own decision
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SWIPE_THRESHOLD;
use crate::types::DecisionKind;

/// How the input reached the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureMode {
    /// Pointer released after a horizontal drag
    Release,
    /// One of the skip / super-spark / like buttons
    Button(DecisionKind),
}

/// Classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Decision(DecisionKind),
    /// Return the card to rest; nothing is emitted downstream
    Cancel,
}

/// Converts drag displacement or button presses into decisions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureInterpreter {
    threshold: f64,
}

impl Default for GestureInterpreter {
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_THRESHOLD)
    }
}

impl GestureInterpreter {
    /// Threshold is taken as an absolute value
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify one gesture
    pub fn interpret(&self, displacement: f64, mode: GestureMode) -> Gesture {
        match mode {
            GestureMode::Button(kind) => Gesture::Decision(kind),
            GestureMode::Release => {
                if displacement >= self.threshold {
                    Gesture::Decision(DecisionKind::Like)
                } else if displacement <= -self.threshold {
                    Gesture::Decision(DecisionKind::Skip)
                } else {
                    // also covers NaN
                    Gesture::Cancel
                }
            }
        }
    }
}

// ============================================================================
// Visual feedback
// ============================================================================

/// Drag distance at which a card is fully rotated and faded
const TILT_RANGE: f64 = 200.0;

/// Maximum card rotation in degrees
const MAX_ROTATION_DEG: f64 = 30.0;

/// Presentation hints for a card being dragged, derived only from displacement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardTilt {
    pub rotation_deg: f64,
    pub opacity: f64,
    /// Opacity of the LIKE stamp
    pub like_label: f64,
    /// Opacity of the NOPE stamp
    pub nope_label: f64,
}

impl CardTilt {
    pub fn from_displacement(dx: f64) -> Self {
        let dx = if dx.is_finite() { dx } else { 0.0 };
        Self {
            rotation_deg: interpolate(dx, -TILT_RANGE, TILT_RANGE, -MAX_ROTATION_DEG, MAX_ROTATION_DEG),
            opacity: 1.0 - interpolate(dx.abs(), 150.0, TILT_RANGE, 0.0, 1.0),
            like_label: interpolate(dx, 50.0, 150.0, 0.0, 1.0),
            nope_label: interpolate(dx, -150.0, -50.0, 1.0, 0.0),
        }
    }
}

/// Linear map of `x` from [x0, x1] onto [y0, y1], clamped at both ends
fn interpolate(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if x <= x0 {
        y0
    } else if x >= x1 {
        y1
    } else {
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }
}
