//! Local ship movement and position reconciliation.
//!
//! Each frame:
//! 1. Turn held keys into a direction (diagonals scaled by 1/√2)
//! 2. Step by `speed * dt`, clamp into the ocean rectangle
//! 3. If the target isn't navigable, slide along whichever axis is
//! 4. Offer a commit when the commit interval has elapsed and the position
//!    differs from the last one the store accepted
//! 5. Flag an ambient event after each full interval of continuous sailing
//!
//! The local position is optimistic; only committed positions reach the
//! store, so other captains see this ship at commit cadence. A commit counts
//! only once the caller reports it with [`MovementReconciler::confirm_commit`];
//! until then the next due frame offers it again, moving or not.

use serde::{Deserialize, Serialize};

/// Diagonal scale factor.
const DIAGONAL: f32 = 0.707;

/// The playable ocean, anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OceanBounds {
    pub width: f32,
    pub height: f32,
}

impl OceanBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }

    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }
}

/// Held direction keys for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveInput {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveInput {
    pub fn is_moving(&self) -> bool {
        let (dx, dy) = self.direction();
        dx != 0.0 || dy != 0.0
    }

    /// Unit-ish direction vector. Opposing keys cancel.
    pub fn direction(&self) -> (f32, f32) {
        let mut dx = 0.0;
        let mut dy = 0.0;
        if self.up {
            dy -= 1.0;
        }
        if self.down {
            dy += 1.0;
        }
        if self.left {
            dx -= 1.0;
        }
        if self.right {
            dx += 1.0;
        }
        if dx != 0.0 && dy != 0.0 {
            dx *= DIAGONAL;
            dy *= DIAGONAL;
        }
        (dx, dy)
    }
}

/// Navigability of the world map. Island generation lives elsewhere.
pub trait Waters {
    fn is_navigable(&self, x: f32, y: f32) -> bool;
}

/// Water everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSea;

impl Waters for OpenSea {
    fn is_navigable(&self, _x: f32, _y: f32) -> bool {
        true
    }
}

/// Result of one frame of movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameResult {
    pub x: f32,
    pub y: f32,
    /// Position to write to the store this frame. Confirm it once written.
    pub commit: Option<(f32, f32)>,
    /// An ambient event should be rolled this frame.
    pub ambient_due: bool,
}

/// Timing for commits and ambient events, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// World units per second.
    pub ship_speed: f32,
    pub commit_interval_ms: u64,
    pub ambient_interval_ms: u64,
    pub ocean_width: f32,
    pub ocean_height: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            ship_speed: 30.0,
            commit_interval_ms: 1000,
            ambient_interval_ms: 15_000,
            ocean_width: 3840.0,
            ocean_height: 2160.0,
        }
    }
}

impl MovementConfig {
    pub fn bounds(&self) -> OceanBounds {
        OceanBounds::new(self.ocean_width, self.ocean_height)
    }
}

/// Optimistic local position with rate-limited commits.
#[derive(Debug, Clone)]
pub struct MovementReconciler {
    config: MovementConfig,
    x: f32,
    y: f32,
    committed: (f32, f32),
    last_commit_ms: Option<u64>,
    sailing_since_ms: Option<u64>,
}

impl MovementReconciler {
    /// Start at a position that is already stored.
    pub fn new(config: MovementConfig, x: f32, y: f32) -> Self {
        let (x, y) = config.bounds().clamp(x, y);
        Self {
            config,
            x,
            y,
            committed: (x, y),
            last_commit_ms: None,
            sailing_since_ms: None,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    /// Last position the store accepted.
    pub fn committed(&self) -> (f32, f32) {
        self.committed
    }

    /// The store accepted a position offered by [`Self::frame`].
    pub fn confirm_commit(&mut self, position: (f32, f32)) {
        self.committed = position;
    }

    /// Advance one frame of `dt_secs`.
    pub fn frame(&mut self, input: MoveInput, now_ms: u64, dt_secs: f32, waters: &dyn Waters) -> FrameResult {
        let (dx, dy) = input.direction();
        let step = self.config.ship_speed * dt_secs;
        if dx != 0.0 || dy != 0.0 {
            let bounds = self.config.bounds();
            let (tx, ty) = bounds.clamp(self.x + dx * step, self.y + dy * step);
            if waters.is_navigable(tx, ty) {
                self.x = tx;
                self.y = ty;
            } else if waters.is_navigable(tx, self.y) {
                self.x = tx;
            } else if waters.is_navigable(self.x, ty) {
                self.y = ty;
            }
        }

        let commit_due = match self.last_commit_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.commit_interval_ms,
        };
        let commit = if commit_due && (self.x, self.y) != self.committed {
            self.last_commit_ms = Some(now_ms);
            Some((self.x, self.y))
        } else {
            None
        };

        let ambient_due = if input.is_moving() {
            let since = *self.sailing_since_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= self.config.ambient_interval_ms {
                self.sailing_since_ms = Some(now_ms);
                true
            } else {
                false
            }
        } else {
            self.sailing_since_ms = None;
            false
        };

        FrameResult {
            x: self.x,
            y: self.y,
            commit,
            ambient_due,
        }
    }
}
