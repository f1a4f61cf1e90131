//! Vehicle positions and line-of-sight geometry.
//!
//! Contains:
//! - The read-only mobility interface consumed by the shared medium
//! - A constant-velocity mobility model
//! - Segment/rectangle intersection tests used to decide whether a static
//!   blocker (building, parked truck) sits between two vehicles

use super::time::SimTime;
use serde::{Deserialize, Serialize};

/// Position (or velocity) in meters (or meters per second).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

/// Euclidean distance in meters.
pub fn distance(a: &Position, b: &Position) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Read-only position provider.
pub trait MobilityModel {
    fn position_at(&self, t: SimTime) -> Position;
}

/// Straight-line motion from an initial position.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantVelocity {
    pub initial: Position,
    pub velocity: Position,
}

impl ConstantVelocity {
    pub fn new(initial: Position, velocity: Position) -> Self {
        ConstantVelocity { initial, velocity }
    }

    pub fn stationary(initial: Position) -> Self {
        ConstantVelocity {
            initial,
            velocity: Position::default(),
        }
    }
}

impl MobilityModel for ConstantVelocity {
    fn position_at(&self, t: SimTime) -> Position {
        let s = t.as_secs_f64();
        Position {
            x: self.initial.x + self.velocity.x * s,
            y: self.initial.y + self.velocity.y * s,
        }
    }
}

/// Axis-aligned rectangular blocker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
    pub top_left: Position,
    pub bottom_right: Position,
}

impl Blocker {
    /// Normalized (left, right, top, bottom).
    fn bounds(&self) -> (f64, f64, f64, f64) {
        let left = self.top_left.x.min(self.bottom_right.x);
        let right = self.top_left.x.max(self.bottom_right.x);
        let top = self.top_left.y.min(self.bottom_right.y);
        let bottom = self.top_left.y.max(self.bottom_right.y);
        (left, right, top, bottom)
    }

    /// Inclusive point-in-rectangle test.
    pub fn contains(&self, p: &Position) -> bool {
        let (left, right, top, bottom) = self.bounds();
        p.x >= left && p.x <= right && p.y >= top && p.y <= bottom
    }

    fn intersects_segment(&self, p1: &Position, p2: &Position) -> bool {
        if self.contains(p1) || self.contains(p2) {
            return true;
        }
        let (left, right, top, bottom) = self.bounds();
        let lt = Position::new(left, top);
        let rt = Position::new(right, top);
        let rb = Position::new(right, bottom);
        let lb = Position::new(left, bottom);
        segments_intersect(p1, p2, &lt, &rt) || segments_intersect(p1, p2, &rt, &rb) || segments_intersect(p1, p2, &rb, &lb) || segments_intersect(p1, p2, &lb, &lt)
    }
}

/// Whether the straight path between two vehicles crosses any blocker.
pub fn is_blocked(a: &Position, b: &Position, blockers: &[Blocker]) -> bool {
    blockers.iter().any(|blk| blk.intersects_segment(a, b))
}

/// Orientation of ordered triplet (a,b,c): 1 clockwise, -1 counter-clockwise, 0 collinear.
fn orientation(a: &Position, b: &Position, c: &Position) -> i32 {
    let val = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if val > 0.0 {
        1
    } else if val < 0.0 {
        -1
    } else {
        0
    }
}

/// True if b lies on segment a–c, assuming collinearity.
fn on_segment(a: &Position, b: &Position, c: &Position) -> bool {
    b.x >= a.x.min(c.x) && b.x <= a.x.max(c.x) && b.y >= a.y.min(c.y) && b.y <= a.y.max(c.y)
}

/// Segment–segment intersection including touching endpoints and collinear overlap.
pub fn segments_intersect(p1: &Position, q1: &Position, p2: &Position, q2: &Position) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(p1, p2, q1)) || (o2 == 0 && on_segment(p1, q2, q1)) || (o3 == 0 && on_segment(p2, p1, q2)) || (o4 == 0 && on_segment(p2, q1, q2))
}
