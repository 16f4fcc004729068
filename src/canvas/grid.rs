//! Grid snapping.

use egui::{pos2, vec2, Pos2, Rect, Vec2};

/// The editing grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    /// Spacing in canvas units.
    pub size: i32,
    pub enabled: bool,
}

impl Grid {
    pub fn new(size: i32, enabled: bool) -> Self {
        Self {
            size: size.max(1),
            enabled,
        }
    }

    /// Rounds a value to the nearest grid multiple.
    pub fn snap_value(&self, value: f32) -> f32 {
        let size = self.size as f32;
        (value / size).round() * size
    }

    /// Quantises a drag delta when snapping is on.
    pub fn snap_delta(&self, delta: Vec2) -> Vec2 {
        if !self.enabled {
            return delta;
        }
        vec2(self.snap_value(delta.x), self.snap_value(delta.y))
    }

    /// Grid points inside `rect`, for painting.
    pub fn points(&self, rect: Rect) -> Vec<Pos2> {
        let size = self.size as f32;
        let first_x = (rect.left() / size).ceil() as i64;
        let last_x = (rect.right() / size).floor() as i64;
        let first_y = (rect.top() / size).ceil() as i64;
        let last_y = (rect.bottom() / size).floor() as i64;

        (first_y..=last_y)
            .flat_map(|y| (first_x..=last_x).map(move |x| pos2(x as f32 * size, y as f32 * size)))
            .collect()
    }
}
