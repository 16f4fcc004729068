//! The visible part of the canvas.
//!
//! Pointer positions arrive in view coordinates (relative to the top-left
//! of the canvas widget); everything else on the canvas works in canvas
//! coordinates, which match engine coordinates at zoom 1.

use egui::{vec2, Pos2, Rect, Vec2};

/// Scroll position, zoom and size of the view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Canvas position shown at the view's top-left corner.
    pub offset: Vec2,
    pub zoom: f32,
    /// View size in screen pixels.
    pub size: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            size: vec2(800.0, 600.0),
        }
    }
}

impl Viewport {
    pub fn to_canvas(&self, view: Pos2) -> Pos2 {
        (view.to_vec2() / self.zoom + self.offset).to_pos2()
    }

    pub fn to_view(&self, canvas: Pos2) -> Pos2 {
        ((canvas.to_vec2() - self.offset) * self.zoom).to_pos2()
    }

    pub fn set_size(&mut self, size: Vec2) {
        self.size = size;
    }

    /// The visible area in canvas coordinates.
    pub fn visible_rect(&self) -> Rect {
        Rect::from_min_size(self.offset.to_pos2(), self.size / self.zoom)
    }

    /// Scrolls by a pointer movement in screen pixels (content follows the
    /// pointer).
    pub fn pan(&mut self, delta: Vec2) {
        self.offset -= delta / self.zoom;
    }

    /// Scrolls towards the edge the pointer is near.
    ///
    /// Within `margin` pixels of an edge the view moves up to `speed` pixels
    /// per call, faster the closer the pointer is. Returns whether the view
    /// moved.
    pub fn auto_scroll(&mut self, view: Pos2, margin: f32, speed: f32) -> bool {
        let step = |position: f32, extent: f32| -> f32 {
            if margin <= 0.0 {
                return 0.0;
            }
            if position < margin {
                -speed * ((margin - position) / margin).min(1.0)
            } else if position > extent - margin {
                speed * ((position - (extent - margin)) / margin).min(1.0)
            } else {
                0.0
            }
        };

        let delta = vec2(step(view.x, self.size.x), step(view.y, self.size.y));
        if delta == Vec2::ZERO {
            return false;
        }
        self.offset += delta / self.zoom;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    #[test]
    fn test_coordinate_round_trip() {
        let viewport = Viewport {
            offset: vec2(100.0, 50.0),
            zoom: 2.0,
            size: vec2(400.0, 300.0),
        };
        let canvas = viewport.to_canvas(pos2(40.0, 20.0));
        assert_eq!(canvas, pos2(120.0, 60.0));
        assert_eq!(viewport.to_view(canvas), pos2(40.0, 20.0));
        assert_eq!(viewport.visible_rect().size(), vec2(200.0, 150.0));
    }

    #[test]
    fn test_pan_follows_pointer() {
        let mut viewport = Viewport::default();
        viewport.pan(vec2(10.0, -5.0));
        assert_eq!(viewport.offset, vec2(-10.0, 5.0));
    }

    #[test]
    fn test_auto_scroll_near_edges() {
        let mut viewport = Viewport::default();
        assert!(!viewport.auto_scroll(pos2(400.0, 300.0), 50.0, 8.0));

        assert!(viewport.auto_scroll(pos2(800.0, 300.0), 50.0, 8.0));
        assert_eq!(viewport.offset, vec2(8.0, 0.0));

        assert!(viewport.auto_scroll(pos2(400.0, 25.0), 50.0, 8.0));
        assert_eq!(viewport.offset, vec2(8.0, -4.0));
    }
}
