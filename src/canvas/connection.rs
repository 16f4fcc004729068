//! Visual connections.
//!
//! A [`VisualConnection`] mirrors one engine connection. Its identity is the
//! engine tuple (source, outlet, sink, inlet); the endpoints are looked up
//! on the owning boxes whenever geometry is needed, so moving a box moves
//! its connections with it.

use egui::{pos2, Pos2, Rect};

use crate::engine::Connection;

use super::object_box::{EdgeRef, Polarity};

/// The visual proxy for one engine connection.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualConnection {
    connection: Connection,
    /// Stable key of the connection's metadata.
    key: String,
    /// Persisted routing, as space-separated `x,y` waypoints.
    path: Option<String>,
}

impl VisualConnection {
    pub fn new(connection: Connection, key: String, path: Option<String>) -> Self {
        Self {
            connection,
            key,
            path,
        }
    }

    pub fn connection(&self) -> Connection {
        self.connection
    }

    pub fn id(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Takes over the current key and stored routing.
    pub fn set_state(&mut self, key: String, path: Option<String>) {
        self.key = key;
        self.path = path;
    }

    pub fn outlet(&self) -> EdgeRef {
        EdgeRef {
            object: self.connection.source,
            polarity: Polarity::Outlet,
            index: self.connection.outlet,
        }
    }

    pub fn inlet(&self) -> EdgeRef {
        EdgeRef {
            object: self.connection.sink,
            polarity: Polarity::Inlet,
            index: self.connection.inlet,
        }
    }

    /// Waypoints parsed from the stored path. Malformed entries are skipped.
    pub fn waypoints(&self) -> Vec<Pos2> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        path.split_whitespace()
            .filter_map(|point| {
                let (x, y) = point.split_once(',')?;
                Some(pos2(x.trim().parse().ok()?, y.trim().parse().ok()?))
            })
            .collect()
    }

    /// The full polyline from `start` to `end` through the waypoints.
    pub fn route(&self, start: Pos2, end: Pos2) -> Vec<Pos2> {
        let mut points = vec![start];
        points.extend(self.waypoints());
        points.push(end);
        points
    }
}

/// Distance from `point` to the segment `a`-`b`.
pub fn distance_to_segment(point: Pos2, a: Pos2, b: Pos2) -> f32 {
    let along = b - a;
    let length_sq = along.length_sq();
    if length_sq == 0.0 {
        return point.distance(a);
    }
    let t = ((point - a).dot(along) / length_sq).clamp(0.0, 1.0);
    point.distance(a + along * t)
}

/// Distance from `point` to a polyline.
pub fn distance_to_polyline(point: Pos2, points: &[Pos2]) -> f32 {
    points
        .windows(2)
        .map(|pair| distance_to_segment(point, pair[0], pair[1]))
        .fold(f32::INFINITY, f32::min)
}

/// Whether the segment `a`-`b` touches `rect` (Liang-Barsky clipping).
pub fn segment_intersects_rect(a: Pos2, b: Pos2, rect: Rect) -> bool {
    if rect.contains(a) || rect.contains(b) {
        return true;
    }

    let delta = b - a;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    let edges = [
        (-delta.x, a.x - rect.left()),
        (delta.x, rect.right() - a.x),
        (-delta.y, a.y - rect.top()),
        (delta.y, rect.bottom() - a.y),
    ];

    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return false;
        }
    }
    true
}

pub fn polyline_intersects_rect(points: &[Pos2], rect: Rect) -> bool {
    points
        .windows(2)
        .any(|pair| segment_intersects_rect(pair[0], pair[1], rect))
}
