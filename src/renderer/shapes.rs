//! Tessellation of a [`Scene`] into triangles (pixel coordinates)

use glam::Vec2;
use std::f32::consts::PI;

use super::vertex::{Vertex, colors};
use crate::sim::Scene;

const BALL_SEGMENTS: u32 = 32;
const PIVOT_SEGMENTS: u32 = 16;

/// Generate vertices for a filled circle
pub fn circle(center: Vec2, radius: f32, color: [f32; 4], segments: u32) -> Vec<Vertex> {
    let mut vertices = Vec::with_capacity((segments * 3) as usize);

    for i in 0..segments {
        let theta1 = (i as f32 / segments as f32) * 2.0 * PI;
        let theta2 = ((i + 1) as f32 / segments as f32) * 2.0 * PI;

        // Triangle from center to edge
        vertices.push(Vertex::new(center.x, center.y, color));
        vertices.push(Vertex::new(
            center.x + radius * theta1.cos(),
            center.y + radius * theta1.sin(),
            color,
        ));
        vertices.push(Vertex::new(
            center.x + radius * theta2.cos(),
            center.y + radius * theta2.sin(),
            color,
        ));
    }

    vertices
}

/// Generate vertices for a straight stroke of the given width
///
/// Degenerate strokes (zero length) produce nothing.
pub fn thick_line(start: Vec2, end: Vec2, width: f32, color: [f32; 4]) -> Vec<Vertex> {
    let dir = (end - start).normalize_or_zero();
    if dir == Vec2::ZERO {
        return Vec::new();
    }
    let perp = Vec2::new(-dir.y, dir.x) * (width * 0.5);

    let a1 = start + perp;
    let b1 = start - perp;
    let a2 = end + perp;
    let b2 = end - perp;

    vec![
        Vertex::new(a1.x, a1.y, color),
        Vertex::new(b1.x, b1.y, color),
        Vertex::new(a2.x, a2.y, color),
        Vertex::new(a2.x, a2.y, color),
        Vertex::new(b1.x, b1.y, color),
        Vertex::new(b2.x, b2.y, color),
    ]
}

/// Everything drawn for one scene: beam, pivot, then ball on top
pub fn scene_vertices(scene: &Scene) -> Vec<Vertex> {
    let beam = &scene.beam;
    let mut vertices = thick_line(beam.start, beam.end, beam.width, colors::BEAM);
    vertices.extend(circle(beam.end, beam.width, colors::PIVOT, PIVOT_SEGMENTS));

    if let Some(ball) = &scene.ball {
        let color = if ball.balanced {
            colors::BALL_BALANCED
        } else {
            colors::BALL
        };
        vertices.extend(circle(ball.center, ball.radius, color, BALL_SEGMENTS));
    }

    vertices
}
