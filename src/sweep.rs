use std::time::{Duration, Instant};

use egui::{Color32, Mesh, Painter, Pos2, Rect, pos2};

const TICK_INTERVAL:   Duration = Duration::from_millis(25);
const PHASE_STEP:      f32 = 0.01;
const BAND_HALF_WIDTH: f32 = 0.18;
const VIGNETTE_REACH:  f32 = 0.8;
const VIGNETTE_EDGE:   [u8; 4] = [0, 0, 24, 120];
const BAND_EDGE:       [u8; 4] = [200, 160, 255, 8];
const BAND_CORE:       [u8; 4] = [120, 100, 255, 36];
const PERIMETER_STEPS: usize = 8;

/// Vignette plus a violet light band that swings left and right.
pub struct SweepOverlay {
    phase:     f32,
    last_tick: Instant,
}

impl SweepOverlay {
    pub fn new(now: Instant) -> Self { Self { phase: 0.0, last_tick: now } }

    #[cfg(test)]
    pub fn phase(&self) -> f32 { self.phase }

    /// Adds one phase step per whole 25 ms tick elapsed since the last call.
    pub fn advance(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_millis() / TICK_INTERVAL.as_millis()) as u32;
        if ticks == 0 { return false; }
        self.phase += PHASE_STEP * ticks as f32;
        self.last_tick += TICK_INTERVAL * ticks;
        true
    }

    pub fn band_center(&self, width: f32) -> f32 { band_center(self.phase, width) }

    pub fn paint(&self, painter: &Painter, rect: Rect) {
        if rect.width() <= 0.0 || rect.height() <= 0.0 { return; }
        painter.add(vignette_mesh(rect));
        painter.add(band_mesh(rect, self.band_center(rect.width())));
    }
}

pub fn band_center(phase: f32, width: f32) -> f32 {
    0.5 * (phase.sin() + 1.0) * width
}

/// Premultiplied colour with zero alpha: egui blends it additively.
fn additive(c: [u8; 4]) -> Color32 {
    let k = c[3] as f32 / 255.0;
    let s = |v: u8| (v as f32 * k).round() as u8;
    Color32::from_rgba_premultiplied(s(c[0]), s(c[1]), s(c[2]), 0)
}

fn band_mesh(rect: Rect, center_x: f32) -> Mesh {
    let half = rect.width() * BAND_HALF_WIDTH;
    let xs = [rect.left() + center_x - half, rect.left() + center_x, rect.left() + center_x + half];
    let colors = [additive(BAND_EDGE), additive(BAND_CORE), additive(BAND_EDGE)];
    let mut mesh = Mesh::default();
    for (x, c) in xs.iter().zip(colors) {
        mesh.colored_vertex(pos2(*x, rect.top()), c);
        mesh.colored_vertex(pos2(*x, rect.bottom()), c);
    }
    for i in 0..2u32 {
        let (tl, bl, tr, br) = (i * 2, i * 2 + 1, i * 2 + 2, i * 2 + 3);
        mesh.add_triangle(tl, bl, tr);
        mesh.add_triangle(tr, bl, br);
    }
    mesh
}

fn vignette_color(rect: Rect, p: Pos2) -> Color32 {
    let radius = rect.width().max(rect.height()) * VIGNETTE_REACH;
    let t = (p.distance(rect.center()) / radius).clamp(0.0, 1.0);
    let [r, g, b, a] = VIGNETTE_EDGE;
    Color32::from_rgba_unmultiplied(r, g, b, (a as f32 * t) as u8)
}

fn perimeter(rect: Rect) -> Vec<Pos2> {
    let corners = [rect.left_top(), rect.right_top(), rect.right_bottom(), rect.left_bottom()];
    let mut pts = Vec::with_capacity(corners.len() * PERIMETER_STEPS);
    for i in 0..corners.len() {
        let (a, b) = (corners[i], corners[(i + 1) % corners.len()]);
        for s in 0..PERIMETER_STEPS {
            pts.push(a.lerp(b, s as f32 / PERIMETER_STEPS as f32));
        }
    }
    pts
}

fn vignette_mesh(rect: Rect) -> Mesh {
    let mut mesh = Mesh::default();
    mesh.colored_vertex(rect.center(), vignette_color(rect, rect.center()));
    let rim = perimeter(rect);
    for p in &rim {
        mesh.colored_vertex(*p, vignette_color(rect, *p));
    }
    let n = rim.len() as u32;
    for i in 0..n {
        mesh.add_triangle(0, i + 1, (i + 1) % n + 1);
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_advances_once_per_elapsed_tick() {
        let start = Instant::now();
        let mut sweep = SweepOverlay::new(start);
        assert!(!sweep.advance(start + Duration::from_millis(10)));
        assert!(sweep.advance(start + Duration::from_millis(60)));
        assert!((sweep.phase() - 0.02).abs() < 1e-6);
        // the 10 ms remainder carries into the next tick
        assert!(sweep.advance(start + Duration::from_millis(75)));
        assert!((sweep.phase() - 0.03).abs() < 1e-6);
    }

    #[test]
    fn band_swings_across_the_whole_canvas() {
        assert!((band_center(0.0, 400.0) - 200.0).abs() < 1e-3);
        assert!((band_center(std::f32::consts::FRAC_PI_2, 400.0) - 400.0).abs() < 1e-3);
        assert!(band_center(-std::f32::consts::FRAC_PI_2, 400.0).abs() < 1e-3);
    }

    #[test]
    fn vignette_darkens_toward_edges() {
        let rect = Rect::from_min_max(pos2(0.0, 0.0), pos2(200.0, 100.0));
        let centre = vignette_color(rect, rect.center());
        let corner = vignette_color(rect, rect.left_top());
        assert_eq!(centre.a(), 0);
        assert!(corner.a() > 0);
        assert!(corner.a() <= VIGNETTE_EDGE[3]);
    }

    #[test]
    fn band_is_additive() {
        let mesh = band_mesh(Rect::from_min_max(pos2(0.0, 0.0), pos2(100.0, 50.0)), 50.0);
        assert_eq!(mesh.vertices.len(), 6);
        assert!(mesh.vertices.iter().all(|v| v.color.a() == 0));
        assert!(mesh.vertices[2].color.b() > mesh.vertices[0].color.b());
    }
}
