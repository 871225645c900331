//! Drifting violet motes painted over the terminal frame.
//!
//! Velocities are expressed per 1/60 s, so particle speed is independent of
//! how regularly the overlay actually gets ticked.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, TAU};
use std::time::{Duration, Instant};

use egui::{Color32, Mesh, Painter, Pos2, Rect, Vec2, pos2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TIME_SCALE:     f32 = 60.0;
const BOUNDS_MARGIN:  f32 = 10.0;
const TICK_INTERVAL:  Duration = Duration::from_millis(16);
const MIN_DT:         f32 = 0.0001;
const GRADIENT_SEGMENTS: usize = 20;

const INNER_COLOR: [u8; 3] = [140, 100, 255];
const OUTER_COLOR: [u8; 3] = [20, 30, 70];

#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub x:        f32,
    pub y:        f32,
    pub vx:       f32,
    pub vy:       f32,
    pub size:     f32,
    pub opacity:  f32,
    pub lifespan: f32,
    pub age:      f32,
}

impl Particle {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, w: f32, h: f32) -> Self {
        let mut p = Self { x: 0.0, y: 0.0, vx: 0.0, vy: 0.0, size: 0.0, opacity: 0.0, lifespan: 0.0, age: 0.0 };
        p.reset(rng, w, h);
        p
    }

    /// Redraws every attribute. Age starts somewhere inside the fresh lifespan
    /// so a batch of new particles does not expire in lockstep.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R, w: f32, h: f32) {
        let (w, h) = canvas(w, h);
        self.x = rng.gen_range(0.0..=w);
        self.y = rng.gen_range(0.0..=h);
        let speed = rng.gen_range(0.12..=0.9_f32);
        // screen y grows downward, so -π/2 points up
        let angle = rng.gen_range(-FRAC_PI_3..=FRAC_PI_3) - FRAC_PI_2;
        self.vx = angle.cos() * speed;
        self.vy = angle.sin() * speed;
        self.size = rng.gen_range(1.5..=6.0);
        self.opacity = rng.gen_range(0.06..=0.36);
        self.lifespan = rng.gen_range(4.0..=12.0);
        self.age = rng.gen_range(0.0..self.lifespan);
    }

    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R, dt: f32, w: f32, h: f32) {
        let (w, h) = canvas(w, h);
        self.x += self.vx * dt * TIME_SCALE;
        self.y += self.vy * dt * TIME_SCALE;
        self.age += dt;
        if self.expired() || self.out_of_bounds(w, h) {
            self.reset(rng, w, h);
        }
    }

    pub fn expired(&self) -> bool { self.age >= self.lifespan }

    pub fn out_of_bounds(&self, w: f32, h: f32) -> bool {
        self.x < -BOUNDS_MARGIN || self.x > w + BOUNDS_MARGIN
            || self.y < -BOUNDS_MARGIN || self.y > h + BOUNDS_MARGIN
    }

    pub fn radius(&self) -> f32 { self.size * 3.0 }
}

fn canvas(w: f32, h: f32) -> (f32, f32) {
    let fix = |v: f32| if v.is_finite() { v.max(1.0) } else { 1.0 };
    (fix(w), fix(h))
}

pub struct ParticleOverlay {
    particles: Vec<Particle>,
    rng:       StdRng,
    size:      Vec2,
    last:      Instant,
    last_tick: Option<Instant>,
}

impl ParticleOverlay {
    pub fn new(count: usize) -> Self {
        Self::with_rng(count, StdRng::from_entropy(), Instant::now())
    }

    pub fn with_rng(count: usize, mut rng: StdRng, now: Instant) -> Self {
        // the host has not been laid out yet
        let size = Vec2::new(800.0, 400.0);
        let particles = (0..count).map(|_| Particle::new(&mut rng, size.x, size.y)).collect();
        Self { particles, rng, size, last: now, last_tick: None }
    }

    #[cfg(test)]
    pub fn particles(&self) -> &[Particle] { &self.particles }

    /// Re-seeds every particle inside the new canvas. No-op when the size is unchanged.
    pub fn resize(&mut self, w: f32, h: f32) -> bool {
        let next = Vec2::new(w, h);
        if next == self.size { return false; }
        self.size = next;
        for p in &mut self.particles {
            p.reset(&mut self.rng, w, h);
        }
        log::trace!("particle overlay resized to {w}x{h}");
        true
    }

    /// Advances the simulation if the 16 ms timer has elapsed. Returns whether
    /// a step happened, so the caller knows to repaint.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.last_tick.is_some_and(|t| now.saturating_duration_since(t) < TICK_INTERVAL) {
            return false;
        }
        self.last_tick = Some(now);
        let dt = now.saturating_duration_since(self.last).as_secs_f32().max(MIN_DT);
        self.step_all(dt);
        self.last = now;
        true
    }

    pub fn step_all(&mut self, dt: f32) {
        let (w, h) = (self.size.x, self.size.y);
        for p in &mut self.particles {
            p.step(&mut self.rng, dt, w, h);
        }
    }

    pub fn paint(&self, painter: &Painter, rect: Rect) {
        for p in &self.particles {
            let center = rect.min + Vec2::new(p.x, p.y);
            painter.add(radial_mesh(center, p.radius(), inner_color(p.opacity), outer_color()));
        }
    }
}

fn inner_color(opacity: f32) -> Color32 {
    let a = (opacity.clamp(0.0, 1.0) * 255.0) as u8;
    Color32::from_rgba_unmultiplied(INNER_COLOR[0], INNER_COLOR[1], INNER_COLOR[2], a)
}

fn outer_color() -> Color32 {
    Color32::from_rgba_unmultiplied(OUTER_COLOR[0], OUTER_COLOR[1], OUTER_COLOR[2], 0)
}

/// Triangle fan with `inner` at the centre and `outer` on the rim; the GPU
/// interpolation gives the two-stop ramp.
pub fn radial_mesh(center: Pos2, radius: f32, inner: Color32, outer: Color32) -> Mesh {
    let mut mesh = Mesh::default();
    mesh.colored_vertex(center, inner);
    for i in 0..GRADIENT_SEGMENTS {
        let a = i as f32 / GRADIENT_SEGMENTS as f32 * TAU;
        mesh.colored_vertex(pos2(center.x + a.cos() * radius, center.y + a.sin() * radius), outer);
    }
    for i in 0..GRADIENT_SEGMENTS as u32 {
        let next = (i + 1) % GRADIENT_SEGMENTS as u32;
        mesh.add_triangle(0, i + 1, next + 1);
    }
    mesh
}
