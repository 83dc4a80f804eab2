//! The night sky: twinkling stars, a few constellation strokes, planets,
//! occasional shooting stars and a moon showing today's phase.

use crate::canvas::{rgba, Blend, Paint, PixelCanvas, Rgba};
use crate::moon::{moon_phase, occluder_offset, phase_name};
use crate::stage::Layer;
use crate::surface::Surface;
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng};

const STAR_OPACITY_MIN: f32 = 0.3;
const STAR_OPACITY_MAX: f32 = 1.0;

const SHOOTING_MAX_LIVE: usize = 2;
const SHOOTING_SPAWN_CHANCE: f64 = 0.03;
/// How far past the edges a shooting star may travel before it is dropped.
const SHOOTING_MARGIN: f32 = 150.0;

const LAYER_OPACITY: f32 = 0.55;

const PLANET_PALETTE: [(Rgba, Rgba); 3] = [
    (rgba(120, 180, 255, 0.95), rgba(50, 70, 130, 0.9)),
    (rgba(255, 190, 140, 0.95), rgba(150, 90, 60, 0.9)),
    (rgba(200, 160, 255, 0.95), rgba(110, 80, 150, 0.9)),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Star {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) r: f32,
    pub(crate) alpha: f32,
    pub(crate) twinkle: f32,
}

/// A faint line between two stars, by index into the star list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Link {
    pub(crate) a: usize,
    pub(crate) b: usize,
    pub(crate) alpha: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Planet {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) r: f32,
    pub(crate) light: Rgba,
    pub(crate) shade: Rgba,
    pub(crate) ring: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ShootingStar {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) vx: f32,
    pub(crate) vy: f32,
    pub(crate) age: u32,
    pub(crate) max_age: f32,
}

pub(crate) fn star_count(mobile: bool) -> usize {
    if mobile {
        70
    } else {
        110
    }
}

/// Number of link attempts; a link is only kept if its stars are close.
pub(crate) fn constellation_budget(mobile: bool) -> usize {
    if mobile {
        4
    } else {
        8
    }
}

pub(crate) fn planet_count(mobile: bool) -> usize {
    if mobile {
        2
    } else {
        3
    }
}

/// Everything alive in the sky at one moment.
#[derive(Clone, Debug)]
pub(crate) struct Sky {
    pub(crate) width: f32,
    pub(crate) height: f32,
    pub(crate) mobile: bool,
    pub(crate) stars: Vec<Star>,
    pub(crate) links: Vec<Link>,
    pub(crate) planets: Vec<Planet>,
    pub(crate) shooting: Vec<ShootingStar>,
    pub(crate) moon_phase: f64,
}

impl Sky {
    /// Build a fresh population for `surface`. Nothing from a previous sky
    /// survives, so calling this on every resize is all the bookkeeping needed.
    pub(crate) fn generate(surface: &Surface, rng: &mut StdRng, now: DateTime<Utc>) -> Self {
        let (w, h) = (surface.width, surface.height);
        let mobile = surface.is_mobile();

        let stars: Vec<Star> = (0..star_count(mobile))
            .map(|_| Star {
                x: rng.gen::<f32>() * w,
                y: rng.gen::<f32>() * h,
                r: rng.gen::<f32>() * 1.9 + 0.5,
                alpha: 0.4 + rng.gen::<f32>() * 0.6,
                twinkle: 0.004 + rng.gen::<f32>() * 0.006,
            })
            .collect();

        let mut links = Vec::new();
        for _ in 0..constellation_budget(mobile) {
            let a = rng.gen_range(0..stars.len());
            let b = rng.gen_range(0..stars.len());
            let alpha = 0.28 + rng.gen::<f32>() * 0.2;
            let (sa, sb) = (stars[a], stars[b]);
            if (sa.x - sb.x).hypot(sa.y - sb.y) < w / 2.0 {
                links.push(Link { a, b, alpha });
            }
        }

        let planets = (0..planet_count(mobile))
            .map(|i| {
                let (light, shade) = PLANET_PALETTE[i % PLANET_PALETTE.len()];
                let x = rng.gen::<f32>() * w * 0.6 + w * 0.1;
                let y = if i == 0 {
                    h * 0.25
                } else {
                    rng.gen::<f32>() * h * 0.6 + h * 0.2
                };
                let base = if mobile { 10.0 } else { 14.0 };
                Planet {
                    x,
                    y,
                    r: base + rng.gen::<f32>() * 18.0,
                    light,
                    shade,
                    ring: rng.gen::<f32>() > 0.5,
                }
            })
            .collect();

        let moon_phase = moon_phase(now);
        tracing::debug!(
            stars = stars.len(),
            links = links.len(),
            mobile,
            moon_phase,
            "sky regenerated"
        );

        Self {
            width: w,
            height: h,
            mobile,
            stars,
            links,
            planets,
            shooting: Vec::new(),
            moon_phase,
        }
    }

    /// One simulation step: twinkle, move and retire shooting stars, then
    /// maybe launch a new one.
    pub(crate) fn update(&mut self, rng: &mut StdRng) {
        for s in &mut self.stars {
            let step = if rng.gen::<f32>() > 0.5 {
                s.twinkle
            } else {
                -s.twinkle
            };
            s.alpha = (s.alpha + step).clamp(STAR_OPACITY_MIN, STAR_OPACITY_MAX);
        }

        self.advance_shooting_stars();
        self.retire_shooting_stars();

        if rng.gen::<f64>() < SHOOTING_SPAWN_CHANCE && self.shooting.len() < SHOOTING_MAX_LIVE {
            self.spawn_shooting_star(rng);
        }
    }

    pub(crate) fn advance_shooting_stars(&mut self) {
        for s in &mut self.shooting {
            s.x += s.vx;
            s.y += s.vy;
            s.age += 1;
        }
    }

    pub(crate) fn retire_shooting_stars(&mut self) {
        let (w, h) = (self.width, self.height);
        self.shooting.retain(|s| {
            let alive = (s.age as f32) < s.max_age;
            let inside =
                s.x > -SHOOTING_MARGIN && s.x < w + SHOOTING_MARGIN && s.y < h + SHOOTING_MARGIN;
            if !(alive && inside) {
                tracing::trace!(age = s.age, x = s.x, y = s.y, "shooting star gone");
            }
            alive && inside
        });
    }

    fn spawn_shooting_star(&mut self, rng: &mut StdRng) {
        let s = ShootingStar {
            x: rng.gen::<f32>() * self.width,
            y: rng.gen::<f32>() * self.height * 0.4,
            vx: -(5.0 + rng.gen::<f32>() * 4.0),
            vy: (5.0 + rng.gen::<f32>() * 4.0) * 0.6,
            age: 0,
            max_age: 80.0 + rng.gen::<f32>() * 60.0,
        };
        tracing::trace!(x = s.x, y = s.y, max_age = s.max_age, "shooting star");
        self.shooting.push(s);
    }

    pub(crate) fn draw(&self, c: &mut PixelCanvas) {
        let (w, h) = (self.width, self.height);
        c.clear();
        c.blend = Blend::SourceOver;
        c.global_alpha = 1.0;

        let bg = Paint::linear(
            0.0,
            0.0,
            0.0,
            h,
            &[(0.0, rgba(10, 10, 25, 0.9)), (1.0, rgba(5, 5, 15, 0.99))],
        );
        c.fill_rect(0.0, 0.0, w, h, &bg);

        self.draw_galaxy_band(c);
        self.draw_planets(c);

        for s in &self.stars {
            c.fill_circle(s.x, s.y, s.r, &Paint::Solid(rgba(255, 255, 255, s.alpha)));
        }

        for l in &self.links {
            let (a, b) = (self.stars[l.a], self.stars[l.b]);
            c.stroke_line(a.x, a.y, b.x, b.y, 1.0, &Paint::Solid(rgba(140, 170, 255, l.alpha)));
        }

        let (trail_len, width) = if self.mobile { (50.0, 2.0) } else { (70.0, 3.0) };
        for s in &self.shooting {
            let tx = s.x - s.vx * (trail_len / 10.0);
            let ty = s.y - s.vy * (trail_len / 10.0);
            let trail = Paint::linear(
                tx,
                ty,
                s.x,
                s.y,
                &[(0.0, rgba(255, 255, 255, 0.0)), (1.0, rgba(230, 240, 255, 1.0))],
            );
            c.stroke_line(tx, ty, s.x, s.y, width, &trail);
            c.fill_circle(s.x, s.y, width, &Paint::Solid(rgba(255, 255, 255, 1.0)));
        }

        self.draw_moon(c);
    }

    fn draw_galaxy_band(&self, c: &mut PixelCanvas) {
        let band_w = self.width * 1.6;
        let band_h = if self.mobile { 100.0 } else { 140.0 };
        let paint = Paint::linear(
            -band_w / 2.0,
            0.0,
            band_w / 2.0,
            0.0,
            &[
                (0.0, rgba(40, 40, 80, 0.0)),
                (0.5, rgba(120, 140, 220, 0.18)),
                (1.0, rgba(40, 40, 80, 0.0)),
            ],
        );
        c.global_alpha = 0.8;
        c.fill_rotated_rect(self.width / 2.0, self.height / 2.0, -0.4, band_w, band_h, &paint);
        c.global_alpha = 1.0;
    }

    fn draw_planets(&self, c: &mut PixelCanvas) {
        for p in &self.planets {
            let glow = Paint::Radial {
                x0: p.x,
                y0: p.y,
                r0: p.r * 0.2,
                r1: p.r * 2.2,
                inner: rgba(255, 255, 255, 0.18),
                outer: rgba(0, 0, 0, 0.0),
            };
            c.fill_circle(p.x, p.y, p.r * 2.2, &glow);

            let body = Paint::Radial {
                x0: p.x - p.r * 0.3,
                y0: p.y - p.r * 0.4,
                r0: p.r * 0.2,
                r1: p.r,
                inner: p.light,
                outer: p.shade,
            };
            c.fill_circle(p.x, p.y, p.r, &body);

            if p.ring {
                c.stroke_ellipse(
                    p.x,
                    p.y,
                    p.r * 1.6,
                    p.r * 0.5,
                    -0.7,
                    1.3,
                    rgba(210, 220, 255, 0.5),
                );
            }
        }
    }

    /// Centre and radius of the moon disc.
    pub(crate) fn moon_geometry(&self) -> (f32, f32, f32) {
        let (padding, radius) = if self.mobile { (40.0, 24.0) } else { (60.0, 32.0) };
        (self.width - padding, padding + 10.0, radius)
    }

    fn draw_moon(&self, c: &mut PixelCanvas) {
        let (x, y, r) = self.moon_geometry();

        let glow = Paint::Radial {
            x0: x,
            y0: y,
            r0: r * 0.3,
            r1: r * 2.4,
            inner: rgba(220, 230, 255, 0.45),
            outer: rgba(5, 5, 15, 0.0),
        };
        c.fill_circle(x, y, r * 2.4, &glow);

        let disc = Paint::Radial {
            x0: x - r * 0.3,
            y0: y - r * 0.4,
            r0: r * 0.2,
            r1: r,
            inner: rgba(255, 255, 255, 0.98),
            outer: rgba(210, 220, 250, 0.92),
        };
        c.fill_circle(x, y, r, &disc);

        c.blend = Blend::DestinationOut;
        let offset = occluder_offset(self.moon_phase, r);
        c.fill_circle(x + offset, y, r, &Paint::Solid(rgba(0, 0, 0, 1.0)));

        c.blend = Blend::Multiply;
        c.fill_circle(x, y, r, &Paint::Solid(rgba(90, 100, 140, 0.45)));
        c.blend = Blend::SourceOver;
    }
}

/// Stage layer around [`Sky`]: updates and redraws on every other frame.
pub(crate) struct SkyLayer {
    sky: Option<Sky>,
    canvas: Option<PixelCanvas>,
    frame_count: u64,
}

impl SkyLayer {
    pub(crate) fn new() -> Self {
        Self {
            sky: None,
            canvas: None,
            frame_count: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn sky(&self) -> Option<&Sky> {
        self.sky.as_ref()
    }
}

impl Layer for SkyLayer {
    fn name(&self) -> &'static str {
        "sky"
    }

    fn reset(&mut self, surface: &Surface, rng: &mut StdRng, now: DateTime<Utc>) {
        self.sky = Some(Sky::generate(surface, rng, now));
        self.canvas = Some(PixelCanvas::new(surface));
    }

    fn frame(&mut self, rng: &mut StdRng) -> bool {
        self.frame_count += 1;
        if self.frame_count % 2 != 0 {
            return false;
        }
        let (Some(sky), Some(canvas)) = (self.sky.as_mut(), self.canvas.as_mut()) else {
            return false;
        };
        sky.update(rng);
        sky.draw(canvas);
        true
    }

    fn canvas(&self) -> Option<&PixelCanvas> {
        self.canvas.as_ref()
    }

    fn opacity(&self) -> f32 {
        LAYER_OPACITY
    }

    fn status(&self) -> Option<String> {
        let sky = self.sky.as_ref()?;
        Some(format!(
            "{} ({:.0}%)",
            phase_name(sky.moon_phase),
            sky.moon_phase * 100.0
        ))
    }
}
