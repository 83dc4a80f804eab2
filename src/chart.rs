//! Slow sine "chart lines" drifting behind the hero title.

use crate::canvas::{rgba, Paint, PixelCanvas};
use crate::stage::Layer;
use crate::surface::Surface;
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng};
use std::f32::consts::TAU;

pub(crate) const LINE_COUNT: usize = 3;
pub(crate) const POINTS_PER_LINE: usize = 50;

const LAYER_OPACITY: f32 = 0.9;
const STROKE_WIDTH: f32 = 1.5;

#[derive(Clone, Debug)]
pub(crate) struct ChartLine {
    /// vertical centre of the wave
    pub(crate) baseline: f32,
    pub(crate) speed: f32,
    pub(crate) amplitude: f32,
    pub(crate) frequency: f32,
    pub(crate) offset: f32,
    pub(crate) points: Vec<(f32, f32)>,
}

impl ChartLine {
    pub(crate) fn random(width: f32, height: f32, rng: &mut StdRng) -> Self {
        let baseline = rng.gen::<f32>() * height;
        let step = width / POINTS_PER_LINE as f32;
        Self {
            baseline,
            speed: 0.5 + rng.gen::<f32>(),
            amplitude: 50.0 + rng.gen::<f32>() * 100.0,
            frequency: 0.01 + rng.gen::<f32>() * 0.02,
            offset: rng.gen::<f32>() * TAU,
            points: (0..POINTS_PER_LINE)
                .map(|i| (step * i as f32, baseline))
                .collect(),
        }
    }

    pub(crate) fn update(&mut self) {
        self.offset += self.speed * 0.02;
        for (i, p) in self.points.iter_mut().enumerate() {
            p.1 = self.baseline + (i as f32 * self.frequency + self.offset).sin() * self.amplitude;
        }
    }
}

pub(crate) struct ChartLayer {
    lines: Vec<ChartLine>,
    canvas: Option<PixelCanvas>,
}

impl ChartLayer {
    pub(crate) fn new() -> Self {
        Self {
            lines: Vec::new(),
            canvas: None,
        }
    }
}

impl Layer for ChartLayer {
    fn name(&self) -> &'static str {
        "chart"
    }

    fn reset(&mut self, surface: &Surface, rng: &mut StdRng, _now: DateTime<Utc>) {
        // The hero only spans the viewport, not the content behind it.
        self.lines = (0..LINE_COUNT)
            .map(|_| ChartLine::random(surface.width, surface.viewport_height, rng))
            .collect();
        self.canvas = Some(PixelCanvas::new(surface));
        tracing::debug!(lines = self.lines.len(), "chart lines regenerated");
    }

    fn frame(&mut self, _rng: &mut StdRng) -> bool {
        let Some(canvas) = self.canvas.as_mut() else {
            return false;
        };
        canvas.clear();
        let stroke = Paint::Solid(rgba(255, 255, 255, 0.28));
        for line in &mut self.lines {
            line.update();
            canvas.stroke_polyline(&line.points, STROKE_WIDTH, &stroke);
        }
        true
    }

    fn canvas(&self) -> Option<&PixelCanvas> {
        self.canvas.as_ref()
    }

    fn opacity(&self) -> f32 {
        LAYER_OPACITY
    }

    fn z_index(&self) -> i32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::surface::{test_surface, Viewport};
    use rand::SeedableRng;

    #[test]
    fn points_follow_the_sine() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut line = ChartLine::random(1000.0, 600.0, &mut rng);
        for _ in 0..37 {
            line.update();
        }
        for (i, &(x, y)) in line.points.iter().enumerate() {
            let want = line.baseline + (i as f32 * line.frequency + line.offset).sin() * line.amplitude;
            assert!((y - want).abs() < 1e-3, "point {i}: {y} vs {want}");
            assert!((x - 20.0 * i as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn offset_advances_with_speed() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut line = ChartLine::random(800.0, 600.0, &mut rng);
        let before = line.offset;
        line.update();
        assert!((line.offset - before - line.speed * 0.02).abs() < 1e-6);
    }

    #[test]
    fn random_parameters_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let l = ChartLine::random(800.0, 600.0, &mut rng);
            assert!((0.0..600.0).contains(&l.baseline));
            assert!((0.5..1.5).contains(&l.speed));
            assert!((50.0..150.0).contains(&l.amplitude));
            assert!((0.01..0.03).contains(&l.frequency));
            assert!((0.0..TAU).contains(&l.offset));
            assert_eq!(l.points.len(), POINTS_PER_LINE);
        }
    }

    #[test]
    fn reset_builds_three_lines_and_draws_each_frame() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut layer = ChartLayer::new();
        assert!(!layer.frame(&mut rng));
        layer.reset(&test_surface(800.0, 600.0), &mut rng, Utc::now());
        assert_eq!(layer.lines.len(), LINE_COUNT);
        assert!(layer.frame(&mut rng));
        assert!(layer.frame(&mut rng));
        assert!(layer.canvas().unwrap().px.iter().any(|p| p.a > 0));

        layer.reset(&test_surface(400.0, 300.0), &mut rng, Utc::now());
        assert_eq!(layer.lines.len(), LINE_COUNT);
        assert!(layer.lines.iter().all(|l| l.baseline < 300.0));
    }

    #[test]
    fn lines_stay_in_the_viewport_when_content_is_taller() {
        let settings = Settings {
            content_height: 3000.0,
            ..Settings::default()
        };
        let surface = Surface::measure(Viewport { cols: 120, rows: 30 }, &settings).unwrap();
        assert_eq!(surface.height, 3000.0);

        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut layer = ChartLayer::new();
            layer.reset(&surface, &mut rng, Utc::now());
            for l in &layer.lines {
                assert!((0.0..480.0).contains(&l.baseline), "seed {seed}: {}", l.baseline);
            }
        }
    }
}
