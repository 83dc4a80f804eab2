//! A small RGBA raster with just enough 2D drawing to paint the scene.
//!
//! Shapes are described in logical pixels and rasterised at the surface's
//! backing resolution. Every primitive goes through one blend routine so the
//! compositing mode and global alpha behave the same for all of them.

use crate::surface::Surface;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pixel {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// Straight (non-premultiplied) colour with a fractional alpha.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Rgba {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: f32,
}

pub(crate) const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Rgba {
    Rgba { r, g, b, a }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lerp_u8(a: u8, b: u8, t: f32) -> u8 {
    lerp(a as f32, b as f32, t).round().clamp(0.0, 255.0) as u8
}

impl Rgba {
    pub(crate) fn lerp(self, o: Rgba, t: f32) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        Rgba {
            r: lerp_u8(self.r, o.r, t),
            g: lerp_u8(self.g, o.g, t),
            b: lerp_u8(self.b, o.b, t),
            a: lerp(self.a, o.a, t),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Blend {
    SourceOver,
    /// Erase the destination where the source is opaque.
    DestinationOut,
    Multiply,
}

#[derive(Clone, Debug)]
pub(crate) struct ColorStop {
    pub(crate) at: f32,
    pub(crate) color: Rgba,
}

#[derive(Clone, Debug)]
pub(crate) enum Paint {
    Solid(Rgba),
    /// Gradient along the segment (x0,y0)->(x1,y1).
    Linear {
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        stops: Vec<ColorStop>,
    },
    /// Two-circle radial gradient. The colour ramps with the distance from
    /// the inner centre, which approximates the focal form for small offsets.
    Radial {
        x0: f32,
        y0: f32,
        r0: f32,
        r1: f32,
        inner: Rgba,
        outer: Rgba,
    },
}

fn sample_stops(stops: &[ColorStop], t: f32) -> Rgba {
    let Some(first) = stops.first() else {
        return rgba(0, 0, 0, 0.0);
    };
    if t <= first.at {
        return first.color;
    }
    for pair in stops.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if t <= b.at {
            let span = (b.at - a.at).max(1e-6);
            return a.color.lerp(b.color, (t - a.at) / span);
        }
    }
    stops[stops.len() - 1].color
}

impl Paint {
    pub(crate) fn linear(x0: f32, y0: f32, x1: f32, y1: f32, stops: &[(f32, Rgba)]) -> Paint {
        Paint::Linear {
            x0,
            y0,
            x1,
            y1,
            stops: stops
                .iter()
                .map(|&(at, color)| ColorStop { at, color })
                .collect(),
        }
    }

    pub(crate) fn color_at(&self, x: f32, y: f32) -> Rgba {
        match self {
            Paint::Solid(c) => *c,
            Paint::Linear {
                x0,
                y0,
                x1,
                y1,
                stops,
            } => {
                let (dx, dy) = (x1 - x0, y1 - y0);
                let len2 = (dx * dx + dy * dy).max(1e-6);
                let t = ((x - x0) * dx + (y - y0) * dy) / len2;
                sample_stops(stops, t.clamp(0.0, 1.0))
            }
            Paint::Radial {
                x0,
                y0,
                r0,
                r1,
                inner,
                outer,
            } => {
                let d = ((x - x0) * (x - x0) + (y - y0) * (y - y0)).sqrt();
                let t = (d - r0) / (r1 - r0).max(1e-6);
                inner.lerp(*outer, t)
            }
        }
    }
}

fn segment_distance(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 <= 1e-9 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + dx * t, ay + dy * t);
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

pub(crate) struct PixelCanvas {
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) px: Vec<Pixel>,
    scale_x: f32,
    scale_y: f32,
    pub(crate) global_alpha: f32,
    pub(crate) blend: Blend,
    coverage: Vec<f32>,
}

impl PixelCanvas {
    pub(crate) fn new(surface: &Surface) -> Self {
        let (w, h) = surface.backing_size();
        let n = (w as usize) * (h as usize);
        Self {
            w,
            h,
            px: vec![Pixel::default(); n],
            scale_x: surface.scale_x,
            scale_y: surface.scale_y,
            global_alpha: 1.0,
            blend: Blend::SourceOver,
            coverage: vec![0.0; n],
        }
    }

    pub(crate) fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }

    pub(crate) fn clear(&mut self) {
        self.px.fill(Pixel::default());
    }

    /// Size of one raster pixel in logical units (the larger axis).
    fn texel(&self) -> f32 {
        (1.0 / self.scale_x).max(1.0 / self.scale_y)
    }

    fn center_of(&self, x: u32, y: u32) -> (f32, f32) {
        (
            (x as f32 + 0.5) / self.scale_x,
            (y as f32 + 0.5) / self.scale_y,
        )
    }

    /// Raster rectangle covering a logical bounding box, clipped.
    fn raster_bounds(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Option<(u32, u32, u32, u32)> {
        let rx0 = (x0 * self.scale_x).floor().max(0.0);
        let ry0 = (y0 * self.scale_y).floor().max(0.0);
        let rx1 = (x1 * self.scale_x).ceil().min(self.w as f32);
        let ry1 = (y1 * self.scale_y).ceil().min(self.h as f32);
        if rx0 >= rx1 || ry0 >= ry1 {
            return None;
        }
        Some((rx0 as u32, ry0 as u32, rx1 as u32, ry1 as u32))
    }

    fn put(&mut self, i: usize, src: Rgba, coverage: f32) {
        let sa = (src.a * self.global_alpha * coverage).clamp(0.0, 1.0);
        if sa <= 0.0 {
            return;
        }
        let dst = self.px[i];
        let da = dst.a as f32 / 255.0;

        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

        self.px[i] = match self.blend {
            Blend::SourceOver => {
                let out_a = sa + da * (1.0 - sa);
                if out_a <= 1e-6 {
                    Pixel::default()
                } else {
                    let mix = |sc: u8, dc: u8| {
                        let sc = sc as f32 / 255.0;
                        let dc = dc as f32 / 255.0;
                        to_u8((sc * sa + dc * da * (1.0 - sa)) / out_a)
                    };
                    Pixel {
                        r: mix(src.r, dst.r),
                        g: mix(src.g, dst.g),
                        b: mix(src.b, dst.b),
                        a: to_u8(out_a),
                    }
                }
            }
            Blend::DestinationOut => Pixel {
                a: to_u8(da * (1.0 - sa)),
                ..dst
            },
            Blend::Multiply => {
                let out_a = sa + da * (1.0 - sa);
                if out_a <= 1e-6 {
                    Pixel::default()
                } else {
                    let mix = |sc: u8, dc: u8| {
                        let sc = sc as f32 / 255.0;
                        let dc = dc as f32 / 255.0;
                        let premul = sa * (1.0 - da) * sc + sa * da * sc * dc + (1.0 - sa) * da * dc;
                        to_u8(premul / out_a)
                    };
                    Pixel {
                        r: mix(src.r, dst.r),
                        g: mix(src.g, dst.g),
                        b: mix(src.b, dst.b),
                        a: to_u8(out_a),
                    }
                }
            }
        };
    }

    /// Axis aligned fill in logical coordinates.
    pub(crate) fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, paint: &Paint) {
        let Some((x0, y0, x1, y1)) = self.raster_bounds(x, y, x + w, y + h) else {
            return;
        };
        for ry in y0..y1 {
            for rx in x0..x1 {
                let (lx, ly) = self.center_of(rx, ry);
                let c = paint.color_at(lx, ly);
                let i = self.idx(rx, ry);
                self.put(i, c, 1.0);
            }
        }
    }

    /// Fill a `w` x `h` rectangle centred on (cx, cy) and rotated by `angle`.
    /// `paint` is evaluated in the rectangle's own frame, origin at its centre.
    pub(crate) fn fill_rotated_rect(
        &mut self,
        cx: f32,
        cy: f32,
        angle: f32,
        w: f32,
        h: f32,
        paint: &Paint,
    ) {
        let (s, c) = angle.sin_cos();
        let ext_x = (w * 0.5 * c).abs() + (h * 0.5 * s).abs();
        let ext_y = (w * 0.5 * s).abs() + (h * 0.5 * c).abs();
        let Some((x0, y0, x1, y1)) =
            self.raster_bounds(cx - ext_x, cy - ext_y, cx + ext_x, cy + ext_y)
        else {
            return;
        };
        for ry in y0..y1 {
            for rx in x0..x1 {
                let (px, py) = self.center_of(rx, ry);
                let (dx, dy) = (px - cx, py - cy);
                // inverse rotation into the rect's frame
                let lx = dx * c + dy * s;
                let ly = -dx * s + dy * c;
                if lx.abs() > w * 0.5 || ly.abs() > h * 0.5 {
                    continue;
                }
                let col = paint.color_at(lx, ly);
                let i = self.idx(rx, ry);
                self.put(i, col, 1.0);
            }
        }
    }

    /// Anti-aliased disc. Radii below half a raster pixel are widened so
    /// small shapes stay visible.
    pub(crate) fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, paint: &Paint) {
        let texel = self.texel();
        let r = r.max(texel * 0.5);
        let Some((x0, y0, x1, y1)) = self.raster_bounds(cx - r, cy - r, cx + r, cy + r) else {
            return;
        };
        for ry in y0..y1 {
            for rx in x0..x1 {
                let (px, py) = self.center_of(rx, ry);
                let d = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt();
                let cov = ((r - d) / texel + 0.5).clamp(0.0, 1.0);
                if cov <= 0.0 {
                    continue;
                }
                let col = paint.color_at(px, py);
                let i = self.idx(rx, ry);
                self.put(i, col, cov);
            }
        }
    }

    /// Stroke a connected path. Coverage is accumulated first so joints are
    /// painted once.
    pub(crate) fn stroke_polyline(&mut self, points: &[(f32, f32)], width: f32, paint: &Paint) {
        if points.len() < 2 {
            return;
        }
        let texel = self.texel();
        let hw = (width * 0.5).max(texel * 0.5);

        let (mut bx0, mut by0, mut bx1, mut by1) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for &(x, y) in points {
            bx0 = bx0.min(x);
            by0 = by0.min(y);
            bx1 = bx1.max(x);
            by1 = by1.max(y);
        }
        let Some((x0, y0, x1, y1)) = self.raster_bounds(bx0 - hw, by0 - hw, bx1 + hw, by1 + hw)
        else {
            return;
        };

        for seg in points.windows(2) {
            let ((ax, ay), (bx, by)) = (seg[0], seg[1]);
            let Some((sx0, sy0, sx1, sy1)) = self.raster_bounds(
                ax.min(bx) - hw,
                ay.min(by) - hw,
                ax.max(bx) + hw,
                ay.max(by) + hw,
            ) else {
                continue;
            };
            for ry in sy0..sy1 {
                for rx in sx0..sx1 {
                    let (px, py) = self.center_of(rx, ry);
                    let d = segment_distance(px, py, ax, ay, bx, by);
                    let cov = ((hw - d) / texel + 0.5).clamp(0.0, 1.0);
                    let i = self.idx(rx, ry);
                    if cov > self.coverage[i] {
                        self.coverage[i] = cov;
                    }
                }
            }
        }

        for ry in y0..y1 {
            for rx in x0..x1 {
                let i = self.idx(rx, ry);
                let cov = std::mem::take(&mut self.coverage[i]);
                if cov <= 0.0 {
                    continue;
                }
                let (px, py) = self.center_of(rx, ry);
                let col = paint.color_at(px, py);
                self.put(i, col, cov);
            }
        }
    }

    pub(crate) fn stroke_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, paint: &Paint) {
        self.stroke_polyline(&[(x0, y0), (x1, y1)], width, paint);
    }

    /// Outline of an ellipse with radii (rx, ry) rotated by `angle`.
    pub(crate) fn stroke_ellipse(
        &mut self,
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        angle: f32,
        width: f32,
        color: Rgba,
    ) {
        let texel = self.texel();
        let hw = (width * 0.5).max(texel * 0.5);
        let ext = rx.max(ry) + hw;
        let Some((x0, y0, x1, y1)) = self.raster_bounds(cx - ext, cy - ext, cx + ext, cy + ext)
        else {
            return;
        };
        let (s, c) = angle.sin_cos();
        let (rx, ry) = (rx.max(1e-3), ry.max(1e-3));
        for py_r in y0..y1 {
            for px_r in x0..x1 {
                let (px, py) = self.center_of(px_r, py_r);
                let (dx, dy) = (px - cx, py - cy);
                let lx = dx * c + dy * s;
                let ly = -dx * s + dy * c;
                let k = ((lx / rx).powi(2) + (ly / ry).powi(2)).sqrt();
                if k <= 1e-6 {
                    continue;
                }
                // first-order distance to the curve: |f| / |grad f|
                let gx = lx / (rx * rx * k);
                let gy = ly / (ry * ry * k);
                let d = (k - 1.0).abs() / (gx * gx + gy * gy).sqrt().max(1e-6);
                let cov = ((hw - d) / texel + 0.5).clamp(0.0, 1.0);
                if cov <= 0.0 {
                    continue;
                }
                let i = self.idx(px_r, py_r);
                self.put(i, color, cov);
            }
        }
    }

    /// Pixel at a logical position, if inside the raster.
    #[cfg(test)]
    pub(crate) fn sample(&self, x: f32, y: f32) -> Option<Pixel> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let rx = (x * self.scale_x) as u32;
        let ry = (y * self.scale_y) as u32;
        if rx >= self.w || ry >= self.h {
            return None;
        }
        Some(self.px[self.idx(rx, ry)])
    }
}
