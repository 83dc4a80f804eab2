use crate::config::Settings;

/// Width below which the scene switches to its reduced population.
pub(crate) const MOBILE_BREAKPOINT: f32 = 768.0;
/// Upper bound on the density used for the backing raster.
pub(crate) const MAX_PIXEL_RATIO: f32 = 1.5;
/// Tallest content the sky will stretch to cover, in logical pixels.
pub(crate) const MAX_CONTENT_HEIGHT: f32 = 20_000.0;

/// Terminal size in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Viewport {
    pub(crate) cols: u16,
    pub(crate) rows: u16,
}

/// A measured drawing area. `width`/`height` are logical pixels; the
/// raster behind it is braille dots (2x4 per cell) times `pixel_ratio`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Surface {
    pub(crate) width: f32,
    pub(crate) height: f32,
    /// visible part of `height`; content below it is scrolled off
    pub(crate) viewport_height: f32,
    pub(crate) pixel_ratio: f32,
    /// raster pixels per logical pixel, per axis
    pub(crate) scale_x: f32,
    pub(crate) scale_y: f32,
}

impl Surface {
    /// Measure the surface for `viewport`. `None` means there is nothing to
    /// draw into (a zero sized terminal).
    pub(crate) fn measure(viewport: Viewport, settings: &Settings) -> Option<Surface> {
        if viewport.cols == 0 || viewport.rows == 0 {
            return None;
        }
        let density = if settings.density > 0.0 {
            settings.density
        } else {
            1.0
        };
        let pixel_ratio = density.min(MAX_PIXEL_RATIO);

        let width = viewport.cols as f32 * settings.cell_width;
        let viewport_h = viewport.rows as f32 * settings.cell_height;
        let content_h = if settings.content_height.is_finite() {
            settings.content_height.min(MAX_CONTENT_HEIGHT)
        } else {
            0.0
        };
        let height = content_h.max(viewport_h);

        Some(Surface {
            width,
            height,
            viewport_height: viewport_h,
            pixel_ratio,
            scale_x: 2.0 * pixel_ratio / settings.cell_width,
            scale_y: 4.0 * pixel_ratio / settings.cell_height,
        })
    }

    pub(crate) fn is_mobile(&self) -> bool {
        self.width < MOBILE_BREAKPOINT
    }

    /// Raster dimensions of a canvas covering the whole surface.
    pub(crate) fn backing_size(&self) -> (u32, u32) {
        (
            (self.width * self.scale_x).ceil().max(1.0) as u32,
            (self.height * self.scale_y).ceil().max(1.0) as u32,
        )
    }
}

#[cfg(test)]
pub(crate) fn test_surface(width: f32, height: f32) -> Surface {
    Surface {
        width,
        height,
        viewport_height: height,
        pixel_ratio: 1.0,
        scale_x: 0.25,
        scale_y: 0.25,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn zero_sized_viewport_has_no_surface() {
        assert!(Surface::measure(Viewport { cols: 0, rows: 40 }, &settings()).is_none());
        assert!(Surface::measure(Viewport { cols: 80, rows: 0 }, &settings()).is_none());
    }

    #[test]
    fn density_is_capped() {
        let mut s = settings();
        s.density = 3.0;
        let surf = Surface::measure(Viewport { cols: 100, rows: 30 }, &s).unwrap();
        assert_eq!(surf.pixel_ratio, MAX_PIXEL_RATIO);
        assert_eq!(surf.backing_size(), (300, 180));

        s.density = 0.0;
        let surf = Surface::measure(Viewport { cols: 100, rows: 30 }, &s).unwrap();
        assert_eq!(surf.pixel_ratio, 1.0);
        assert_eq!(surf.backing_size(), (200, 120));
    }

    #[test]
    fn mobile_threshold_follows_logical_width() {
        let s = settings();
        let narrow = Surface::measure(Viewport { cols: 95, rows: 30 }, &s).unwrap();
        let wide = Surface::measure(Viewport { cols: 96, rows: 30 }, &s).unwrap();
        assert!(narrow.is_mobile());
        assert!(!wide.is_mobile());
    }

    #[test]
    fn content_taller_than_viewport_extends_surface() {
        let mut s = settings();
        s.content_height = 2000.0;
        let surf = Surface::measure(Viewport { cols: 100, rows: 30 }, &s).unwrap();
        assert_eq!(surf.height, 2000.0);
        assert_eq!(surf.viewport_height, 480.0);

        s.content_height = 10.0;
        let surf = Surface::measure(Viewport { cols: 100, rows: 30 }, &s).unwrap();
        assert_eq!(surf.height, 480.0);
    }

    #[test]
    fn runaway_content_height_is_bounded() {
        let mut s = settings();
        let vp = Viewport { cols: 25, rows: 30 };
        s.content_height = f32::INFINITY;
        let surf = Surface::measure(vp, &s).unwrap();
        assert_eq!(surf.height, 480.0);

        s.content_height = 1e12;
        let surf = Surface::measure(vp, &s).unwrap();
        assert_eq!(surf.height, MAX_CONTENT_HEIGHT);
        assert_eq!(surf.backing_size(), (50, 5000));
    }
}
