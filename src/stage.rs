//! Mounting, frame scheduling and resize fan-out for decorative layers.
//!
//! This mirrors a browser page: every mounted layer asks for its next frame
//! only after the current one has finished, listens for resizes, and on
//! unmount gives up both its listener and its outstanding frame request.

use crate::canvas::PixelCanvas;
use crate::config::Settings;
use crate::surface::{Surface, Viewport};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;

pub(crate) type LayerId = u64;

pub(crate) trait Layer {
    fn name(&self) -> &'static str;

    /// Throw away every entity and rebuild for `surface`.
    fn reset(&mut self, surface: &Surface, rng: &mut StdRng, now: DateTime<Utc>);

    /// One animation frame. Returns `true` if the layer redrew.
    fn frame(&mut self, rng: &mut StdRng) -> bool;

    fn canvas(&self) -> Option<&PixelCanvas>;

    /// Opacity the layer is composited with.
    fn opacity(&self) -> f32;

    /// Stacking order; higher draws on top.
    fn z_index(&self) -> i32 {
        0
    }

    fn status(&self) -> Option<String> {
        None
    }
}

struct Mounted {
    id: LayerId,
    layer: Box<dyn Layer>,
}

pub(crate) struct Stage {
    settings: Settings,
    clock: fn() -> DateTime<Utc>,
    viewport: Viewport,
    layers: Vec<Mounted>,
    resize_listeners: Vec<LayerId>,
    /// layers with a frame requested for the next tick
    pending: Vec<LayerId>,
    next_id: LayerId,
}

impl Stage {
    pub(crate) fn new(settings: Settings, viewport: Viewport) -> Self {
        Self::with_clock(settings, viewport, Utc::now)
    }

    pub(crate) fn with_clock(
        settings: Settings,
        viewport: Viewport,
        clock: fn() -> DateTime<Utc>,
    ) -> Self {
        Self {
            settings,
            clock,
            viewport,
            layers: Vec::new(),
            resize_listeners: Vec::new(),
            pending: Vec::new(),
            next_id: 1,
        }
    }

    pub(crate) fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Attach a layer. If there is no surface to draw on the layer is
    /// dropped without complaint and `None` comes back.
    pub(crate) fn mount(&mut self, mut layer: Box<dyn Layer>, rng: &mut StdRng) -> Option<LayerId> {
        let Some(surface) = Surface::measure(self.viewport, &self.settings) else {
            tracing::debug!(layer = layer.name(), "no drawing surface; not mounting");
            return None;
        };

        let id = self.next_id;
        self.next_id += 1;

        layer.reset(&surface, rng, (self.clock)());
        tracing::debug!(
            layer = layer.name(),
            id,
            width = surface.width,
            height = surface.height,
            ratio = surface.pixel_ratio,
            "mounted"
        );
        self.layers.push(Mounted { id, layer });
        self.resize_listeners.push(id);
        self.request_frame(id);
        Some(id)
    }

    /// Detach a layer: its resize listener goes, its pending frame is
    /// cancelled and its state is dropped. Unknown ids are ignored.
    pub(crate) fn unmount(&mut self, id: LayerId) {
        self.resize_listeners.retain(|&l| l != id);
        self.pending.retain(|&l| l != id);
        if let Some(pos) = self.layers.iter().position(|m| m.id == id) {
            let m = self.layers.remove(pos);
            tracing::debug!(layer = m.layer.name(), id, "unmounted");
        }
    }

    fn request_frame(&mut self, layer: LayerId) {
        if !self.pending.contains(&layer) {
            self.pending.push(layer);
        }
    }

    /// Run every frame that was requested before this call. Each layer
    /// schedules its next frame only once its current one has returned.
    /// Returns how many layers redrew.
    pub(crate) fn run_frame(&mut self, rng: &mut StdRng) -> usize {
        let due = std::mem::take(&mut self.pending);
        let mut drawn = 0;
        for id in due {
            let Some(m) = self.layers.iter_mut().find(|m| m.id == id) else {
                continue;
            };
            if m.layer.frame(rng) {
                drawn += 1;
            }
            self.request_frame(id);
        }
        drawn
    }

    /// Re-measure and rebuild every listening layer in place.
    pub(crate) fn resize(&mut self, viewport: Viewport, rng: &mut StdRng) {
        self.viewport = viewport;
        let Some(surface) = Surface::measure(viewport, &self.settings) else {
            tracing::debug!(?viewport, "resize to an empty viewport; keeping old scene");
            return;
        };
        let now = (self.clock)();
        for id in self.resize_listeners.clone() {
            if let Some(m) = self.layers.iter_mut().find(|m| m.id == id) {
                m.layer.reset(&surface, rng, now);
            }
        }
        tracing::debug!(
            cols = viewport.cols,
            rows = viewport.rows,
            layers = self.resize_listeners.len(),
            "resized"
        );
    }

    /// Layer canvases bottom first, ties broken by mount order.
    pub(crate) fn canvases(&self) -> Vec<(&PixelCanvas, f32)> {
        let mut stacked: Vec<&Mounted> = self.layers.iter().collect();
        stacked.sort_by_key(|m| m.layer.z_index());
        stacked
            .into_iter()
            .filter_map(|m| m.layer.canvas().map(|c| (c, m.layer.opacity())))
            .collect()
    }

    pub(crate) fn statuses(&self) -> Vec<String> {
        self.layers.iter().filter_map(|m| m.layer.status()).collect()
    }

    #[cfg(test)]
    pub(crate) fn is_mounted(&self, id: LayerId) -> bool {
        self.layers.iter().any(|m| m.id == id)
    }

    #[cfg(test)]
    pub(crate) fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn resize_listener_count(&self) -> usize {
        self.resize_listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct Counts {
        frames: Cell<u32>,
        resets: Cell<u32>,
    }

    struct Probe {
        counts: Rc<Counts>,
    }

    impl Layer for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }
        fn reset(&mut self, _: &Surface, _: &mut StdRng, _: DateTime<Utc>) {
            self.counts.resets.set(self.counts.resets.get() + 1);
        }
        fn frame(&mut self, _: &mut StdRng) -> bool {
            self.counts.frames.set(self.counts.frames.get() + 1);
            true
        }
        fn canvas(&self) -> Option<&PixelCanvas> {
            None
        }
        fn opacity(&self) -> f32 {
            1.0
        }
    }

    fn probe() -> (Box<dyn Layer>, Rc<Counts>) {
        let counts = Rc::new(Counts::default());
        (
            Box::new(Probe {
                counts: counts.clone(),
            }),
            counts,
        )
    }

    fn stage() -> Stage {
        Stage::new(Settings::default(), Viewport { cols: 100, rows: 30 })
    }

    #[test]
    fn mount_resets_and_schedules_one_frame() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut st = stage();
        let (layer, counts) = probe();
        let id = st.mount(layer, &mut rng).unwrap();
        assert!(st.is_mounted(id));
        assert_eq!(counts.resets.get(), 1);
        assert_eq!(st.pending_frames(), 1);
        assert_eq!(st.resize_listener_count(), 1);

        for _ in 0..5 {
            assert_eq!(st.run_frame(&mut rng), 1);
            assert_eq!(st.pending_frames(), 1);
        }
        assert_eq!(counts.frames.get(), 5);
    }

    #[test]
    fn mounting_without_a_surface_is_a_silent_no_op() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut st = Stage::new(Settings::default(), Viewport { cols: 0, rows: 0 });
        let (layer, counts) = probe();
        assert!(st.mount(layer, &mut rng).is_none());
        assert_eq!(st.run_frame(&mut rng), 0);
        assert_eq!(counts.resets.get(), 0);
        assert_eq!(counts.frames.get(), 0);
        assert_eq!(st.pending_frames(), 0);
    }

    #[test]
    fn unmount_cancels_frames_and_listener() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut st = stage();
        let (a, a_counts) = probe();
        let (b, b_counts) = probe();
        let a_id = st.mount(a, &mut rng).unwrap();
        let _b_id = st.mount(b, &mut rng).unwrap();
        st.run_frame(&mut rng);

        st.unmount(a_id);
        assert!(!st.is_mounted(a_id));
        assert_eq!(st.pending_frames(), 1);
        assert_eq!(st.resize_listener_count(), 1);

        for _ in 0..3 {
            st.run_frame(&mut rng);
        }
        st.resize(Viewport { cols: 120, rows: 40 }, &mut rng);

        assert_eq!(a_counts.frames.get(), 1);
        assert_eq!(a_counts.resets.get(), 1);
        assert_eq!(b_counts.frames.get(), 4);
        assert_eq!(b_counts.resets.get(), 2);
    }

    #[test]
    fn unmounting_twice_is_harmless() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut st = stage();
        let (a, _) = probe();
        let id = st.mount(a, &mut rng).unwrap();
        st.unmount(id);
        st.unmount(id);
        assert_eq!(st.pending_frames(), 0);
    }

    #[test]
    fn resize_to_nothing_keeps_layers() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut st = stage();
        let (a, counts) = probe();
        st.mount(a, &mut rng).unwrap();
        st.resize(Viewport { cols: 0, rows: 10 }, &mut rng);
        assert_eq!(counts.resets.get(), 1);
        assert_eq!(st.run_frame(&mut rng), 1);
    }

    #[test]
    fn real_layers_stack_by_z_index_and_read_the_clock() {
        use crate::chart::ChartLayer;
        use crate::moon::reference_new_moon;
        use crate::sky::SkyLayer;

        let mut rng = StdRng::seed_from_u64(9);
        let mut st = Stage::with_clock(
            Settings::default(),
            Viewport { cols: 60, rows: 20 },
            reference_new_moon,
        );
        st.mount(Box::new(ChartLayer::new()), &mut rng).unwrap();
        st.mount(Box::new(SkyLayer::new()), &mut rng).unwrap();
        st.run_frame(&mut rng);
        st.run_frame(&mut rng);

        let opacities: Vec<f32> = st.canvases().iter().map(|&(_, o)| o).collect();
        assert_eq!(opacities, vec![0.55, 0.9]);
        assert_eq!(st.statuses(), vec!["new moon (0%)".to_string()]);
    }

    /// Forwards to a sky layer the test keeps a handle on.
    struct SharedSky(Rc<RefCell<crate::sky::SkyLayer>>);

    impl Layer for SharedSky {
        fn name(&self) -> &'static str {
            "shared-sky"
        }
        fn reset(&mut self, surface: &Surface, rng: &mut StdRng, now: DateTime<Utc>) {
            self.0.borrow_mut().reset(surface, rng, now);
        }
        fn frame(&mut self, rng: &mut StdRng) -> bool {
            self.0.borrow_mut().frame(rng)
        }
        fn canvas(&self) -> Option<&PixelCanvas> {
            None
        }
        fn opacity(&self) -> f32 {
            self.0.borrow().opacity()
        }
    }

    #[test]
    fn resize_across_the_breakpoint_repopulates_the_sky() {
        let mut rng = StdRng::seed_from_u64(4);
        let sky = Rc::new(RefCell::new(crate::sky::SkyLayer::new()));
        let mut st = Stage::new(Settings::default(), Viewport { cols: 60, rows: 30 });
        st.mount(Box::new(SharedSky(sky.clone())), &mut rng).unwrap();

        let population = |sky: &Rc<RefCell<crate::sky::SkyLayer>>| {
            let layer = sky.borrow();
            let s = layer.sky().unwrap();
            (s.stars.len(), s.planets.len(), s.width)
        };
        assert_eq!(population(&sky), (70, 2, 480.0));

        st.run_frame(&mut rng);
        st.resize(Viewport { cols: 150, rows: 30 }, &mut rng);
        assert_eq!(population(&sky), (110, 3, 1200.0));

        st.resize(Viewport { cols: 60, rows: 30 }, &mut rng);
        assert_eq!(population(&sky), (70, 2, 480.0));
    }
}
