use tilewall_shared::grid::GridPos;

pub const HOVER_SCALE: f64 = 1.08;
pub const PRESS_SCALE: f64 = 0.95;
/// Fraction of the remaining distance covered by one 60 Hz frame.
pub const BLEND_PER_60HZ_FRAME: f64 = 0.18;

const ALPHA_SNAP: f64 = 0.02;
const SCALE_SNAP: f64 = 0.002;

/// Time constant (seconds) of the exponential approach.
pub fn blend_tau() -> f64 {
    -(1.0 / 60.0) / (1.0 - BLEND_PER_60HZ_FRAME).ln()
}

/// Blend factor for an elapsed time, independent of frame rate.
pub fn blend_factor(dt_secs: f64) -> f64 {
    if dt_secs <= 0.0 {
        return 0.0;
    }
    1.0 - (-dt_secs / blend_tau()).exp()
}

/// Animated hover/press highlight for one cell.
///
/// Scale and border alpha ease towards their targets every frame. When the
/// pointer leaves, the highlight stays on the last cell until it has faded.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverFeedback {
    target: Option<GridPos>,
    shown: Option<GridPos>,
    pressed: bool,
    pub scale: f64,
    pub alpha: f64,
}

impl Default for HoverFeedback {
    fn default() -> Self {
        Self {
            target: None,
            shown: None,
            pressed: false,
            scale: 1.0,
            alpha: 0.0,
        }
    }
}

impl HoverFeedback {
    pub fn hover(&mut self, cell: Option<GridPos>) {
        self.target = cell;
        if cell.is_some() {
            self.shown = cell;
        } else {
            self.pressed = false;
        }
    }

    pub fn set_pressed(&mut self, pressed: bool) {
        self.pressed = pressed && self.target.is_some();
    }

    pub fn hovered(&self) -> Option<GridPos> {
        self.target
    }

    /// Cell the overlay is drawn on, including while fading out.
    pub fn shown(&self) -> Option<GridPos> {
        self.shown
    }

    fn targets(&self) -> (f64, f64) {
        match (self.target, self.pressed) {
            (Some(_), true) => (PRESS_SCALE, 1.0),
            (Some(_), false) => (HOVER_SCALE, 1.0),
            (None, _) => (1.0, 0.0),
        }
    }

    /// Advance by `dt_secs`. Returns `true` while still animating.
    pub fn step(&mut self, dt_secs: f64) -> bool {
        let (scale_to, alpha_to) = self.targets();
        let t = blend_factor(dt_secs);
        self.scale += (scale_to - self.scale) * t;
        self.alpha += (alpha_to - self.alpha) * t;

        if (self.scale - scale_to).abs() < SCALE_SNAP {
            self.scale = scale_to;
        }
        if (self.alpha - alpha_to).abs() < ALPHA_SNAP {
            self.alpha = alpha_to;
        }
        if self.target.is_none() && self.alpha == 0.0 {
            self.shown = None;
        }
        self.scale != scale_to || self.alpha != alpha_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_60hz_frame_blends_the_documented_fraction() {
        assert!((blend_factor(1.0 / 60.0) - BLEND_PER_60HZ_FRAME).abs() < 1e-12);
        assert_eq!(blend_factor(0.0), 0.0);
    }

    #[test]
    fn result_does_not_depend_on_frame_rate() {
        let mut fast = HoverFeedback::default();
        let mut slow = HoverFeedback::default();
        fast.hover(Some(GridPos::new(1, 1)));
        slow.hover(Some(GridPos::new(1, 1)));
        for _ in 0..4 {
            fast.step(1.0 / 240.0);
        }
        slow.step(1.0 / 60.0);
        assert!((fast.alpha - slow.alpha).abs() < 1e-9);
        assert!((fast.scale - slow.scale).abs() < 1e-9);
    }

    #[test]
    fn hover_settles_and_fades_out() {
        let mut fb = HoverFeedback::default();
        fb.hover(Some(GridPos::new(3, 4)));
        let mut frames = 0;
        while fb.step(1.0 / 60.0) {
            frames += 1;
            assert!(frames < 200);
        }
        assert_eq!((fb.scale, fb.alpha), (HOVER_SCALE, 1.0));

        fb.hover(None);
        fb.step(1.0 / 60.0);
        assert_eq!(fb.shown(), Some(GridPos::new(3, 4)));
        while fb.step(1.0 / 60.0) {}
        assert_eq!(fb.alpha, 0.0);
        assert_eq!(fb.shown(), None);
    }

    #[test]
    fn press_shrinks_only_while_hovering() {
        let mut fb = HoverFeedback::default();
        fb.set_pressed(true);
        while fb.step(0.1) {}
        assert_eq!(fb.scale, 1.0);

        fb.hover(Some(GridPos::new(0, 0)));
        fb.set_pressed(true);
        while fb.step(0.1) {}
        assert_eq!(fb.scale, PRESS_SCALE);
    }
}
