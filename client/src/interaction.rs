//! Pointer and touch gesture classification.

/// What the canvas should do in response to an input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureAction {
    None,
    /// Screen-space pan delta.
    Pan { dx: f64, dy: f64 },
    /// Zoom by `1 + delta` around a screen pivot.
    Zoom { delta: f64, pivot_x: f64, pivot_y: f64 },
    /// Pointer released without leaving the click threshold.
    Click { x: f64, y: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    /// Pointer is down and has not moved far enough to count as a drag.
    Pressed { last_x: f64, last_y: f64, travel: f64 },
    Dragging { last_x: f64, last_y: f64 },
    Pinching { distance: f64 },
}

/// Click vs drag vs pinch state machine.
///
/// A press pans the view as soon as the pointer moves, but only turns into
/// a drag once its accumulated movement passes the threshold. Releasing a
/// press that never became a drag yields a click.
#[derive(Debug, Clone)]
pub struct GestureTracker {
    phase: Phase,
    threshold_px: f64,
    pinch_speed: f64,
}

impl GestureTracker {
    pub fn new(threshold_px: f64, pinch_speed: f64) -> Self {
        Self {
            phase: Phase::Idle,
            threshold_px,
            pinch_speed,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging { .. })
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        if matches!(self.phase, Phase::Pinching { .. }) {
            return;
        }
        self.phase = Phase::Pressed {
            last_x: x,
            last_y: y,
            travel: 0.0,
        };
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) -> GestureAction {
        match self.phase {
            Phase::Pressed { last_x, last_y, travel } => {
                let (dx, dy) = (x - last_x, y - last_y);
                let travel = travel + dx.abs() + dy.abs();
                self.phase = if travel > self.threshold_px {
                    Phase::Dragging { last_x: x, last_y: y }
                } else {
                    Phase::Pressed { last_x: x, last_y: y, travel }
                };
                GestureAction::Pan { dx, dy }
            }
            Phase::Dragging { last_x, last_y } => {
                self.phase = Phase::Dragging { last_x: x, last_y: y };
                GestureAction::Pan {
                    dx: x - last_x,
                    dy: y - last_y,
                }
            }
            Phase::Idle | Phase::Pinching { .. } => GestureAction::None,
        }
    }

    pub fn pointer_up(&mut self, x: f64, y: f64) -> GestureAction {
        let action = match self.phase {
            Phase::Pressed { .. } => GestureAction::Click { x, y },
            _ => GestureAction::None,
        };
        if !matches!(self.phase, Phase::Pinching { .. }) {
            self.phase = Phase::Idle;
        }
        action
    }

    /// Pointer left the canvas or the browser cancelled it.
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Two fingers down. Any pending click is dropped.
    pub fn pinch_start(&mut self, a: (f64, f64), b: (f64, f64)) {
        self.phase = Phase::Pinching {
            distance: distance(a, b),
        };
    }

    pub fn pinch_move(&mut self, a: (f64, f64), b: (f64, f64)) -> GestureAction {
        let Phase::Pinching { distance: previous } = self.phase else {
            self.pinch_start(a, b);
            return GestureAction::None;
        };
        let current = distance(a, b);
        self.phase = Phase::Pinching { distance: current };
        if previous <= 0.0 {
            return GestureAction::None;
        }
        GestureAction::Zoom {
            delta: (current - previous) * self.pinch_speed,
            pivot_x: (a.0 + b.0) / 2.0,
            pivot_y: (a.1 + b.1) / 2.0,
        }
    }

    pub fn pinch_end(&mut self) {
        if matches!(self.phase, Phase::Pinching { .. }) {
            self.phase = Phase::Idle;
        }
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> GestureTracker {
        GestureTracker::new(5.0, 0.005)
    }

    #[test]
    fn short_press_is_a_click() {
        let mut g = tracker();
        g.pointer_down(100.0, 100.0);
        assert_eq!(g.pointer_move(102.0, 101.0), GestureAction::Pan { dx: 2.0, dy: 1.0 });
        assert_eq!(g.pointer_move(101.0, 101.0), GestureAction::Pan { dx: -1.0, dy: 0.0 });
        assert!(!g.is_dragging());
        assert_eq!(g.pointer_up(101.0, 101.0), GestureAction::Click { x: 101.0, y: 101.0 });
        assert!(!g.is_active());
    }

    #[test]
    fn movement_past_threshold_suppresses_click() {
        let mut g = tracker();
        g.pointer_down(0.0, 0.0);
        g.pointer_move(3.0, 0.0);
        g.pointer_move(3.0, 3.0);
        assert!(g.is_dragging());
        // Coming back to the start point does not undo the drag.
        g.pointer_move(0.0, 0.0);
        assert_eq!(g.pointer_up(0.0, 0.0), GestureAction::None);
    }

    #[test]
    fn back_and_forth_jitter_accumulates() {
        let mut g = tracker();
        g.pointer_down(0.0, 0.0);
        for i in 0..3 {
            let x = if i % 2 == 0 { 2.0 } else { 0.0 };
            g.pointer_move(x, 0.0);
        }
        assert!(g.is_dragging());
    }

    #[test]
    fn moves_without_press_do_nothing() {
        let mut g = tracker();
        assert_eq!(g.pointer_move(10.0, 10.0), GestureAction::None);
        assert_eq!(g.pointer_up(10.0, 10.0), GestureAction::None);
    }

    #[test]
    fn pinch_zooms_around_the_midpoint() {
        let mut g = tracker();
        g.pointer_down(0.0, 0.0);
        g.pinch_start((0.0, 0.0), (100.0, 0.0));
        match g.pinch_move((0.0, 0.0), (120.0, 0.0)) {
            GestureAction::Zoom { delta, pivot_x, pivot_y } => {
                assert!((delta - 0.1).abs() < 1e-12);
                assert_eq!((pivot_x, pivot_y), (60.0, 0.0));
            }
            other => panic!("expected zoom, got {other:?}"),
        }
        // Lifting a finger mid-pinch never clicks.
        assert_eq!(g.pointer_up(0.0, 0.0), GestureAction::None);
        g.pinch_end();
        assert!(!g.is_active());
    }
}
