use crate::camera::SharedControlPort;
use crate::config::{MotionConfig, PtzConfig};
use std::time::Instant;
use tracing::{debug, warn};

/// Current absolute setpoints of the pan-tilt-zoom head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

/// What became of one submitted movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted and acknowledged by the camera.
    Sent,
    /// Dropped: the previous accepted command is still inside the
    /// minimum interval. Not a fault.
    RateLimited,
    /// The camera did not take the command; setpoints are unchanged.
    Failed,
}

/// Turns movement deltas into absolute-move commands, pacing them so
/// the camera's control channel is never flooded.
///
/// Bounds violations are never errors: tilt and zoom clamp, and pan
/// either clamps or wraps modularly on continuous-rotation mounts.
/// The rate window and the setpoints advance only when the camera
/// acknowledges, so an unacknowledged command cannot cause drift.
pub struct MotionCommandDispatcher {
    port: SharedControlPort,
    state: MotionState,
    last_dispatch: Option<Instant>,
    fine_scale: f64,
    min_interval: std::time::Duration,
    zoom_pan_scale: f64,
    inverted_mount: bool,
    pan_min: f64,
    pan_max: f64,
    tilt_min: f64,
    tilt_max: f64,
    zoom_min: f64,
    zoom_max: f64,
    infinite_pan: bool,
}

impl MotionCommandDispatcher {
    /// Start from the camera's home position, which the backend aims at
    /// when its control channel comes up.
    pub fn new(port: SharedControlPort, motion: &MotionConfig, ptz: &PtzConfig) -> Self {
        Self {
            port,
            state: MotionState {
                pan: ptz.home_pan,
                tilt: ptz.home_tilt,
                zoom: ptz.home_zoom,
            },
            last_dispatch: None,
            fine_scale: motion.fine_scale,
            min_interval: motion.min_interval(),
            zoom_pan_scale: motion.zoom_pan_scale,
            inverted_mount: motion.inverted_mount,
            pan_min: ptz.pan_min,
            pan_max: ptz.pan_max,
            tilt_min: ptz.tilt_min,
            tilt_max: ptz.tilt_max,
            zoom_min: ptz.zoom_min,
            zoom_max: ptz.zoom_max,
            infinite_pan: ptz.infinite_pan,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Apply a movement delta and, if accepted, drive the head there.
    ///
    /// `fine` scales the delta down for precision aiming while the
    /// modifier is held. Aim deltas also shrink as zoom grows, so a
    /// zoomed-in view pans by pixels rather than lurching.
    pub async fn submit_delta(
        &mut self,
        now: Instant,
        dx: f64,
        dy: f64,
        dz: f64,
        fine: bool,
    ) -> DispatchOutcome {
        if let Some(last) = self.last_dispatch {
            if now.saturating_duration_since(last) < self.min_interval {
                return DispatchOutcome::RateLimited;
            }
        }

        let (mut dx, mut dy, dz) = if fine {
            (dx * self.fine_scale, dy * self.fine_scale, dz * self.fine_scale)
        } else {
            (dx, dy, dz)
        };

        let aim_ratio = 1.0 / (1.0 + self.state.zoom * self.zoom_pan_scale);
        dx *= aim_ratio;
        dy *= aim_ratio;
        if self.inverted_mount {
            dx = -dx;
            dy = -dy;
        }

        let target = MotionState {
            pan: self.place_pan(self.state.pan + dx),
            tilt: (self.state.tilt + dy).clamp(self.tilt_min, self.tilt_max),
            zoom: (self.state.zoom + dz).clamp(self.zoom_min, self.zoom_max),
        };

        let result = self
            .port
            .lock()
            .await
            .absolute_move(target.pan, target.tilt, target.zoom)
            .await;

        match result {
            Ok(()) => {
                self.state = target;
                self.last_dispatch = Some(now);
                debug!(
                    "Moved to pan {:.3} tilt {:.3} zoom {:.3}",
                    target.pan, target.tilt, target.zoom
                );
                DispatchOutcome::Sent
            }
            Err(e) => {
                warn!("Move command failed, keeping last known position: {}", e);
                DispatchOutcome::Failed
            }
        }
    }

    /// Continuous-rotation mounts wrap pan modularly; anything else
    /// clamps like the other axes.
    fn place_pan(&self, new_pan: f64) -> f64 {
        if !self.infinite_pan {
            return new_pan.clamp(self.pan_min, self.pan_max);
        }
        if new_pan > self.pan_max {
            self.pan_min + (new_pan - self.pan_max)
        } else if new_pan < self.pan_min {
            self.pan_max - (self.pan_min - new_pan)
        } else {
            new_pan
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PtzControlPort;
    use crate::error::CameraError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct ScriptedPort {
        moves: Arc<parking_lot::Mutex<Vec<(f64, f64, f64)>>>,
        fail_next: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PtzControlPort for ScriptedPort {
        async fn absolute_move(
            &mut self,
            pan: f64,
            tilt: f64,
            zoom: f64,
        ) -> Result<(), CameraError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(CameraError::disconnected("control channel dropped"));
            }
            self.moves.lock().push((pan, tilt, zoom));
            Ok(())
        }

        async fn zoom_to(&mut self, zoom: f64) -> Result<(), CameraError> {
            self.absolute_move(f64::NAN, f64::NAN, zoom).await
        }
    }

    fn dispatcher(
        infinite_pan: bool,
        home: (f64, f64, f64),
    ) -> (MotionCommandDispatcher, ScriptedPort) {
        let port = ScriptedPort::default();
        let shared: SharedControlPort =
            Arc::new(tokio::sync::Mutex::new(Box::new(port.clone())));

        let motion = MotionConfig::default();
        let mut ptz = PtzConfig::default();
        ptz.infinite_pan = infinite_pan;
        ptz.home_pan = home.0;
        ptz.home_tilt = home.1;
        ptz.home_zoom = home.2;

        (MotionCommandDispatcher::new(shared, &motion, &ptz), port)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[tokio::test]
    async fn test_pan_wraps_modularly_past_max() {
        let (mut dispatcher, port) = dispatcher(true, (0.95, 0.0, 0.0));
        let now = Instant::now();

        let outcome = dispatcher.submit_delta(now, 0.2, 0.0, 0.0, false).await;
        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_close(dispatcher.state().pan, -0.85);

        let moves = port.moves.lock();
        assert_eq!(moves.len(), 1);
        assert_close(moves[0].0, -0.85);
    }

    #[tokio::test]
    async fn test_pan_wraps_modularly_below_min() {
        let (mut dispatcher, _port) = dispatcher(true, (-0.95, 0.0, 0.0));
        let now = Instant::now();

        dispatcher.submit_delta(now, -0.2, 0.0, 0.0, false).await;
        assert_close(dispatcher.state().pan, 0.85);
    }

    #[tokio::test]
    async fn test_pan_clamps_on_limited_mounts() {
        let (mut dispatcher, _port) = dispatcher(false, (0.95, 0.0, 0.0));
        let now = Instant::now();

        dispatcher.submit_delta(now, 0.2, 0.0, 0.0, false).await;
        assert_close(dispatcher.state().pan, 1.0);
    }

    #[tokio::test]
    async fn test_rate_limit_drops_early_second_command() {
        let (mut dispatcher, port) = dispatcher(false, (0.0, 0.0, 0.0));
        let base = Instant::now();

        assert_eq!(
            dispatcher.submit_delta(base, 0.05, 0.0, 0.0, false).await,
            DispatchOutcome::Sent
        );
        let after_first = dispatcher.state();

        let outcome = dispatcher
            .submit_delta(base + Duration::from_millis(10), 0.05, 0.0, 0.0, false)
            .await;
        assert_eq!(outcome, DispatchOutcome::RateLimited);
        assert_eq!(dispatcher.state(), after_first);
        assert_eq!(port.moves.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_window_reopens_after_interval() {
        let (mut dispatcher, port) = dispatcher(false, (0.0, 0.0, 0.0));
        let base = Instant::now();

        dispatcher.submit_delta(base, 0.05, 0.0, 0.0, false).await;
        let outcome = dispatcher
            .submit_delta(base + Duration::from_millis(250), 0.05, 0.0, 0.0, false)
            .await;
        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(port.moves.lock().len(), 2);
        assert_close(dispatcher.state().pan, 0.1);
    }

    #[tokio::test]
    async fn test_fine_modifier_scales_delta_down() {
        let (mut dispatcher, _port) = dispatcher(false, (0.0, 0.0, 0.0));
        let now = Instant::now();

        dispatcher.submit_delta(now, 0.3, 0.0, 0.0, true).await;
        assert_close(dispatcher.state().pan, 0.1);
    }

    #[tokio::test]
    async fn test_aim_deltas_shrink_as_zoom_grows() {
        let (mut dispatcher, _port) = dispatcher(false, (0.0, 0.0, 1.0));
        let now = Instant::now();

        // At full zoom the aim ratio is 1/(1 + 5) = 1/6.
        dispatcher.submit_delta(now, 0.6, 0.6, 0.0, false).await;
        assert_close(dispatcher.state().pan, 0.1);
        assert_close(dispatcher.state().tilt, 0.1);
    }

    #[tokio::test]
    async fn test_zoom_delta_ignores_aim_compensation() {
        let (mut dispatcher, _port) = dispatcher(false, (0.0, 0.0, 0.5));
        let now = Instant::now();

        dispatcher.submit_delta(now, 0.0, 0.0, 0.2, false).await;
        assert_close(dispatcher.state().zoom, 0.7);
    }

    #[tokio::test]
    async fn test_inverted_mount_negates_aim_axes() {
        let (mut dispatcher, _port) = dispatcher(false, (0.0, 0.0, 0.0));
        let now = Instant::now();

        let mut inverted = {
            let port = ScriptedPort::default();
            let shared: SharedControlPort =
                Arc::new(tokio::sync::Mutex::new(Box::new(port.clone())));
            let mut motion = MotionConfig::default();
            motion.inverted_mount = true;
            let ptz = PtzConfig::default();
            MotionCommandDispatcher::new(shared, &motion, &ptz)
        };

        inverted.submit_delta(now, 0.1, 0.1, 0.0, false).await;
        assert_close(inverted.state().pan, -0.1);
        assert_close(inverted.state().tilt, -0.1);

        dispatcher.submit_delta(now, 0.1, 0.1, 0.0, false).await;
        assert_close(dispatcher.state().pan, 0.1);
        assert_close(dispatcher.state().tilt, 0.1);
    }

    #[tokio::test]
    async fn test_tilt_and_zoom_clamp_to_bounds() {
        let (mut dispatcher, _port) = dispatcher(false, (0.0, 0.9, 0.9));
        let now = Instant::now();

        dispatcher.submit_delta(now, 0.0, 0.5, 0.5, false).await;
        assert_close(dispatcher.state().tilt, 1.0);
        assert_close(dispatcher.state().zoom, 1.0);
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_state_and_rate_window() {
        let (mut dispatcher, port) = dispatcher(false, (0.0, 0.0, 0.0));
        let base = Instant::now();

        port.fail_next.store(true, Ordering::SeqCst);
        let outcome = dispatcher.submit_delta(base, 0.1, 0.0, 0.0, false).await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_close(dispatcher.state().pan, 0.0);

        // The window only advances on success, so an immediate retry
        // from the last known-good position goes through.
        let retry = dispatcher
            .submit_delta(base + Duration::from_millis(10), 0.1, 0.0, 0.0, false)
            .await;
        assert_eq!(retry, DispatchOutcome::Sent);
        assert_close(dispatcher.state().pan, 0.1);
        assert_eq!(port.moves.lock().len(), 1);
    }
}
