use crate::recorder::RecordingController;
use crate::ui::{UiPage, UiStateMachine};
use std::time::Instant;
use tracing::{debug, info};

/// Raw button lines as the enclosure wiring presents them.
///
/// Implementations read whatever the deployment uses for input (GPIO
/// lines, a keypad driver); this crate only consumes the levels.
pub trait ButtonPins: Send {
    /// Level of the page-cycle button, true while held.
    fn mode_pressed(&mut self) -> bool;

    /// Level of the action button, true while held.
    fn function_pressed(&mut self) -> bool;
}

/// Pins that are never pressed, for deployments without local buttons.
pub struct InertPins;

impl ButtonPins for InertPins {
    fn mode_pressed(&mut self) -> bool {
        false
    }

    fn function_pressed(&mut self) -> bool {
        false
    }
}

/// Debounces the two buttons by level latching and routes press edges
/// into the controller and the page counter.
///
/// A held button fires exactly once; the latch clears only after the
/// level drops. The action button means different things per page:
/// record toggle on the recording page, zoom toggle on the preview
/// page, nothing elsewhere.
pub struct ButtonDispatcher {
    pins: Box<dyn ButtonPins>,
    ui: UiStateMachine,
    mode_latched: bool,
    function_latched: bool,
}

impl ButtonDispatcher {
    pub fn new(pins: Box<dyn ButtonPins>) -> Self {
        Self {
            pins,
            ui: UiStateMachine::new(),
            mode_latched: false,
            function_latched: false,
        }
    }

    pub fn page(&self) -> UiPage {
        self.ui.page()
    }

    pub fn backlight_on(&self) -> bool {
        self.ui.backlight_on()
    }

    /// One debounce step. Called on a fixed short period from the
    /// button loop, with the controller lock held.
    pub async fn poll(&mut self, controller: &mut RecordingController, now: Instant) {
        let mode = self.pins.mode_pressed();
        if mode && !self.mode_latched {
            self.advance_page(controller).await;
        }
        self.mode_latched = mode;

        let function = self.pins.function_pressed();
        if function && !self.function_latched {
            self.route_function(controller, now).await;
        }
        self.function_latched = function;
    }

    /// Page advance, starting the camera preview when the cycle enters
    /// the preview page and stopping it on the way out.
    pub async fn advance_page(&mut self, controller: &mut RecordingController) {
        let transition = self.ui.advance();
        info!("Display page: {}", transition.to.label());

        if transition.to == UiPage::Preview && !controller.is_previewing() {
            controller.toggle_preview().await;
        }
        if transition.from == UiPage::Preview && controller.is_previewing() {
            controller.toggle_preview().await;
        }
    }

    pub async fn route_function(&mut self, controller: &mut RecordingController, now: Instant) {
        match self.ui.page() {
            UiPage::Recording => controller.toggle_recording(now).await,
            UiPage::Preview => controller.toggle_zoom().await,
            page => debug!("Action button ignored on {} page", page.label()),
        }
    }
}
