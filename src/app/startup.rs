use super::runtime::request_shutdown;
use super::{FieldcamApp, ShutdownReason};
use crate::keyboard::InputCommand;
use crate::netinfo;
use crate::telemetry::{self, SolarLogger};
use crate::ui::{self, UiPage};
use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

impl FieldcamApp {
    /// Spawn the service loops. Call once, before `run`.
    pub fn start(&mut self) {
        info!("Starting fieldcam services");

        self.spawn_tick_loop();
        self.spawn_button_loop();

        if let Some(logger) = self.telemetry.take() {
            self.spawn_telemetry_loop(logger);
        }

        if let Some(command_rx) = self.command_rx.take() {
            if let Some(keyboard) = &self.keyboard {
                keyboard.start();
            }
            self.spawn_command_router(command_rx);
            self.spawn_display_loop();
        }

        info!("Fieldcam services started");
    }

    /// Drives the recording controller and publishes its status. The
    /// only writer of recorder state.
    fn spawn_tick_loop(&mut self) {
        let Some(status_tx) = self.status_tx.take() else {
            return;
        };
        let controller = Arc::clone(&self.controller);
        let token = self.cancellation_token.clone();
        let period = self.config.system.tick_interval();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut controller = controller.lock().await;
                        controller.tick(Instant::now()).await;
                        status_tx.send_replace(controller.status(Instant::now()));
                    }
                }
            }

            debug!("Recorder tick loop stopped");
        }));
    }

    fn spawn_button_loop(&mut self) {
        let controller = Arc::clone(&self.controller);
        let buttons = Arc::clone(&self.buttons);
        let token = self.cancellation_token.clone();
        let period = self.config.system.button_poll_interval();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut buttons = buttons.lock().await;
                        let mut controller = controller.lock().await;
                        buttons.poll(&mut controller, Instant::now()).await;
                    }
                }
            }

            debug!("Button poll loop stopped");
        }));
    }

    fn spawn_telemetry_loop(&mut self, mut logger: SolarLogger) {
        let token = self.cancellation_token.clone();
        let period = Duration::from_secs(self.config.telemetry.interval_seconds);

        info!("Solar telemetry log: {}", logger.path().display());

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = logger.log_once() {
                            warn!("Could not append solar telemetry row: {}", error);
                        }
                    }
                }
            }

            debug!("Telemetry loop stopped");
        }));
    }

    /// Applies keyboard commands to the same paths the panel buttons
    /// use, so bench sessions exercise the real routing.
    fn spawn_command_router(&mut self, mut commands: mpsc::UnboundedReceiver<InputCommand>) {
        let controller = Arc::clone(&self.controller);
        let buttons = Arc::clone(&self.buttons);
        let motion = self.motion.clone();
        let shutdown = Arc::clone(&self.shutdown_sender);
        let token = self.cancellation_token.clone();

        self.tasks.push(tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = token.cancelled() => break,
                    command = commands.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                };

                match command {
                    InputCommand::AdvancePage => {
                        let mut buttons = buttons.lock().await;
                        let mut controller = controller.lock().await;
                        buttons.advance_page(&mut controller).await;
                    }
                    InputCommand::Function => {
                        let mut buttons = buttons.lock().await;
                        let mut controller = controller.lock().await;
                        buttons.route_function(&mut controller, Instant::now()).await;
                    }
                    InputCommand::Motion { dx, dy, dz, fine } => {
                        if let Some(dispatcher) = &motion {
                            let mut dispatcher = dispatcher.lock().await;
                            dispatcher
                                .submit_delta(Instant::now(), dx, dy, dz, fine)
                                .await;
                        } else {
                            debug!("Motion input ignored: camera has no aim control");
                        }
                    }
                    InputCommand::Quit => {
                        info!("Shutdown requested from keyboard");
                        request_shutdown(&shutdown, ShutdownReason::Operator).await;
                        break;
                    }
                }
            }

            debug!("Input command router stopped");
        }));
    }

    /// Bench display: renders the active page into the debug log once a
    /// second, standing in for the enclosure screen.
    fn spawn_display_loop(&mut self) {
        let buttons = Arc::clone(&self.buttons);
        let mut status_rx = self.status_receiver();
        let token = self.cancellation_token.clone();
        let solar_csv = self.solar_csv.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let page = buttons.lock().await.page();
                        let text = match page {
                            UiPage::Off => continue,
                            UiPage::Recording => {
                                let status = status_rx.borrow_and_update().clone();
                                ui::recording_page_text(&status, Local::now())
                            }
                            UiPage::Network => netinfo::network_page_text(),
                            UiPage::Solar => telemetry::solar_page_text(&solar_csv),
                            UiPage::Preview => {
                                if status_rx.borrow_and_update().previewing {
                                    "Preview live".to_string()
                                } else {
                                    "Preview starting".to_string()
                                }
                            }
                        };
                        debug!("Page {}:\n{}", page.label(), text);
                    }
                }
            }
        }));
    }
}
