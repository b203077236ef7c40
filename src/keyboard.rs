use crate::config::MotionConfig;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One keyboard action, already translated to recorder terms.
#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    /// Cycle the display page (the mode button).
    AdvancePage,
    /// Page-dependent action (the function button).
    Function,
    /// Aim or zoom delta for the motion dispatcher.
    Motion { dx: f64, dy: f64, dz: f64, fine: bool },
    /// Shut the whole process down.
    Quit,
}

/// Keyboard input for bench debugging without the enclosure buttons.
///
/// Arrows aim, i/o zoom, Shift makes movement fine, Tab or m cycles
/// pages, Space or r is the function button, q quits.
pub struct KeyboardInput {
    commands: mpsc::UnboundedSender<InputCommand>,
    motion: MotionConfig,
    cancellation_token: CancellationToken,
}

impl KeyboardInput {
    pub fn new(commands: mpsc::UnboundedSender<InputCommand>, motion: MotionConfig) -> Self {
        Self {
            commands,
            motion,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start the blocking poll loop on the runtime's blocking pool.
    pub fn start(&self) {
        info!("Keyboard input active: arrows aim, i/o zoom, Tab pages, Space acts, q quits");

        let commands = self.commands.clone();
        let motion = self.motion.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            let Some(command) =
                                map_key(key_event.code, key_event.modifiers, &motion)
                            else {
                                debug!("Key ignored: {:?}", key_event.code);
                                continue;
                            };

                            let quit = command == InputCommand::Quit;
                            if commands.send(command).is_err() {
                                debug!("Command channel closed, keyboard input exiting");
                                break;
                            }
                            if quit {
                                break;
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
        });
    }

    /// Stop the poll loop and restore the terminal.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        // Let the poll loop observe the cancellation and clean up.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();
    }
}

fn map_key(code: KeyCode, modifiers: KeyModifiers, motion: &MotionConfig) -> Option<InputCommand> {
    let fine = modifiers.contains(KeyModifiers::SHIFT);
    match code {
        KeyCode::Tab => Some(InputCommand::AdvancePage),
        KeyCode::Esc => Some(InputCommand::Quit),
        KeyCode::Up => Some(InputCommand::Motion {
            dx: 0.0,
            dy: motion.tilt_step,
            dz: 0.0,
            fine,
        }),
        KeyCode::Down => Some(InputCommand::Motion {
            dx: 0.0,
            dy: -motion.tilt_step,
            dz: 0.0,
            fine,
        }),
        KeyCode::Left => Some(InputCommand::Motion {
            dx: -motion.pan_step,
            dy: 0.0,
            dz: 0.0,
            fine,
        }),
        KeyCode::Right => Some(InputCommand::Motion {
            dx: motion.pan_step,
            dy: 0.0,
            dz: 0.0,
            fine,
        }),
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            ' ' => Some(InputCommand::Function),
            'r' => Some(InputCommand::Function),
            'm' => Some(InputCommand::AdvancePage),
            'i' => Some(InputCommand::Motion {
                dx: 0.0,
                dy: 0.0,
                dz: motion.zoom_step,
                fine,
            }),
            'o' => Some(InputCommand::Motion {
                dx: 0.0,
                dy: 0.0,
                dz: -motion.zoom_step,
                fine,
            }),
            'q' => Some(InputCommand::Quit),
            _ => None,
        },
        _ => None,
    }
}
