/// Why the application left its run loop.
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// Delivered by the service manager or the terminal
    Signal(String),
    /// Quit from the keyboard controls
    Operator,
    /// Internal failure that made continuing pointless
    Error(String),
}
