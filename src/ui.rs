use crate::recorder::{RecorderPhase, RecorderStatus};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Display pages in their fixed cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiPage {
    Off,
    Network,
    Recording,
    Solar,
    Preview,
}

impl UiPage {
    fn next(self) -> Self {
        match self {
            UiPage::Off => UiPage::Network,
            UiPage::Network => UiPage::Recording,
            UiPage::Recording => UiPage::Solar,
            UiPage::Solar => UiPage::Preview,
            UiPage::Preview => UiPage::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UiPage::Off => "off",
            UiPage::Network => "network",
            UiPage::Recording => "recording",
            UiPage::Solar => "solar",
            UiPage::Preview => "preview",
        }
    }
}

/// One observed page change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTransition {
    pub from: UiPage,
    pub to: UiPage,
}

/// Linear page counter behind the mode button.
///
/// Boots on the recording page so the operator sees the countdown while
/// closing up the enclosure; cycling to Off darkens the screen for the
/// deployment itself.
pub struct UiStateMachine {
    page: UiPage,
}

impl UiStateMachine {
    pub fn new() -> Self {
        Self {
            page: UiPage::Recording,
        }
    }

    pub fn page(&self) -> UiPage {
        self.page
    }

    /// The display backlight stays dark only on the Off page.
    pub fn backlight_on(&self) -> bool {
        self.page != UiPage::Off
    }

    /// Step to the next page and report the transition, so the caller
    /// can start or stop the camera preview at the Preview boundaries.
    pub fn advance(&mut self) -> PageTransition {
        let from = self.page;
        self.page = self.page.next();
        PageTransition {
            from,
            to: self.page,
        }
    }
}

impl Default for UiStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the recording page as the lines the screen shows.
pub fn recording_page_text(status: &RecorderStatus, now: DateTime<Local>) -> String {
    let mut lines = Vec::with_capacity(6);

    lines.push(now.format("%Y-%m-%d %H:%M:%S").to_string());
    lines.push(state_line(status));
    lines.push(format!("Vids this run: {}", status.sequence_index));
    lines.push(format!("Free: {:.2} GB", status.free_space_gb));
    lines.push(match &status.destination {
        Some(path) => match path.parent() {
            Some(dir) => format!("To: {}", dir.display()),
            None => format!("To: {}", path.display()),
        },
        None => "To: (no destination)".to_string(),
    });
    if let Some(fault) = &status.device_fault {
        lines.push(format!("CAMERA FAULT: {}", fault));
    }

    lines.join("\n")
}

fn state_line(status: &RecorderStatus) -> String {
    match status.phase {
        RecorderPhase::Waiting => {
            let remaining = status.countdown_remaining.unwrap_or(Duration::ZERO);
            format!("Recording in: {}s", remaining.as_secs())
        }
        RecorderPhase::Idle => "Idle".to_string(),
        RecorderPhase::Recording => {
            let elapsed = status.segment_elapsed.unwrap_or(Duration::ZERO);
            format!("Recording {}", format_clock(elapsed))
        }
    }
}

/// H:MM:SS, hours unpadded the way a dashboard clock reads.
pub fn format_clock(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    #[test]
    fn test_pages_cycle_in_order_and_wrap() {
        let mut ui = UiStateMachine::new();
        assert_eq!(ui.page(), UiPage::Recording);

        let walked: Vec<UiPage> = (0..5).map(|_| ui.advance().to).collect();
        assert_eq!(
            walked,
            vec![
                UiPage::Solar,
                UiPage::Preview,
                UiPage::Off,
                UiPage::Network,
                UiPage::Recording,
            ]
        );
    }

    #[test]
    fn test_backlight_dark_only_when_off() {
        let mut ui = UiStateMachine::new();
        for _ in 0..5 {
            let transition = ui.advance();
            assert_eq!(ui.backlight_on(), transition.to != UiPage::Off);
        }
    }

    #[test]
    fn test_advance_reports_preview_boundaries() {
        let mut ui = UiStateMachine::new();
        ui.advance();
        let into = ui.advance();
        assert_eq!(into.to, UiPage::Preview);

        let out = ui.advance();
        assert_eq!(out.from, UiPage::Preview);
        assert_eq!(out.to, UiPage::Off);
    }

    #[test]
    fn test_recording_page_shows_countdown() {
        let status = RecorderStatus {
            countdown_remaining: Some(Duration::from_secs(42)),
            ..RecorderStatus::default()
        };
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();

        let text = recording_page_text(&status, now);
        assert!(text.contains("2026-03-14 09:26:53"));
        assert!(text.contains("Recording in: 42s"));
        assert!(text.contains("Vids this run: 0"));
        assert!(!text.contains("CAMERA FAULT"));
    }

    #[test]
    fn test_recording_page_shows_active_segment() {
        let status = RecorderStatus {
            phase: RecorderPhase::Recording,
            recording: true,
            countdown_remaining: None,
            segment_elapsed: Some(Duration::from_secs(3 * 3600 + 5 * 60 + 7)),
            destination: Some(PathBuf::from("/media/pi/sd0/2026-03-14/clip.mp4")),
            free_space_gb: 12.5,
            sequence_index: 9,
            ..RecorderStatus::default()
        };
        let now = Local.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();

        let text = recording_page_text(&status, now);
        assert!(text.contains("Recording 3:05:07"));
        assert!(text.contains("Vids this run: 9"));
        assert!(text.contains("Free: 12.50 GB"));
        assert!(text.contains("To: /media/pi/sd0/2026-03-14"));
    }

    #[test]
    fn test_device_fault_line_appears() {
        let status = RecorderStatus {
            device_fault: Some("Camera unreachable: lens cable loose".to_string()),
            ..RecorderStatus::default()
        };
        let now = Local.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();

        let text = recording_page_text(&status, now);
        assert!(text.contains("CAMERA FAULT: Camera unreachable: lens cable loose"));
    }

    #[test]
    fn test_clock_format() {
        assert_eq!(format_clock(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_clock(Duration::from_secs(59)), "0:00:59");
        assert_eq!(format_clock(Duration::from_secs(3661)), "1:01:01");
        assert_eq!(format_clock(Duration::from_secs(36_000)), "10:00:00");
    }
}
