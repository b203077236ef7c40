use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// CSV column order, fixed so long-running logs stay appendable across
/// releases.
const FIELD_NAMES: [&str; 14] = [
    "Date",
    "Time",
    "Battery_Voltage",
    "Array_Voltage",
    "Load_Voltage",
    "Charge_Current",
    "Load_Current",
    "Ambient_Temp",
    "RTS_Temp",
    "Charge_State",
    "Ah_Charge",
    "Ah_Load",
    "Alarm",
    "MPPT_Error",
];

/// Charge-controller alarm bits, indexed by the controller's alarm
/// register value.
const ALARM_NAMES: [&str; 24] = [
    "RTS open",
    "RTS shorted",
    "RTS disconnected",
    "Ths open",
    "Ths shorted",
    "SSMPPT hot",
    "Current limit",
    "Current offset",
    "Undefined",
    "Undefined",
    "Uncalibrated",
    "RTS miswire",
    "Undefined",
    "Undefined",
    "Miswire",
    "PET open",
    "P12",
    "High Va current limit",
    "Alarm 19",
    "Alarm 20",
    "Alarm 21",
    "Alarm 22",
    "Alarm 23",
    "Alarm 24",
];

const PORT_FAULT_MARKER: &str = "USB PORT ERROR";
const READ_FAULT_MARKER: &str = "NO CONNECTION TO CHARGE CONTROLLER";

/// One sample from the solar charge controller.
#[derive(Debug, Clone, PartialEq)]
pub struct SolarReading {
    pub battery_voltage: f64,
    pub array_voltage: f64,
    pub load_voltage: f64,
    pub charge_current: f64,
    pub load_current: f64,
    pub ambient_temp: f64,
    pub rts_temp: f64,
    pub charge_state: u16,
    pub ah_charge: f64,
    pub ah_load: f64,
    /// Alarm register value, decoded to text when logged.
    pub alarm: u16,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The serial port itself is missing, as when the cable is out.
    #[error("charge controller port unavailable: {0}")]
    PortUnavailable(String),
    /// The port exists but the controller did not answer.
    #[error("no response from charge controller: {0}")]
    NoResponse(String),
}

/// Source of charge-controller samples. The hardware implementation
/// lives with the deployment's serial wiring; this crate only consumes
/// readings.
pub trait ChargeMonitor: Send {
    fn read(&mut self) -> Result<SolarReading, TelemetryError>;
}

/// Monitor for units wired without a charge controller; every read
/// reports the port missing, which the logger records as fault rows.
pub struct NoChargeController;

impl ChargeMonitor for NoChargeController {
    fn read(&mut self) -> Result<SolarReading, TelemetryError> {
        Err(TelemetryError::PortUnavailable(
            "no charge controller configured".to_string(),
        ))
    }
}

fn decode_alarm(alarm: u16) -> String {
    ALARM_NAMES
        .get(alarm as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Alarm {}", alarm))
}

/// Appends charge-controller rows to a CSV on a fixed period,
/// independent of recording.
///
/// Read failures still append a row, with every data column `N/A` and
/// the fault named in the last column, so gaps in power history are
/// visible rather than silent.
pub struct SolarLogger {
    path: PathBuf,
    monitor: Box<dyn ChargeMonitor>,
}

impl SolarLogger {
    pub fn new(path: impl Into<PathBuf>, monitor: Box<dyn ChargeMonitor>) -> Self {
        Self {
            path: path.into(),
            monitor,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take one sample and append it.
    pub fn log_once(&mut self) -> std::io::Result<()> {
        let now = Local::now();
        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%Hh%Mm%Ss").to_string();

        let row = match self.monitor.read() {
            Ok(reading) => {
                debug!(
                    "Solar sample: battery {:.1}V array {:.1}V",
                    reading.battery_voltage, reading.array_voltage
                );
                let mut fields = vec![date, time];
                fields.extend([
                    format!("{:.1}", reading.battery_voltage),
                    format!("{:.1}", reading.array_voltage),
                    format!("{:.1}", reading.load_voltage),
                    format!("{:.1}", reading.charge_current),
                    format!("{:.1}", reading.load_current),
                    format!("{:.1}", reading.ambient_temp),
                    format!("{:.1}", reading.rts_temp),
                    format!("{}", reading.charge_state),
                    format!("{:.1}", reading.ah_charge),
                    format!("{:.1}", reading.ah_load),
                    decode_alarm(reading.alarm),
                    "N/A".to_string(),
                ]);
                fields
            }
            Err(e) => {
                warn!("Solar read failed: {}", e);
                let marker = match e {
                    TelemetryError::PortUnavailable(_) => PORT_FAULT_MARKER,
                    TelemetryError::NoResponse(_) => READ_FAULT_MARKER,
                };
                let mut fields = vec![date, time];
                fields.extend(std::iter::repeat("N/A".to_string()).take(11));
                fields.push(marker.to_string());
                fields
            }
        };

        self.append_row(&row)
    }

    fn append_row(&self, row: &[String]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let fresh = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if fresh {
            writeln!(file, "{}", FIELD_NAMES.join(","))?;
        }
        writeln!(file, "{}", row.join(","))
    }
}

/// Render the latest logged row for the solar display page.
///
/// Power cuts can leave NUL bytes in the file tail; they are stripped
/// before parsing, like any truncated trailing row.
pub fn solar_page_text(path: &Path) -> String {
    let raw = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => {
            return "Solar information\nnot found\n\nCheck charge controller\nwiring and setup"
                .to_string()
        }
    };
    let cleaned: String = raw.chars().filter(|c| *c != '\0').collect();

    let last_row: Vec<&str> = match cleaned.lines().skip(1).filter(|l| !l.trim().is_empty()).last()
    {
        Some(line) => line.split(',').collect(),
        None => return "No solar samples\nlogged yet".to_string(),
    };
    if last_row.len() != FIELD_NAMES.len() {
        return "No solar samples\nlogged yet".to_string();
    }

    if last_row[13] == PORT_FAULT_MARKER {
        return "Check USB connection\nfrom solar charge\ncontroller".to_string();
    }

    format!(
        "{}\n{}\nBattery Voltage: {}\nArray Voltage: {}\nCharge Current: {}\nLoad Current: {}\nAh Charge: {}\nAh Load: {}\nAlarm: {}",
        last_row[0], last_row[1], last_row[2], last_row[3], last_row[5], last_row[6],
        last_row[10], last_row[11], last_row[12],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct ScriptedMonitor {
        results: VecDeque<Result<SolarReading, TelemetryError>>,
    }

    impl ScriptedMonitor {
        fn new(results: Vec<Result<SolarReading, TelemetryError>>) -> Self {
            Self {
                results: results.into(),
            }
        }
    }

    impl ChargeMonitor for ScriptedMonitor {
        fn read(&mut self) -> Result<SolarReading, TelemetryError> {
            self.results
                .pop_front()
                .unwrap_or_else(|| Err(TelemetryError::NoResponse("script exhausted".into())))
        }
    }

    fn sample() -> SolarReading {
        SolarReading {
            battery_voltage: 12.8,
            array_voltage: 19.25,
            load_voltage: 12.75,
            charge_current: 1.5,
            load_current: 0.4,
            ambient_temp: -20.0,
            rts_temp: -25.0,
            charge_state: 5,
            ah_charge: 103.2,
            ah_load: 88.5,
            alarm: 0,
        }
    }

    #[test]
    fn test_header_written_once_then_rows_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("solar.csv");
        let monitor = ScriptedMonitor::new(vec![Ok(sample()), Ok(sample())]);
        let mut logger = SolarLogger::new(&path, Box::new(monitor));

        logger.log_once().unwrap();
        logger.log_once().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], FIELD_NAMES.join(","));
        assert!(lines[1].contains("12.8,19.2,12.8,1.5,0.4,-20.0,-25.0,5,103.2,88.5,RTS open,N/A"));
    }

    #[test]
    fn test_port_fault_appends_na_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("solar.csv");
        let monitor = ScriptedMonitor::new(vec![Err(TelemetryError::PortUnavailable(
            "/dev/ttyUSB0 missing".into(),
        ))]);
        let mut logger = SolarLogger::new(&path, Box::new(monitor));

        logger.log_once().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), FIELD_NAMES.len());
        assert!(fields[2..13].iter().all(|f| *f == "N/A"));
        assert_eq!(fields[13], PORT_FAULT_MARKER);
    }

    #[test]
    fn test_read_fault_uses_distinct_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("solar.csv");
        let monitor =
            ScriptedMonitor::new(vec![Err(TelemetryError::NoResponse("timeout".into()))]);
        let mut logger = SolarLogger::new(&path, Box::new(monitor));

        logger.log_once().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.lines().nth(1).unwrap().ends_with(READ_FAULT_MARKER));
    }

    #[test]
    fn test_page_text_renders_latest_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("solar.csv");
        let mut second = sample();
        second.battery_voltage = 11.9;
        let monitor = ScriptedMonitor::new(vec![Ok(sample()), Ok(second)]);
        let mut logger = SolarLogger::new(&path, Box::new(monitor));
        logger.log_once().unwrap();
        logger.log_once().unwrap();

        let text = solar_page_text(&path);
        assert!(text.contains("Battery Voltage: 11.9"));
        assert!(text.contains("Alarm: RTS open"));
    }

    #[test]
    fn test_page_text_handles_missing_and_nul_damage() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.csv");
        assert!(solar_page_text(&missing).contains("not found"));

        let damaged = dir.path().join("damaged.csv");
        let mut contents = format!("{}\n", FIELD_NAMES.join(","));
        contents.push_str("2026-01-05,09h00m00s,12.8,19.2,12.8,1.5,0.4,-20.0,-25.0,5,103.2,88.5,RTS open,N/A\n");
        contents.push('\0');
        std::fs::write(&damaged, contents).unwrap();

        let text = solar_page_text(&damaged);
        assert!(text.contains("Battery Voltage: 12.8"));
    }

    #[test]
    fn test_port_fault_row_renders_guidance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("solar.csv");
        let monitor = ScriptedMonitor::new(vec![Err(TelemetryError::PortUnavailable(
            "unplugged".into(),
        ))]);
        let mut logger = SolarLogger::new(&path, Box::new(monitor));
        logger.log_once().unwrap();

        assert!(solar_page_text(&path).contains("Check USB connection"));
    }
}
