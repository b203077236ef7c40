use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use tracing::warn;

/// System hostname, or "unknown" when the query fails.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown".to_string();
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Render the network display page: hostname plus one line per
/// non-loopback address. Query failures render a placeholder line so
/// the page always has content.
pub fn network_page_text() -> String {
    let mut lines = vec![format!("Host: {}", hostname())];

    match NetworkInterface::show() {
        Ok(interfaces) => {
            let mut found = false;
            for itf in &interfaces {
                for addr in &itf.addr {
                    let ip = addr.ip();
                    if ip.is_loopback() {
                        continue;
                    }
                    lines.push(format!("{}: {}", itf.name, ip));
                    found = true;
                }
            }
            if !found {
                lines.push("No interfaces up".to_string());
            }
        }
        Err(e) => {
            warn!("Interface enumeration failed: {}", e);
            lines.push("Interface query failed".to_string());
        }
    }

    lines.join("\n")
}
