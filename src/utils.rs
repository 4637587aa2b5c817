use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

/// Scan process arguments for `port=<n>`.
///
/// Returns `None` when the argument is absent or not a usable port, in which
/// case the caller keeps its default.
pub fn port_from_args<I, S>(args: I) -> Option<u16>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let value = args
        .into_iter()
        .find_map(|arg| arg.as_ref().strip_prefix("port=").map(str::to_owned))?;

    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => {
            info!("Port number: {}", port);
            Some(port)
        }
        _ => {
            warn!("Invalid port argument {:?}, using default", value);
            None
        }
    }
}

/// Milliseconds since the Unix epoch, 0 if the clock is before it
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
