//! Persisted forwarding record (`controller_forwardingconfig`)

use super::{ForwardingConfigRow, DEFAULT_ACCESS_PRIORITY, PRIMARY_KEY_VALUE};
use tracing::{debug, error};

/// Access priority carried by the `forwarding` row.
///
/// Starts from the default on every read, so a removed or blank row
/// restores priority 10. An unparsable value is logged and ignored.
pub fn access_priority_from_rows(rows: &[ForwardingConfigRow]) -> u16 {
    let mut priority = DEFAULT_ACCESS_PRIORITY;

    for row in rows.iter().filter(|row| row.id == PRIMARY_KEY_VALUE) {
        let Some(value) = row.access_priority.as_deref() else {
            continue;
        };
        match value.trim().parse::<u16>() {
            Ok(p) => {
                debug!("Access priority set from {} to {}", row.id, p);
                priority = p;
            }
            Err(e) => {
                error!(
                    "Invalid access priority {:?} in controller_forwardingconfig: {}",
                    value, e
                );
            }
        }
    }

    priority
}
