pub mod cmds;
pub mod opcodes;

use ch376::DeviceReqData;
use log::{debug, warn};

use crate::protocol::{CbiCommandResult, Protocol, ProtocolError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryOutcome {
    pub result: CbiCommandResult,
    /// A media change was reported at some point, even if a later attempt succeeded.
    pub media_changed: bool,
}

/// Sends `command`, reissuing it for as long as the device answers with a transient sense code.
///
/// Any other outcome is final, including transport failures. When `retry_on_media_changed` is
/// false, a media change is returned to the caller instead of being retried.
pub fn send_command_with_retry<P: Protocol + ?Sized>(
    protocol: &mut P,
    command: &[u8],
    mut data: DeviceReqData<'_>,
    retry_on_media_changed: bool,
    retry_limit: Option<u32>,
) -> Result<RetryOutcome, ProtocolError> {
    let mut media_changed = false;
    let mut retries = 0u32;

    loop {
        let result = protocol.send_command(command, data.reborrow())?;
        let outcome = |media_changed| RetryOutcome {
            result,
            media_changed,
        };

        let sense = match result.sense {
            Some(sense) if sense.is_transient() => sense,
            _ => return Ok(outcome(media_changed)),
        };
        if sense.is_media_changed() {
            media_changed = true;
            if !retry_on_media_changed {
                return Ok(outcome(media_changed));
            }
        }
        if retry_limit.map_or(false, |limit| retries >= limit) {
            warn!(
                "command {:#04x} still reports {} after {} retries",
                command.first().copied().unwrap_or(0),
                sense,
                retries
            );
            return Ok(outcome(media_changed));
        }

        retries += 1;
        debug!(
            "command {:#04x}: {}, retrying",
            command.first().copied().unwrap_or(0),
            sense
        );
    }
}
