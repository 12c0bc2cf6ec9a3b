//! Fixed provider-to-domain status mapping.

use voxcast_types::CallStatus;

/// Maps a provider lifecycle status string to the domain status.
///
/// The mapping is fixed: `busy` and `no-answer` land on `failed` so the
/// retry policy decides their fate; only `canceled` maps to `cancelled`.
/// Unknown strings return `None` and are ignored by the webhook sink.
pub fn map_provider_status(provider_status: &str) -> Option<CallStatus> {
    match provider_status {
        "queued" | "initiated" => Some(CallStatus::Calling),
        "ringing" => Some(CallStatus::Ringing),
        "in-progress" => Some(CallStatus::Answered),
        "completed" => Some(CallStatus::Completed),
        "busy" => Some(CallStatus::Failed),
        "no-answer" => Some(CallStatus::Failed),
        "failed" => Some(CallStatus::Failed),
        "canceled" => Some(CallStatus::Cancelled),
        _ => None,
    }
}
