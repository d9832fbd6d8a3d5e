//! The one sentence an end user sees when a step gives up.

use mendstream_core::StreamFailure;

pub const DATABASE_UNAVAILABLE: &str =
    "Unable to connect to the analysis service. Please try again later.";
pub const SERVICE_UNAVAILABLE: &str =
    "The analysis service is temporarily unavailable. Please try again in a few moments.";
pub const GENERIC_FAILURE: &str =
    "Something went wrong during the analysis. Please try again or contact support if the issue persists.";

/// Pick the user-facing message for the failure that exhausted the retries.
pub fn user_facing_message(cause: &StreamFailure) -> &'static str {
    user_facing_message_for(cause.message())
}

/// Same choice, made over raw error text.
pub fn user_facing_message_for(text: &str) -> &'static str {
    if text.contains("DATABASE_URL") {
        DATABASE_UNAVAILABLE
    } else if text.contains("API") || text.contains("model") {
        SERVICE_UNAVAILABLE
    } else {
        GENERIC_FAILURE
    }
}
