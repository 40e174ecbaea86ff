//! HTTP request handlers.

pub mod compile;
pub mod health;
pub mod output;

pub use compile::{get_status, trigger_compile};
pub use health::{health, ready};
pub use output::{delete_output, get_output};

use vgb_models::EventId;

use crate::error::{ApiError, ApiResult};

/// Longest event id accepted on a path.
const MAX_EVENT_ID_LEN: usize = 128;

/// Validate an event id taken from the path.
pub(crate) fn parse_event_id(raw: String) -> ApiResult<EventId> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_EVENT_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::bad_request("Invalid event id"));
    }
    Ok(EventId::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_id() {
        assert_eq!(parse_event_id("evt_42-a".into()).unwrap().as_str(), "evt_42-a");
        assert!(parse_event_id(String::new()).is_err());
        assert!(parse_event_id("a b".into()).is_err());
        assert!(parse_event_id("..".into()).is_err());
        assert!(parse_event_id("x".repeat(129)).is_err());
    }
}
