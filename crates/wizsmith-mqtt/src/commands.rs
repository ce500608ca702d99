//! Command topic handling.
//!
//! The agent subscribes to `wizsmith/commands/#`. A message published at
//! `wizsmith/commands/{device_id}/{action...}` is forwarded to the manager
//! as an attribute update.

/// Subscription filter for inbound commands.
pub const COMMAND_TOPIC_FILTER: &str = "wizsmith/commands/#";

const COMMAND_TOPIC_PREFIX: &str = "wizsmith/commands/";

/// Split a command topic into `(device_id, action_path)`. The action path
/// may be empty; topics outside the command prefix yield `None`.
pub fn parse_command_topic(topic: &str) -> Option<(String, String)> {
    let rest = topic.strip_prefix(COMMAND_TOPIC_PREFIX)?;
    let (device_id, action) = match rest.split_once('/') {
        Some((device_id, action)) => (device_id, action),
        None => (rest, ""),
    };
    if device_id.is_empty() {
        return None;
    }
    Some((device_id.to_string(), action.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_and_action() {
        assert_eq!(
            parse_command_topic("wizsmith/commands/dev1/light/on"),
            Some(("dev1".to_string(), "light/on".to_string()))
        );
    }

    #[test]
    fn action_may_be_empty() {
        assert_eq!(
            parse_command_topic("wizsmith/commands/dev1"),
            Some(("dev1".to_string(), String::new()))
        );
    }

    #[test]
    fn other_topics_are_ignored() {
        assert!(parse_command_topic("wizsmith/dev1/sensor/temp/state").is_none());
        assert!(parse_command_topic("wizsmith/commands/").is_none());
        assert!(parse_command_topic("homeassistant/sensor/x/config").is_none());
    }
}
