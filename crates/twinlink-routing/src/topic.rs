//! Topic construction and MQTT filter matching.

/// Namespace of the device's things.
pub const DITTO_NAMESPACE: &str = "azure.edge";

/// Local topics the mapped telemetry handler subscribes to.
pub const TELEMETRY_LOCAL_TOPICS: &str = "event/#,e/#,telemetry/#,t/#";

/// Match a topic against an MQTT filter.
///
/// `+` matches exactly one level, `#` as the last level matches the parent
/// level and everything below it.
pub fn matches_filter(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return filter_parts.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Cloud topic of an outgoing telemetry message.
pub fn telemetry_topic(device_id: &str, message_id: &str) -> String {
    format!("devices/{}/messages/events/$.mid={}", device_id, message_id)
}

/// `<hub>:<device>` thing id prefix.
pub fn device_thing_prefix(hub_name: &str, device_id: &str) -> String {
    format!("{}:{}", hub_name, device_id)
}

/// Local routing topic of a mapped command.
pub fn command_topic(hub_name: &str, device_id: &str, thing: &str, request_id: &str, action: &str) -> String {
    if thing.is_empty() {
        format!("command///req/{}/{}", request_id, action)
    } else {
        format!(
            "command//{}:{}:{}/req/{}/{}",
            DITTO_NAMESPACE,
            device_thing_prefix(hub_name, device_id),
            thing,
            request_id,
            action
        )
    }
}

/// Ditto topic of a live message sent to a thing.
pub fn live_message_topic(hub_name: &str, device_id: &str, thing: &str, action: &str) -> String {
    let thing_id = if thing.is_empty() {
        device_thing_prefix(hub_name, device_id)
    } else {
        format!("{}:{}", device_thing_prefix(hub_name, device_id), thing)
    };
    format!("{}/{}/things/live/messages/{}", DITTO_NAMESPACE, thing_id, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_exact() {
        assert!(matches_filter("event/status", "event/status"));
        assert!(!matches_filter("event/status", "event/status/x"));
        assert!(!matches_filter("event/status/x", "event/status"));
    }

    #[test]
    fn test_filter_single_level() {
        assert!(matches_filter("e/+/status", "e/dev1/status"));
        assert!(!matches_filter("e/+/status", "e/dev1/x/status"));
        assert!(!matches_filter("e/+", "e"));
    }

    #[test]
    fn test_filter_multi_level() {
        assert!(matches_filter("event/#", "event"));
        assert!(matches_filter("event/#", "event/a/b/c"));
        assert!(matches_filter("#", "anything/at/all"));
        assert!(!matches_filter("event/#", "events/a"));
        assert!(!matches_filter("event/#/x", "event/a/x"));
    }

    #[test]
    fn test_telemetry_topic() {
        assert_eq!(
            telemetry_topic("dummy-device", "42"),
            "devices/dummy-device/messages/events/$.mid=42"
        );
    }

    #[test]
    fn test_command_topic() {
        assert_eq!(
            command_topic("dummy-hub", "dummy-device", "edge:containers", "C2D-1", "apply"),
            "command//azure.edge:dummy-hub:dummy-device:edge:containers/req/C2D-1/apply"
        );
        assert_eq!(
            command_topic("dummy-hub", "dummy-device", "", "C2D-1", "apply"),
            "command///req/C2D-1/apply"
        );
    }

    #[test]
    fn test_live_message_topic() {
        assert_eq!(
            live_message_topic("dummy-hub", "dummy-device", "edge:containers", "apply"),
            "azure.edge/dummy-hub:dummy-device:edge:containers/things/live/messages/apply"
        );
        assert_eq!(
            live_message_topic("dummy-hub", "dummy-device", "", "send"),
            "azure.edge/dummy-hub:dummy-device/things/live/messages/send"
        );
    }
}
