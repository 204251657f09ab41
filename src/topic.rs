//! Topic codec.
//!
//! Bus topics are laid out as `{prefix}/{location}/{group}/{name}` for state
//! publication and `{prefix}/{location}/{group}/{name}/{command}` for inbound
//! commands. Addressing segments are read from fixed offsets counted from the
//! end of the split topic, so extra leading segments are tolerated.

use std::fmt;

/// Suffix of the inbound power command topic.
pub const SET_POWER: &str = "setPower";

/// Topic separator.
const SEPARATOR: &str = "/";

/// Error types for topic decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("Topic '{topic}' has {segments} segments, expected at least {expected}")]
    TooShort {
        topic: String,
        segments: usize,
        expected: usize,
    },
}

/// The (location, group, name) triple that addresses one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicAddress {
    pub location: String,
    pub group: String,
    pub name: String,
}

impl TopicAddress {
    pub fn new(
        location: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            group: group.into(),
            name: name.into(),
        }
    }

    /// Case-insensitive comparison of every field independently.
    pub fn matches(&self, other: &TopicAddress) -> bool {
        eq_ignore_case(&self.location, &other.location)
            && eq_ignore_case(&self.group, &other.group)
            && eq_ignore_case(&self.name, &other.name)
    }
}

impl fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.location, self.group, self.name)
    }
}

/// An inbound command topic split into addressing and command suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTopic {
    pub address: TopicAddress,
    pub command: String,
}

/// Case-folded registry key for a topic.
///
/// Publication keeps the original casing; matching goes through this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicKey(String);

impl TopicKey {
    pub fn new(topic: &str) -> Self {
        Self(topic.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the state topic for a device. Segments are joined verbatim.
pub fn encode(prefix: &str, address: &TopicAddress) -> String {
    [
        prefix,
        address.location.as_str(),
        address.group.as_str(),
        address.name.as_str(),
    ]
    .join(SEPARATOR)
}

/// Build the command topic for a device, e.g. `lifx/home/kitchen/ceiling/setPower`.
pub fn command_topic(prefix: &str, address: &TopicAddress, command: &str) -> String {
    format!("{}{}{}", encode(prefix, address), SEPARATOR, command)
}

/// Wildcard filter subscribed at startup for power commands.
pub fn command_filter(prefix: &str) -> String {
    format!("{prefix}/+/+/+/{SET_POWER}")
}

/// Extract the addressing triple preceding the trailing command suffix.
///
/// Segment content is not validated; empty segments pass through.
pub fn decode(topic: &str) -> Result<TopicAddress, TopicError> {
    decode_command(topic).map(|parsed| parsed.address)
}

/// Split a command topic into its addressing triple and command suffix.
pub fn decode_command(topic: &str) -> Result<CommandTopic, TopicError> {
    let segments: Vec<&str> = topic.split(SEPARATOR).collect();
    let n = segments.len();
    if n < 4 {
        return Err(TopicError::TooShort {
            topic: topic.to_string(),
            segments: n,
            expected: 4,
        });
    }

    Ok(CommandTopic {
        address: TopicAddress::new(segments[n - 4], segments[n - 3], segments[n - 2]),
        command: segments[n - 1].to_string(),
    })
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_joins_segments() {
        let address = TopicAddress::new("Home", "Kitchen", "Ceiling");
        assert_eq!(encode("lifx", &address), "lifx/Home/Kitchen/Ceiling");
    }

    #[test]
    fn test_decode_recovers_encoded_address() {
        let cases = [
            ("Home", "Kitchen", "Ceiling"),
            ("office", "desk", "lamp 1"),
            ("A", "b", "C"),
        ];
        for (location, group, name) in cases {
            let address = TopicAddress::new(location, group, name);
            let topic = command_topic("lifx", &address, SET_POWER);
            assert_eq!(decode(&topic).unwrap(), address);
        }
    }

    #[test]
    fn test_decode_tolerates_extra_leading_segments() {
        let parsed = decode_command("site/a/lifx/Home/Kitchen/Ceiling/setPower").unwrap();
        assert_eq!(parsed.address, TopicAddress::new("Home", "Kitchen", "Ceiling"));
        assert_eq!(parsed.command, SET_POWER);
    }

    #[test]
    fn test_decode_passes_empty_segments_through() {
        let parsed = decode_command("lifx//Kitchen//setPower").unwrap();
        assert_eq!(parsed.address, TopicAddress::new("", "Kitchen", ""));
    }

    #[test]
    fn test_decode_rejects_short_topic() {
        let result = decode("lifx/Kitchen/setPower");
        assert!(matches!(
            result,
            Err(TopicError::TooShort { segments: 3, .. })
        ));
    }

    #[test]
    fn test_command_topic_extends_state_topic() {
        let address = TopicAddress::new("Home", "Kitchen", "Ceiling");
        assert_eq!(
            command_topic("lifx", &address, SET_POWER),
            "lifx/Home/Kitchen/Ceiling/setPower"
        );
    }

    #[test]
    fn test_command_filter() {
        assert_eq!(command_filter("lifx"), "lifx/+/+/+/setPower");
    }

    #[test]
    fn test_topic_key_ignores_case() {
        assert_eq!(
            TopicKey::new("lifx/Home/Kitchen/Ceiling"),
            TopicKey::new("LIFX/home/kitchen/CEILING")
        );
    }

    #[test]
    fn test_address_matches_ignores_case_per_field() {
        let requested = TopicAddress::new("Kitchen", "Lights", "Ceiling");
        let reported = TopicAddress::new("kitchen", "lights", "CEILING");
        assert!(requested.matches(&reported));

        let other = TopicAddress::new("kitchen", "lamps", "CEILING");
        assert!(!requested.matches(&other));
    }
}
