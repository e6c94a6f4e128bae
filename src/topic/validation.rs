//! Topic name and filter validation
//!
//! Key rules:
//! - Topic names MUST NOT contain wildcards
//! - Topic filters MAY contain wildcards
//! - The multi-level wildcard must occupy the last level
//! - The single-level wildcard must occupy an entire level
//!
//! Wildcard tokens and the separator come from [`TrieOptions`], so a trie
//! configured with `.` and `*` validates against those instead of `/` and `+`.

use super::trie::TrieOptions;

/// Maximum encoded length of a topic
const MAX_TOPIC_LEN: usize = 65535;

/// Represents a level in a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicLevel<'a> {
    /// Normal topic level
    Normal(&'a str),
    /// Single-level wildcard
    SingleWildcard,
    /// Multi-level wildcard
    MultiWildcard,
}

/// Parse topic into levels
pub fn parse_levels<'a>(
    topic: &'a str,
    options: &'a TrieOptions,
) -> impl Iterator<Item = TopicLevel<'a>> + 'a {
    topic.split(options.separator).map(move |level| {
        if level == options.wildcard_one {
            TopicLevel::SingleWildcard
        } else if level == options.wildcard_some {
            TopicLevel::MultiWildcard
        } else {
            TopicLevel::Normal(level)
        }
    })
}

fn check_common(topic: &str) -> Result<(), &'static str> {
    if topic.len() > MAX_TOPIC_LEN {
        return Err("topic exceeds maximum length");
    }

    if topic.contains('\0') {
        return Err("topic cannot contain null character");
    }

    Ok(())
}

fn contains_token(level: &str, token: &str) -> bool {
    !token.is_empty() && level.contains(token)
}

/// Validate a topic name (used in PUBLISH)
///
/// The empty string is a valid topic: it is a single empty level.
/// `max_levels` of 0 means unlimited.
pub fn validate_topic_name(
    topic: &str,
    options: &TrieOptions,
    max_levels: usize,
) -> Result<(), &'static str> {
    check_common(topic)?;

    let mut count = 0;
    for level in topic.split(options.separator) {
        count += 1;
        if contains_token(level, &options.wildcard_one)
            || contains_token(level, &options.wildcard_some)
        {
            return Err("topic name cannot contain wildcards");
        }
    }

    if max_levels > 0 && count > max_levels {
        return Err("topic exceeds maximum allowed levels");
    }

    Ok(())
}

/// Validate a topic filter (used in SUBSCRIBE/UNSUBSCRIBE)
///
/// `max_levels` of 0 means unlimited; a trailing multi-level wildcard counts
/// as a level.
pub fn validate_topic_filter(
    filter: &str,
    options: &TrieOptions,
    max_levels: usize,
) -> Result<(), &'static str> {
    check_common(filter)?;

    let levels: Vec<&str> = filter.split(options.separator).collect();

    if max_levels > 0 && levels.len() > max_levels {
        return Err("topic filter exceeds maximum allowed levels");
    }

    for (i, level) in levels.iter().enumerate() {
        if contains_token(level, &options.wildcard_some) {
            if *level != options.wildcard_some {
                return Err("multi-level wildcard must occupy entire level");
            }
            if i != levels.len() - 1 {
                return Err("multi-level wildcard must be last level");
            }
        }

        if contains_token(level, &options.wildcard_one) && *level != options.wildcard_one {
            return Err("single-level wildcard must occupy entire level");
        }
    }

    Ok(())
}

/// Check if a topic filter matches a topic name
///
/// Matching rules:
/// - the single-level wildcard matches exactly one level
/// - the multi-level wildcard matches one or more trailing levels
pub fn topic_matches_filter(topic: &str, filter: &str, options: &TrieOptions) -> bool {
    let mut topic_levels = topic.split(options.separator);

    for level in parse_levels(filter, options) {
        match level {
            TopicLevel::MultiWildcard => return topic_levels.next().is_some(),
            TopicLevel::SingleWildcard => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            TopicLevel::Normal(expected) => {
                if topic_levels.next() != Some(expected) {
                    return false;
                }
            }
        }
    }

    // Both must be exhausted for a match
    topic_levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn opts() -> TrieOptions {
        TrieOptions::default()
    }

    #[test]
    fn test_validate_topic_name() {
        let o = opts();
        assert!(validate_topic_name("test", &o, 0).is_ok());
        assert!(validate_topic_name("test/topic", &o, 0).is_ok());
        assert!(validate_topic_name("/test/topic", &o, 0).is_ok());
        assert!(validate_topic_name("test/topic/", &o, 0).is_ok());
        assert!(validate_topic_name("", &o, 0).is_ok());

        assert!(validate_topic_name("test+topic", &o, 0).is_err());
        assert!(validate_topic_name("test#topic", &o, 0).is_err());
        assert!(validate_topic_name("test/+/topic", &o, 0).is_err());
        assert!(validate_topic_name("test/#", &o, 0).is_err());
        assert!(validate_topic_name("nul\0", &o, 0).is_err());
    }

    #[test]
    fn test_validate_topic_filter() {
        let o = opts();
        assert!(validate_topic_filter("test", &o, 0).is_ok());
        assert!(validate_topic_filter("+", &o, 0).is_ok());
        assert!(validate_topic_filter("#", &o, 0).is_ok());
        assert!(validate_topic_filter("test/#", &o, 0).is_ok());
        assert!(validate_topic_filter("+/+/+", &o, 0).is_ok());
        assert!(validate_topic_filter("test/+/topic", &o, 0).is_ok());
        assert!(validate_topic_filter("", &o, 0).is_ok());

        assert!(validate_topic_filter("test+", &o, 0).is_err());
        assert!(validate_topic_filter("test#", &o, 0).is_err());
        assert!(validate_topic_filter("test/#/more", &o, 0).is_err());
        assert!(validate_topic_filter("+test", &o, 0).is_err());
    }

    #[test]
    fn test_max_levels() {
        let o = opts();
        assert!(validate_topic_name("a/b/c/d/e", &o, 0).is_ok());
        assert!(validate_topic_name("a/b/c", &o, 3).is_ok());
        assert!(validate_topic_name("a/b/c/d", &o, 3).is_err());
        // Empty levels still count
        assert!(validate_topic_name("/a/b/c", &o, 3).is_err());

        assert!(validate_topic_filter("a/b/#", &o, 3).is_ok());
        assert!(validate_topic_filter("a/b/c/#", &o, 3).is_err());
        assert!(validate_topic_filter("#", &o, 1).is_ok());
    }

    #[test]
    fn test_custom_tokens() {
        let o = TrieOptions {
            separator: '.',
            wildcard_one: "*".to_string(),
            wildcard_some: "#".to_string(),
        };
        assert!(validate_topic_filter("a.*.#", &o, 0).is_ok());
        assert!(validate_topic_filter("a.b*", &o, 0).is_err());
        // `+` is an ordinary character here
        assert!(validate_topic_name("a.+", &o, 0).is_ok());
        assert!(topic_matches_filter("a.b.c", "a.*.c", &o));
    }

    #[test_case("test", "test", true ; "exact")]
    #[test_case("test/topic", "test/+", true ; "plus last")]
    #[test_case("test/topic", "+/topic", true ; "plus first")]
    #[test_case("a/b/c", "+/b/+", true ; "plus twice")]
    #[test_case("test", "+/+", false ; "plus needs level")]
    #[test_case("test/topic/extra", "test/+", false ; "plus single level")]
    #[test_case("test", "#", true ; "hash root")]
    #[test_case("test/topic/more", "test/#", true ; "hash deep")]
    #[test_case("test", "test/#", false ; "hash needs one level")]
    #[test_case("test/", "test/#", true ; "hash empty level")]
    #[test_case("other/topic", "test/#", false ; "hash prefix mismatch")]
    #[test_case("$SYS/test", "#", true ; "dollar not special")]
    #[test_case("", "", true ; "empty topic")]
    #[test_case("a//b", "a/+/b", true ; "plus empty level")]
    fn test_topic_matches(topic: &str, filter: &str, expected: bool) {
        assert_eq!(topic_matches_filter(topic, filter, &opts()), expected);
    }
}
