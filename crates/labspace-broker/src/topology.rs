//! Exchange and queue topology.
//!
//! One topic exchange, one durable queue bound with a wildcard pattern per
//! event family. Patterns follow AMQP topic semantics: words are separated by
//! `.`, `*` matches exactly one word and `#` matches zero or more words.

/// Binding patterns of the consumer queue.
pub const QUEUE_BINDINGS: [&str; 2] = ["workspace.#", "k8s.#"];

/// Whether a routing key matches a topic binding pattern.
#[must_use]
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) if word == "*" || word == first => {
                matches_words(rest, key_rest)
            }
            _ => false,
        },
    }
}

/// Whether the consumer queue receives messages published with `routing_key`.
#[must_use]
pub fn is_routed_to_queue(routing_key: &str) -> bool {
    QUEUE_BINDINGS
        .iter()
        .any(|pattern| topic_matches(pattern, routing_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use labspace_core::routing;

    #[test]
    fn hash_matches_any_suffix() {
        assert!(topic_matches("k8s.#", "k8s.workspace.started"));
        assert!(topic_matches("k8s.#", "k8s"));
        assert!(!topic_matches("k8s.#", "workspace.status.idle"));
        assert!(topic_matches("#", "anything.at.all"));
    }

    #[test]
    fn star_matches_one_word() {
        assert!(topic_matches("workspace.*.idle", "workspace.status.idle"));
        assert!(!topic_matches("workspace.*", "workspace.status.idle"));
        assert!(!topic_matches("workspace.*.idle", "workspace.idle"));
    }

    #[test]
    fn published_keys_reach_the_queue() {
        for key in [
            routing::WORKSPACE_SCHEDULED,
            routing::WORKSPACE_CREATED,
            routing::WORKSPACE_STARTED,
            routing::WORKSPACE_FAILED,
            routing::WORKSPACE_DELETED,
            routing::STATUS_ALIVE,
            routing::STATUS_IDLE,
        ] {
            assert!(is_routed_to_queue(key), "{key}");
        }
        assert!(!is_routed_to_queue(routing::TEST_CONNECTION));
    }
}
