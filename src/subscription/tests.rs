use super::*;
use pretty_assertions::assert_eq;

fn client(id: &str) -> Arc<str> {
    Arc::from(id)
}

fn sub(topic: &str, qos: u8) -> ClientSubscription {
    ClientSubscription::new(topic, QoS::from_u8(qos).unwrap())
}

fn sorted(mut subs: Vec<Subscription>) -> Vec<Subscription> {
    subs.sort_by(|a, b| (&a.client_id, &a.topic).cmp(&(&b.client_id, &b.topic)));
    subs
}

#[test]
fn test_count_subscriptions() {
    let registry = SubscriptionRegistry::new();
    let abcde = client("abcde");
    registry.add_subscriptions(
        &abcde,
        &[sub("hello", 1), sub("matteo", 1), sub("noqos", 0)],
    );
    assert_eq!(registry.count_offline(), (2, 1));

    registry.remove_subscriptions("abcde", &["hello"]);
    assert_eq!(registry.count_offline(), (1, 1));

    registry.remove_subscriptions("abcde", &["matteo"]);
    assert_eq!(registry.count_offline(), (0, 1));

    registry.remove_subscriptions("abcde", &["noqos"]);
    assert_eq!(registry.count_offline(), (0, 0));
}

#[test]
fn test_count_subscriptions_two_clients() {
    let registry = SubscriptionRegistry::new();
    let subs = [sub("hello", 1), sub("matteo", 1), sub("noqos", 0)];
    registry.add_subscriptions(&client("client1"), &subs);
    registry.add_subscriptions(&client("client2"), &subs);
    assert_eq!(registry.count_offline(), (4, 2));

    let steps: [(&str, &str, (usize, usize)); 7] = [
        ("client1", "hello", (3, 2)),
        ("client1", "hello", (3, 2)),
        ("client1", "matteo", (2, 2)),
        ("client1", "noqos", (2, 1)),
        ("client2", "hello", (1, 1)),
        ("client2", "matteo", (0, 1)),
        ("client2", "noqos", (0, 0)),
    ];
    for (client_id, topic, expected) in steps {
        registry.remove_subscriptions(client_id, &[topic]);
        assert_eq!(registry.count_offline(), expected, "{} {}", client_id, topic);
    }
}

#[test]
fn test_qos0_subscriptions_restored_but_not_matched() {
    let registry = SubscriptionRegistry::new();
    let abcde = client("abcde");
    registry.add_subscriptions(
        &abcde,
        &[sub("hello", 0), sub("hello/#", 1), sub("matteo", 1)],
    );

    assert_eq!(
        registry.subscriptions_by_topic("hello"),
        Vec::<Subscription>::new()
    );
    assert_eq!(
        registry.subscriptions_by_topic("hello/world"),
        vec![Subscription::new("abcde", "hello/#", QoS::AtLeastOnce)]
    );
    assert_eq!(
        registry.subscriptions_by_client("abcde"),
        Some(vec![sub("hello", 0), sub("hello/#", 1), sub("matteo", 1)])
    );
}

#[test]
fn test_same_topic_different_qos_in_one_batch() {
    let registry = SubscriptionRegistry::new();
    let abcde = client("abcde");
    registry.add_subscriptions(
        &abcde,
        &[
            sub("hello", 0),
            sub("hello", 1),
            sub("hello", 2),
            sub("hello", 1),
            sub("hello", 0),
        ],
    );

    assert_eq!(
        registry.subscriptions_by_client("abcde"),
        Some(vec![sub("hello", 0)])
    );
    assert!(registry.subscriptions_by_topic("hello").is_empty());
    assert_eq!(registry.count_offline(), (0, 1));
}

#[test]
fn test_replace_subscriptions() {
    let registry = SubscriptionRegistry::new();
    let abcde = client("abcde");

    registry.add_subscriptions(&abcde, &[sub("hello", 1)]);
    assert_eq!(
        registry.subscriptions_by_topic("hello"),
        vec![Subscription::new("abcde", "hello", QoS::AtLeastOnce)]
    );

    registry.add_subscriptions(&abcde, &[sub("hello", 2)]);
    assert_eq!(
        registry.subscriptions_by_topic("hello"),
        vec![Subscription::new("abcde", "hello", QoS::ExactlyOnce)]
    );
    assert_eq!(registry.count_offline(), (1, 1));

    registry.add_subscriptions(&abcde, &[sub("hello", 0)]);
    assert!(registry.subscriptions_by_topic("hello").is_empty());
    assert_eq!(registry.count_offline(), (0, 1));

    registry.add_subscriptions(&abcde, &[sub("hello", 1)]);
    assert_eq!(registry.count_offline(), (1, 1));
}

#[test]
fn test_update_keeps_first_subscription_order() {
    let registry = SubscriptionRegistry::new();
    let abcde = client("abcde");
    registry.add_subscriptions(&abcde, &[sub("a", 1), sub("b", 1), sub("c", 0)]);
    registry.add_subscriptions(&abcde, &[sub("a", 2)]);

    assert_eq!(
        registry.subscriptions_by_client("abcde"),
        Some(vec![sub("a", 2), sub("b", 1), sub("c", 0)])
    );
}

#[test]
fn test_empty_batch_creates_client_record() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("abcde"), &[]);

    assert_eq!(registry.subscriptions_by_client("abcde"), Some(vec![]));
    assert_eq!(registry.count_offline(), (0, 1));
}

#[test]
fn test_clean_subscriptions() {
    let registry = SubscriptionRegistry::new();
    let abcde = client("abcde");
    registry.add_subscriptions(&abcde, &[sub("hello", 1), sub("matteo", 0)]);

    registry.clean_subscriptions("abcde");
    assert_eq!(registry.subscriptions_by_client("abcde"), None);
    assert!(registry.subscriptions_by_topic("hello").is_empty());
    assert_eq!(registry.count_offline(), (0, 0));
    assert_eq!(registry.node_count(), 0);

    // unknown client
    registry.clean_subscriptions("nobody");
    registry.remove_subscriptions("nobody", &["hello"]);
}

#[test]
fn test_remove_unknown_topic_is_noop() {
    let registry = SubscriptionRegistry::new();
    let abcde = client("abcde");
    registry.add_subscriptions(&abcde, &[sub("hello", 1)]);

    registry.remove_subscriptions("abcde", &["world"]);
    assert_eq!(registry.count_offline(), (1, 1));
    assert_eq!(
        registry.subscriptions_by_client("abcde"),
        Some(vec![sub("hello", 1)])
    );
}

#[test]
fn test_subscriptions_by_topic_with_wildcards() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("a"), &[sub("hello/+", 1), sub("hello/#", 2)]);
    registry.add_subscriptions(&client("b"), &[sub("hello/world", 1), sub("#", 1)]);

    let expected = sorted(vec![
        Subscription::new("a", "hello/+", QoS::AtLeastOnce),
        Subscription::new("a", "hello/#", QoS::ExactlyOnce),
        Subscription::new("b", "hello/world", QoS::AtLeastOnce),
        Subscription::new("b", "#", QoS::AtLeastOnce),
    ]);
    assert_eq!(sorted(registry.subscriptions_by_topic("hello/world")), expected);

    // `#` needs at least one more level
    assert_eq!(
        registry.subscriptions_by_topic("hello"),
        vec![Subscription::new("b", "#", QoS::AtLeastOnce)]
    );
}

#[test]
fn test_subscribe_to_empty_topic() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("abcde"), &[sub("", 1)]);

    assert_eq!(
        registry.subscriptions_by_topic(""),
        vec![Subscription::new("abcde", "", QoS::AtLeastOnce)]
    );
    assert!(registry.subscriptions_by_topic("/").is_empty());
}

#[test]
fn test_subscriptions_by_topic_pattern() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("a"), &[sub("foo/+", 1), sub("foo/bar", 1)]);
    registry.add_subscriptions(&client("b"), &[sub("foo/+", 2)]);

    assert_eq!(
        registry.subscriptions_by_topic_pattern("foo/bar", "foo/+"),
        vec![
            Subscription::new("a", "foo/+", QoS::AtLeastOnce),
            Subscription::new("b", "foo/+", QoS::ExactlyOnce),
        ]
    );
    assert!(registry
        .subscriptions_by_topic_pattern("foo/bar", "foo/#")
        .is_empty());
}

#[test]
fn test_is_last_subscriber() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("a"), &[sub("foo/+", 1), sub("foo/#", 1)]);

    assert!(registry.is_last_subscriber("foo/+", "a"));
    assert!(registry.is_last_subscriber("foo/#", "a"));
    assert!(!registry.is_last_subscriber("foo/+", "b"));

    registry.add_subscriptions(&client("b"), &[sub("foo/+", 1)]);
    assert!(!registry.is_last_subscriber("foo/+", "a"));
    // A different pattern matching the same levels does not count
    assert!(registry.is_last_subscriber("foo/#", "a"));
}

#[test]
fn test_client_list_is_exact() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("a"), &[sub("hello", 0), sub("hello/#", 1)]);
    registry.add_subscriptions(&client("b"), &[sub("hello", 2)]);
    registry.add_subscriptions(&client("c"), &[sub("hello/world", 1)]);

    assert_eq!(registry.client_list("hello"), vec![client("a"), client("b")]);
    assert_eq!(registry.client_list("hello/#"), vec![client("a")]);
    assert!(registry.client_list("hello/+").is_empty());
}

#[test]
fn test_node_count_returns_to_baseline() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("a"), &[sub("a/b", 1)]);
    let baseline = registry.node_count();

    registry.add_subscriptions(&client("b"), &[sub("a/b/c/+/#", 1)]);
    assert!(registry.node_count() > baseline);

    registry.remove_subscriptions("b", &["a/b/c/+/#"]);
    assert_eq!(registry.node_count(), baseline);
}

#[test]
fn test_clear() {
    let registry = SubscriptionRegistry::new();
    registry.add_subscriptions(&client("a"), &[sub("a/b", 1), sub("c", 0)]);
    registry.clear();

    assert_eq!(registry.count_offline(), (0, 0));
    assert_eq!(registry.subscriptions_by_client("a"), None);
}

mod strategy {
    use super::*;
    use crate::topic::TopicTrie;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_removing_value_ignores_topic() {
        let mut trie: TopicTrie<Subscribers> = TopicTrie::new();
        trie.add("a/b", Subscription::new("test1", "a/b", QoS::AtLeastOnce));
        trie.add("a/b", Subscription::new("test2", "a/b", QoS::ExactlyOnce));
        assert_eq!(trie.strategy().subscriptions_count(), 2);

        trie.remove("a/b", &SubscriberKey::new("test1", "something"));
        assert_eq!(
            trie.match_values("a/b"),
            vec![Subscription::new("test2", "a/b", QoS::ExactlyOnce)]
        );
        assert_eq!(trie.strategy().subscriptions_count(), 1);
    }

    #[test]
    fn test_count_ignores_qos_updates() {
        let mut trie: TopicTrie<Subscribers> = TopicTrie::new();
        trie.add("a/b", Subscription::new("test1", "a/b", QoS::AtLeastOnce));
        trie.add("a/b", Subscription::new("test1", "a/b", QoS::ExactlyOnce));
        trie.add("a/+", Subscription::new("test1", "a/+", QoS::AtLeastOnce));

        assert_eq!(trie.strategy().subscriptions_count(), 2);
        assert_eq!(trie.match_count("a/b"), 2);

        trie.remove("a/b", &SubscriberKey::new("unknown", "a/b"));
        assert_eq!(trie.strategy().subscriptions_count(), 2);

        trie.remove_all("a/+");
        assert_eq!(trie.strategy().subscriptions_count(), 1);

        trie.clear();
        assert_eq!(trie.strategy().subscriptions_count(), 0);
    }

    #[test]
    fn test_match_reports_stored_pattern() {
        let mut trie: TopicTrie<Subscribers> = TopicTrie::new();
        trie.add("a/#", Subscription::new("c", "a/#", QoS::AtLeastOnce));

        assert_eq!(
            trie.match_values("a/b/c"),
            vec![Subscription::new("c", "a/#", QoS::AtLeastOnce)]
        );
    }
}
