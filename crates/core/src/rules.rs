//! Predicate chain deciding which events are forwarded.
//!
//! Rules are evaluated in order and the first match wins (logical OR).
//! An event no rule recognises is dropped; that is normal operation.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::config::RuleConfig;
use crate::event::Event;
use crate::mutation::{Mutation, Redaction};
use crate::owner::parse_owner;

pub const FRIEND_LOCATION: &str = "friend-location";
pub const FRIEND_OFFLINE: &str = "friend-offline";

const LOCATION_USER_ID: &str = "message.content.user.id";
const LOCATION: &str = "message.content.location";
const TRAVELING_TO: &str = "message.content.travelingToLocation";
const OFFLINE_USER_ID: &str = "message.content.userId";

const PRIVATE_LOCATION: &str = "private";
const TRAVELING_LOCATION: &str = "traveling";

/// Outcome of evaluating an event.
#[derive(Clone, Default)]
pub struct MatchResult {
    pub forward: bool,
    /// Applied to the nested content before forwarding, if present.
    pub mutation: Option<Mutation>,
}

impl MatchResult {
    pub fn reject() -> Self {
        Self::default()
    }

    pub fn forward() -> Self {
        Self {
            forward: true,
            mutation: None,
        }
    }

    pub fn forward_with(mutation: Option<Mutation>) -> Self {
        Self {
            forward: true,
            mutation,
        }
    }
}

impl fmt::Debug for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchResult")
            .field("forward", &self.forward)
            .field("mutation", &self.mutation.is_some())
            .finish()
    }
}

/// `"private"` on its own, or a trailing bare `~private` tag on a location
/// that names no owner. A location naming an owner is never private.
fn is_private(location: &str) -> bool {
    if location == PRIVATE_LOCATION {
        return true;
    }
    location.rsplit('~').next() == Some(PRIVATE_LOCATION) && parse_owner(location).is_empty()
}

/// One independent match rule.
pub trait MatchRule: Send + Sync {
    fn evaluate(&self, event: &Event) -> MatchResult;
}

/// A friend moved to a new instance.
///
/// Forwards when the subject is the allow-listed user (a missing subject
/// field does not veto) and the instance is either private or owned by an
/// allow-listed owner.
pub struct FriendLocationRule {
    allow_user_id: String,
    allow_owner_ids: HashSet<String>,
    redaction: Option<Mutation>,
}

impl FriendLocationRule {
    pub fn new(config: &RuleConfig) -> Self {
        let redaction = Redaction::new(config.redact_fields.clone());
        Self {
            allow_user_id: config.allow_user_id.clone(),
            allow_owner_ids: config.allow_owner_ids.iter().cloned().collect(),
            redaction: (!redaction.is_empty()).then(|| Arc::new(redaction) as Mutation),
        }
    }
}

impl MatchRule for FriendLocationRule {
    fn evaluate(&self, event: &Event) -> MatchResult {
        if event.event_type() != Some(FRIEND_LOCATION) {
            return MatchResult::reject();
        }

        if let Some(id) = event.get_str(LOCATION_USER_ID) {
            if id != self.allow_user_id {
                return MatchResult::reject();
            }
        }

        let Some(mut location) = event.get_str(LOCATION) else {
            return MatchResult::reject();
        };

        if is_private(location) {
            return MatchResult::forward();
        }

        if location == TRAVELING_LOCATION {
            if let Some(destination) = event.get_str(TRAVELING_TO) {
                location = destination;
            }
        }

        if self.allow_owner_ids.contains(parse_owner(location)) {
            MatchResult::forward_with(self.redaction.clone())
        } else {
            MatchResult::reject()
        }
    }
}

/// A friend went offline. Strict: the subject field must be present and
/// equal to the allow-listed user.
pub struct FriendOfflineRule {
    allow_user_id: String,
}

impl FriendOfflineRule {
    pub fn new(config: &RuleConfig) -> Self {
        Self {
            allow_user_id: config.allow_user_id.clone(),
        }
    }
}

impl MatchRule for FriendOfflineRule {
    fn evaluate(&self, event: &Event) -> MatchResult {
        if event.event_type() != Some(FRIEND_OFFLINE) {
            return MatchResult::reject();
        }

        match event.get_str(OFFLINE_USER_ID) {
            Some(id) if id == self.allow_user_id => MatchResult::forward(),
            _ => MatchResult::reject(),
        }
    }
}

/// Ordered list of rules; first match short-circuits.
#[derive(Default)]
pub struct PredicateChain {
    rules: Vec<Box<dyn MatchRule>>,
}

impl PredicateChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain: friend-location, then friend-offline.
    pub fn from_config(config: &RuleConfig) -> Self {
        Self::new()
            .with_rule(FriendLocationRule::new(config))
            .with_rule(FriendOfflineRule::new(config))
    }

    pub fn with_rule(mut self, rule: impl MatchRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, event: &Event) -> MatchResult {
        self.rules
            .iter()
            .map(|rule| rule.evaluate(event))
            .find(|result| result.forward)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn config() -> RuleConfig {
        RuleConfig::new("u1", vec!["g1".into(), "usr_ok".into()])
    }

    fn event(value: Value) -> Event {
        Event::decode(&value.to_string()).unwrap()
    }

    fn location_event(user: Option<&str>, location: &str) -> Event {
        let mut value = json!({
            "message.type": FRIEND_LOCATION,
            "message.content.location": location,
            "raw": "{}",
        });
        if let Some(user) = user {
            value[LOCATION_USER_ID] = Value::from(user);
        }
        event(value)
    }

    // -- Rule A --

    #[test]
    fn private_location_forwards_without_mutation() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~private"));
        assert!(result.forward);
        assert!(result.mutation.is_none());

        let result = chain.evaluate(&location_event(Some("u1"), "private"));
        assert!(result.forward);
        assert!(result.mutation.is_none());
    }

    #[test]
    fn private_tag_does_not_override_a_disallowed_owner() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~hidden(u9)~private"));
        assert!(!result.forward);

        let result = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~private~region(jp)"));
        assert!(!result.forward);
    }

    #[test]
    fn private_tag_with_allowed_owner_goes_through_owner_match() {
        let config = config().with_redact_fields(vec!["user.bio".into()]);
        let chain = PredicateChain::from_config(&config);
        let result = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~group(g1)~private"));
        assert!(result.forward);
        assert!(result.mutation.is_some());
    }

    #[test]
    fn private_owner_tag_forwards_when_allowed() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~private(usr_ok)"));
        assert!(result.forward);
        assert!(result.mutation.is_none());
    }

    #[test]
    fn hidden_instance_of_unknown_owner_is_dropped() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~hidden(u9)"));
        assert!(!result.forward);
    }

    #[test]
    fn group_instance_of_allowed_owner_forwards() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~group(g1)"));
        assert!(result.forward);
    }

    #[test]
    fn other_subject_is_dropped() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&location_event(Some("u2"), "private"));
        assert!(!result.forward);
    }

    #[test]
    fn missing_subject_does_not_veto() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&location_event(None, "wrld_x:1~group(g1)"));
        assert!(result.forward);
    }

    #[test]
    fn missing_location_is_dropped() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&event(json!({
            "message.type": FRIEND_LOCATION,
            "message.content.user.id": "u1",
        })));
        assert!(!result.forward);
    }

    #[test]
    fn traveling_uses_destination() {
        let chain = PredicateChain::from_config(&config());

        let mut value = json!({
            "message.type": FRIEND_LOCATION,
            "message.content.user.id": "u1",
            "message.content.location": "traveling",
            "message.content.travelingToLocation": "wrld_y:2~friends(usr_ok)",
        });
        assert!(chain.evaluate(&event(value.clone())).forward);

        value[TRAVELING_TO] = Value::from("wrld_y:2~friends(usr_no)");
        assert!(!chain.evaluate(&event(value)).forward);
    }

    #[test]
    fn traveling_without_destination_matches_empty_owner_only() {
        let value = json!({
            "message.type": FRIEND_LOCATION,
            "message.content.location": "traveling",
        });

        let chain = PredicateChain::from_config(&config());
        assert!(!chain.evaluate(&event(value.clone())).forward);

        let permissive = RuleConfig::new("u1", vec![String::new()]);
        let chain = PredicateChain::from_config(&permissive);
        assert!(chain.evaluate(&event(value)).forward);
    }

    #[test]
    fn redaction_supplied_for_owner_matches_only() {
        let config = config().with_redact_fields(vec!["user.bio".into()]);
        let chain = PredicateChain::from_config(&config);

        let owned = chain.evaluate(&location_event(Some("u1"), "wrld_x:1~group(g1)"));
        assert!(owned.forward);
        assert!(owned.mutation.is_some());

        let private = chain.evaluate(&location_event(Some("u1"), "private"));
        assert!(private.forward);
        assert!(private.mutation.is_none());
    }

    // -- Rule B --

    #[test]
    fn offline_exact_subject_forwards() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&event(json!({
            "message.type": FRIEND_OFFLINE,
            "message.content.userId": "u1",
        })));
        assert!(result.forward);
    }

    #[test]
    fn offline_other_subject_is_dropped() {
        let chain = PredicateChain::from_config(&config());
        let result = chain.evaluate(&event(json!({
            "message.type": FRIEND_OFFLINE,
            "message.content.userId": "u2",
        })));
        assert!(!result.forward);
    }

    #[test]
    fn offline_missing_subject_is_dropped_even_for_empty_allow_value() {
        let chain = PredicateChain::from_config(&RuleConfig::new("", vec![]));
        let result = chain.evaluate(&event(json!({"message.type": FRIEND_OFFLINE})));
        assert!(!result.forward);
    }

    // -- Chain --

    #[test]
    fn unknown_or_missing_type_is_dropped() {
        let chain = PredicateChain::from_config(&config());
        assert!(!chain.evaluate(&event(json!({"message.type": "friend-online"}))).forward);
        assert!(!chain.evaluate(&event(json!({"raw": "x"}))).forward);
    }

    #[test]
    fn empty_chain_drops_everything() {
        let chain = PredicateChain::new();
        assert!(chain.is_empty());
        assert!(!chain.evaluate(&location_event(Some("u1"), "private")).forward);
    }

    struct Always(bool);

    impl MatchRule for Always {
        fn evaluate(&self, _: &Event) -> MatchResult {
            if self.0 {
                MatchResult::forward()
            } else {
                MatchResult::reject()
            }
        }
    }

    #[test]
    fn first_match_short_circuits() {
        let chain = PredicateChain::new()
            .with_rule(Always(false))
            .with_rule(Always(true))
            .with_rule(Always(false));
        assert_eq!(chain.len(), 3);
        assert!(chain.evaluate(&event(json!({}))).forward);
    }
}
