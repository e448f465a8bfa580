/// Allow-lists consumed by the predicate chain.
///
/// Built once at startup and handed to
/// [`PredicateChain::from_config`](crate::rules::PredicateChain::from_config).
/// Rules keep their own copies; nothing behind a match is mutable.
#[derive(Debug, Clone, Default)]
pub struct RuleConfig {
    /// Subject id whose presence events are forwarded.
    pub allow_user_id: String,
    /// Owners (users or groups) whose instances may be disclosed.
    pub allow_owner_ids: Vec<String>,
    /// Dotted paths stripped from message content before forwarding.
    /// Empty means forwarded content is left untouched.
    pub redact_fields: Vec<String>,
}

impl RuleConfig {
    pub fn new(allow_user_id: impl Into<String>, allow_owner_ids: Vec<String>) -> Self {
        Self {
            allow_user_id: allow_user_id.into(),
            allow_owner_ids,
            redact_fields: Vec::new(),
        }
    }

    pub fn with_redact_fields(mut self, fields: Vec<String>) -> Self {
        self.redact_fields = fields;
        self
    }
}
