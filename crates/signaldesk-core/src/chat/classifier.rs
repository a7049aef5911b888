//! Keyword-driven reply selection for the support bot.
//!
//! Rules are checked in order against the lowercased message; the first rule
//! with a matching keyword wins. When nothing matches, one of the fallback
//! prompts is picked at random.

use rand::seq::SliceRandom;
use rand::Rng;

pub const HANDOFF_REPLY: &str =
    "I'm connecting you with a human agent now. Please wait a moment...";

const HANDOFF_KEYWORDS: &[&str] = &[
    "human",
    "agent",
    "speak to someone",
    "escalate",
    "manager",
    "representative",
];

const FALLBACK_REPLIES: &[&str] = &[
    "I understand your concern. Could you provide more details so I can better assist you?",
    "That's a great question! Let me help you with that. Can you be more specific about what you need?",
    "I'm here to help! Could you tell me more about the issue you're experiencing?",
    "Thanks for reaching out! What specific area would you like assistance with?",
];

/// One entry in the rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRule {
    keywords: Vec<String>,
    response: String,
    handoff: bool,
}

impl ReplyRule {
    /// A rule that answers with `response` when any keyword appears.
    pub fn new<I, S>(keywords: I, response: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
            response: response.into(),
            handoff: false,
        }
    }

    /// Mark this rule as requesting a human agent.
    pub fn with_handoff(mut self) -> Self {
        self.handoff = true;
        self
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// Outcome of classifying one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub handoff: bool,
}

/// Ordered rule table with a random fallback.
#[derive(Debug, Clone)]
pub struct ReplyClassifier {
    rules: Vec<ReplyRule>,
    fallbacks: Vec<String>,
}

impl ReplyClassifier {
    /// An empty table that only answers with `fallbacks`.
    pub fn with_fallbacks<I, S>(fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: Vec::new(),
            fallbacks: fallbacks.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a rule with the lowest priority so far.
    pub fn rule(mut self, rule: ReplyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule at `index`, shifting lower-priority rules down.
    pub fn insert_rule(&mut self, index: usize, rule: ReplyRule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    pub fn rules(&self) -> &[ReplyRule] {
        &self.rules
    }

    pub fn fallbacks(&self) -> &[String] {
        &self.fallbacks
    }

    /// Classify using the thread-local RNG for the fallback pick.
    pub fn classify(&self, text: &str) -> Reply {
        self.classify_with(text, &mut rand::thread_rng())
    }

    /// Classify with an explicit RNG (deterministic in tests).
    pub fn classify_with<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> Reply {
        let lowered = text.to_lowercase();

        if let Some(rule) = self.rules.iter().find(|r| r.matches(&lowered)) {
            return Reply {
                text: rule.response.clone(),
                handoff: rule.handoff,
            };
        }

        let text = self
            .fallbacks
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| FALLBACK_REPLIES[0].to_string());
        Reply {
            text,
            handoff: false,
        }
    }
}

impl Default for ReplyClassifier {
    fn default() -> Self {
        Self::with_fallbacks(FALLBACK_REPLIES.iter().copied())
            .rule(ReplyRule::new(HANDOFF_KEYWORDS.iter().copied(), HANDOFF_REPLY).with_handoff())
            .rule(ReplyRule::new(
                ["signal", "trade"],
                "For trading signals and strategies, you can find them in your dashboard under the 'Signals' tab. Is there a specific signal you need help with?",
            ))
            .rule(ReplyRule::new(
                ["account", "balance"],
                "For account-related questions, please check your dashboard or provide more details about what you need help with.",
            ))
            .rule(ReplyRule::new(
                ["password", "login"],
                "For login issues, try using the 'Forgot Password' link on the login page. If you're still having trouble, I can connect you with an agent.",
            ))
            .rule(ReplyRule::new(
                ["payment", "subscription"],
                "For payment and subscription questions, please check your account settings or let me know what specific issue you're experiencing.",
            ))
            .rule(ReplyRule::new(
                ["prop firm", "challenge"],
                "For prop firm challenges, check the 'Prop Firm Rules' section in your dashboard. Do you need help with a specific rule or requirement?",
            ))
    }
}
