//! Turn-error classification.
//!
//! Classification is driven by a rule table of `(pattern, kind, provider
//! scope)` rows. Quota rules are always evaluated before capacity rules, so a
//! text matching both is a quota failure. New provider quirks are added as
//! rows (built-in or from [`ClassifierConfig`]), not as code.

use regex::{Regex, RegexBuilder};
use rotakey_config::{ClassifierConfig, RuleCategory, RuleConfig};
use rotakey_types::{ProviderId, RotakeyError};
use std::sync::LazyLock;

/// Provider family that retries capacity errors internally and only surfaces
/// a terminal "retry failed after N attempts" message once it gives up.
pub const INTERNAL_RETRY_FAMILY: &str = "gemini";

/// A failure worth failing over for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Per-account rate or usage limit.
    Quota,
    /// Provider infrastructure overload.
    Capacity,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quota => f.write_str("quota"),
            Self::Capacity => f.write_str("capacity"),
        }
    }
}

impl From<RuleCategory> for FailureKind {
    fn from(c: RuleCategory) -> Self {
        match c {
            RuleCategory::Quota => Self::Quota,
            RuleCategory::Capacity => Self::Capacity,
        }
    }
}

/// Which providers a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderScope {
    Any,
    /// Only providers in this family.
    Only(String),
    /// Every provider except this family. A missing provider id counts as
    /// "not in the family".
    Except(String),
}

impl ProviderScope {
    fn applies_to(&self, provider: Option<&ProviderId>) -> bool {
        match self {
            Self::Any => true,
            Self::Only(family) => provider.is_some_and(|p| p.in_family(family)),
            Self::Except(family) => !provider.is_some_and(|p| p.in_family(family)),
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct ClassifierRule {
    pattern: Regex,
    kind: FailureKind,
    scope: ProviderScope,
}

impl ClassifierRule {
    /// Compile a case-insensitive rule.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::InvalidRule`] if the pattern is not a valid regex.
    pub fn new(pattern: &str, kind: FailureKind, scope: ProviderScope) -> rotakey_types::Result<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RotakeyError::InvalidRule {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            pattern,
            kind,
            scope,
        })
    }

    /// Compile a configured rule.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::InvalidRule`] if the pattern is not a valid regex.
    pub fn from_config(rule: &RuleConfig) -> rotakey_types::Result<Self> {
        let scope = match (&rule.provider, &rule.except_provider) {
            (Some(only), _) => ProviderScope::Only(only.clone()),
            (None, Some(except)) => ProviderScope::Except(except.clone()),
            (None, None) => ProviderScope::Any,
        };
        Self::new(&rule.pattern, rule.category.into(), scope)
    }

    fn matches(&self, text: &str, provider: Option<&ProviderId>) -> bool {
        self.scope.applies_to(provider) && self.pattern.is_match(text)
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }
}

const BUILTIN_QUOTA: &[&str] = &[
    r"\b429\b",
    r"quota exceeded",
    r"resource[ _]exhausted",
    r"rate limit",
    r"rate_limit",
    r"exceeded_current_quota",
    r"insufficient[ _]quota",
    r"billing.*exhausted",
];

static BUILTIN_RULES: LazyLock<Vec<ClassifierRule>> = LazyLock::new(|| {
    use FailureKind::{Capacity, Quota};
    let family = || INTERNAL_RETRY_FAMILY.to_string();

    let mut rules: Vec<(&str, FailureKind, ProviderScope)> = BUILTIN_QUOTA
        .iter()
        .map(|p| (*p, Quota, ProviderScope::Any))
        .collect();
    rules.extend([
        (r"capacity constraints", Capacity, ProviderScope::Any),
        (r"engine overloaded", Capacity, ProviderScope::Any),
        (r"server overloaded", Capacity, ProviderScope::Any),
        (r"temporarily unavailable", Capacity, ProviderScope::Any),
        (
            r"no capacity available",
            Capacity,
            ProviderScope::Except(family()),
        ),
        (
            r"retry failed after \d+ attempts?",
            Capacity,
            ProviderScope::Only(family()),
        ),
    ]);

    rules
        .into_iter()
        .map(|(p, kind, scope)| {
            ClassifierRule::new(p, kind, scope).expect("built-in classifier pattern")
        })
        .collect()
});

/// Classifies turn errors with the built-in table plus configured rules.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    quota: Vec<ClassifierRule>,
    capacity: Vec<ClassifierRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ErrorClassifier {
    /// The built-in table only.
    #[must_use]
    pub fn builtin() -> Self {
        let mut classifier = Self {
            quota: Vec::new(),
            capacity: Vec::new(),
        };
        for rule in BUILTIN_RULES.iter() {
            classifier.push(rule.clone());
        }
        classifier
    }

    /// The built-in table followed by the configured rules.
    ///
    /// # Errors
    ///
    /// Returns [`RotakeyError::InvalidRule`] for the first rule whose pattern
    /// does not compile.
    pub fn from_config(config: &ClassifierConfig) -> rotakey_types::Result<Self> {
        let mut classifier = Self::builtin();
        for rule in &config.rules {
            classifier.push(ClassifierRule::from_config(rule)?);
        }
        Ok(classifier)
    }

    /// Append a rule to its category's list.
    pub fn push(&mut self, rule: ClassifierRule) {
        match rule.kind {
            FailureKind::Quota => self.quota.push(rule),
            FailureKind::Capacity => self.capacity.push(rule),
        }
    }

    /// Classify an error text produced by `provider`.
    ///
    /// Returns `None` for an absent or empty text and for texts no rule
    /// matches.
    #[must_use]
    pub fn classify(&self, error: Option<&str>, provider: Option<&ProviderId>) -> Option<FailureKind> {
        let text = error.filter(|t| !t.trim().is_empty())?;
        self.quota
            .iter()
            .chain(&self.capacity)
            .find(|rule| rule.matches(text, provider))
            .map(ClassifierRule::kind)
    }
}

/// Classify with the built-in table.
#[must_use]
pub fn classify(error: Option<&str>, provider: Option<&ProviderId>) -> Option<FailureKind> {
    static DEFAULT: LazyLock<ErrorClassifier> = LazyLock::new(ErrorClassifier::builtin);
    DEFAULT.classify(error, provider)
}
