use std::collections::HashMap;
use std::fmt;

/// Policy keys with an enforced predicate. Anything else in a script's
/// `governance_policy` is reported as unenforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKey {
    ZeroTrustMode,
    StageIsolation,
    TypeSafety,
}

impl PolicyKey {
    pub const ALL: [PolicyKey; 3] = [
        PolicyKey::ZeroTrustMode,
        PolicyKey::StageIsolation,
        PolicyKey::TypeSafety,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKey::ZeroTrustMode => "zero_trust_mode",
            PolicyKey::StageIsolation => "stage_isolation",
            PolicyKey::TypeSafety => "type_safety",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PolicyPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Result of checking one script's declared policy pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyEvaluation {
    pub violations: Vec<(String, String)>,
    pub unenforced: Vec<String>,
}

impl PolicyEvaluation {
    pub fn is_satisfied(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct PolicyRegistry {
    predicates: HashMap<PolicyKey, PolicyPredicate>,
}

impl PolicyRegistry {
    /// A registry with no predicates; every key is unenforced.
    pub fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    pub fn register(&mut self, key: PolicyKey, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) {
        self.predicates.insert(key, Box::new(predicate));
    }

    pub fn evaluate(&self, script: &str, pairs: &[(String, String)]) -> PolicyEvaluation {
        let mut evaluation = PolicyEvaluation::default();
        for (key, value) in pairs {
            let predicate = PolicyKey::parse(key).and_then(|k| self.predicates.get(&k));
            match predicate {
                Some(check) => {
                    if !check(value) {
                        evaluation.violations.push((key.clone(), value.clone()));
                    }
                }
                None => {
                    tracing::warn!(script, key = %key, value = %value, "Policy key unenforced");
                    evaluation.unenforced.push(key.clone());
                }
            }
        }
        evaluation
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(PolicyKey::ZeroTrustMode, |v| v == "enabled");
        registry.register(PolicyKey::StageIsolation, |v| matches!(v, "strict" | "moderate"));
        registry.register(PolicyKey::TypeSafety, |v| {
            matches!(v, "strict" | "moderate" | "lenient")
        });
        registry
    }
}
