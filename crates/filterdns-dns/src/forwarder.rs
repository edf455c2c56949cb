//! Split-DNS forwarder matching.

use filterdns_config::Forwarder;

use crate::message::normalize_name;

/// Matches query names against split-DNS rules in configuration order.
///
/// The matcher is immutable; live reconfiguration swaps a freshly built
/// instance through an `ArcSwap` so in-flight queries always observe a
/// consistent rule set.
#[derive(Debug, Default)]
pub struct ForwarderMatcher {
    rules: Vec<Rule>,
}

#[derive(Debug)]
struct Rule {
    /// Normalized pattern: lowercase, no trailing dot, no `*.` prefix.
    pattern: String,
    server: String,
}

impl ForwarderMatcher {
    /// Build a matcher from configured rules, preserving their order.
    ///
    /// A `*.` prefix is stripped during normalization; wildcard and plain
    /// patterns share the same match semantics, the prefix only lets users
    /// spell out their intent.
    pub fn new(forwarders: &[Forwarder]) -> Self {
        let rules = forwarders
            .iter()
            .map(|fwd| {
                let mut pattern = normalize_name(&fwd.domain);
                if let Some(stripped) = pattern.strip_prefix("*.") {
                    pattern = stripped.to_string();
                }
                Rule {
                    pattern,
                    server: fwd.server.clone(),
                }
            })
            .collect();
        Self { rules }
    }

    /// Server for the first rule matching `name`, or `None`.
    ///
    /// A rule matches when its pattern equals the normalized name or is a
    /// proper suffix preceded by a dot: `ts.net` matches `a.ts.net` and
    /// `a.b.ts.net` but not `xts.net`.
    pub fn match_domain(&self, name: &str) -> Option<&str> {
        let name = normalize_name(name);

        self.rules
            .iter()
            .find(|rule| {
                name == rule.pattern
                    || (name.len() > rule.pattern.len()
                        && name.ends_with(&rule.pattern)
                        && name.as_bytes()[name.len() - rule.pattern.len() - 1] == b'.')
            })
            .map(|rule| rule.server.as_str())
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the matcher has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
