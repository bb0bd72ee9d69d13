use std::ops::Range;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::RuleError;

/// Built-in tracking rules, applied in this order.
///
/// Grammar: `pattern` or `pattern@domain`. The first `*` in either half
/// matches any run of characters; later ones are literal.
pub const DEFAULT_RULES: &[&str] = &[
    // Campaign tagging
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "utm_name",
    "utm_referrer",
    "utm_social",
    "utm_social-type",
    // Click identifiers
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
    "yclid",
    "twclid",
    "ttclid",
    "mc_eid",
    "mc_cid",
    "_hsenc",
    "_hsmi",
    "__hssc",
    "__hstc",
    "__hsfp",
    "hsCtaTracking",
    "_openstat",
    "igshid",
    "igsh",
    "oly_anon_id",
    "oly_enc_id",
    "vero_conv",
    "vero_id",
    "wickedid",
    "rb_clickid",
    "s_cid",
    "mkt_tok",
    // Provider specific
    "si@open.spotify.com",
    "context@open.spotify.com",
    "si@youtube.com",
    "si@youtu.be",
    "feature@youtube.com",
    "pp@youtube.com",
    "t@twitter.com",
    "s@twitter.com",
    "ref_src@twitter.com",
    "ref_url@twitter.com",
    "ref@amazon.*",
    "ref_@amazon.*",
    "pf_rd_i@amazon.*",
    "pf_rd_m@amazon.*",
    "pf_rd_p@amazon.*",
    "pf_rd_r@amazon.*",
    "pf_rd_s@amazon.*",
    "pf_rd_t@amazon.*",
    "pd_rd_i@amazon.*",
    "pd_rd_r@amazon.*",
    "pd_rd_w@amazon.*",
    "pd_rd_wg@amazon.*",
    "_encoding@amazon.*",
    "psc@amazon.*",
    "tag@amazon.*",
    "linkCode@amazon.*",
    "spm@aliexpress.com",
    "scm@aliexpress.com",
    "aff_platform@aliexpress.com",
    "aff_trace_key@aliexpress.com",
    "algo_expid@aliexpress.com",
    "algo_pvid@aliexpress.com",
    "btsid@aliexpress.com",
    "ws_ab_test@aliexpress.com",
    "_trkparms@ebay.*",
    "_trksid@ebay.*",
    "hash@ebay.*",
    "amdata@ebay.*",
    "epid@ebay.*",
    "itmmeta@ebay.*",
    "refId@linkedin.com",
    "trk@linkedin.com",
    "trackingId@linkedin.com",
    "lipi@linkedin.com",
    "ved@google.*",
    "ei@google.*",
    "gs_lcrp@google.*",
    "sourceid@google.*",
    "sxsrf@google.*",
    "iflsig@google.*",
    "share_id@reddit.com",
    "ref_source@reddit.com",
    "is_from_webapp@tiktok.com",
    "sender_device@tiktok.com",
    "sender_web_id@tiktok.com",
];

const WILDCARD: &str = r"\*";
const ANY_RUN: &str = ".*";

/// A rule split into its two halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDeclaration<'a> {
    pub pattern: &'a str,
    pub domain: Option<&'a str>,
}

/// Splits a declaration on its first `@`. An empty domain counts as unscoped.
pub fn parse_rule(decl: &str) -> RuleDeclaration<'_> {
    match decl.split_once('@') {
        Some((pattern, domain)) if !domain.is_empty() => RuleDeclaration {
            pattern,
            domain: Some(domain),
        },
        Some((pattern, _)) => RuleDeclaration {
            pattern,
            domain: None,
        },
        None => RuleDeclaration {
            pattern: decl,
            domain: None,
        },
    }
}

/// Escapes every regex metacharacter, then turns only the first escaped
/// wildcard back into a match-anything run.
pub fn escape_with_wildcard(raw: &str) -> String {
    regex::escape(raw).replacen(WILDCARD, ANY_RUN, 1)
}

/// Executable form of one rule.
#[derive(Debug, Clone)]
pub struct Matcher {
    rule: String,
    fragment: Regex,
    scope: Option<Regex>,
}

impl Matcher {
    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn is_scoped(&self) -> bool {
        self.scope.is_some()
    }

    /// Byte ranges of every `?name=value` / `&name=value` fragment this rule
    /// removes from `url`, left to right and non-overlapping.
    pub fn find_fragments(&self, url: &str) -> Vec<Range<usize>> {
        let mut found = Vec::new();
        let mut at = 0;

        while at < url.len() {
            let Some(caps) = self.fragment.captures_at(url, at) else {
                break;
            };
            let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
                break;
            };

            match self.accepted_end(url, whole.start(), value.start(), whole.end()) {
                Some(end) => {
                    found.push(whole.start()..end);
                    at = end;
                }
                // Separators are single ASCII bytes, so the next byte is a
                // char boundary.
                None => at = whole.start() + 1,
            }
        }

        found
    }

    /// Where the fragment starting at `start` ends, if the domain scope
    /// holds. A scope found before the fragment keeps the greedy value;
    /// otherwise the longest value whose tail contains the scope wins.
    fn accepted_end(
        &self,
        url: &str,
        start: usize,
        value_start: usize,
        greedy_end: usize,
    ) -> Option<usize> {
        let Some(scope) = &self.scope else {
            return Some(greedy_end);
        };

        if scope_precedes(scope, url, start) {
            return Some(greedy_end);
        }

        (value_start + 1..=greedy_end)
            .rev()
            .filter(|&end| url.is_char_boundary(end))
            .find(|&end| scope_follows(scope, url, end))
    }
}

fn scope_precedes(scope: &Regex, url: &str, until: usize) -> bool {
    let line_start = url[..until].rfind('\n').map_or(0, |i| i + 1);
    scope.is_match(&url[line_start..until])
}

/// The scope must occur at or after `from`, without crossing a line break.
fn scope_follows(scope: &Regex, url: &str, from: usize) -> bool {
    let line_end = url[from..].find('\n').map_or(url.len(), |i| from + i);
    scope.find_at(&url[..line_end], from).is_some()
}

pub fn compile_rule(decl: &str) -> Result<Matcher, RuleError> {
    let parsed = parse_rule(decl);

    let fragment_src = format!("[?&]{}=([^&]+)", escape_with_wildcard(parsed.pattern));
    let fragment = Regex::new(&fragment_src).map_err(|source| RuleError::Pattern {
        rule: decl.to_string(),
        source,
    })?;

    let scope = parsed
        .domain
        .map(|domain| {
            Regex::new(&escape_with_wildcard(domain)).map_err(|source| RuleError::Scope {
                rule: decl.to_string(),
                source,
            })
        })
        .transpose()?;

    Ok(Matcher {
        rule: decl.to_string(),
        fragment,
        scope,
    })
}

/// Ordered, immutable collection of compiled rules.
#[derive(Debug, Clone)]
pub struct MatcherSet {
    matchers: Arc<[Matcher]>,
}

impl MatcherSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Matcher> {
        self.matchers.iter()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl<'a> IntoIterator for &'a MatcherSet {
    type Item = &'a Matcher;
    type IntoIter = std::slice::Iter<'a, Matcher>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Compiles declarations in order. Declarations that cannot be turned into
/// a regex are dropped with a warning, leaving them inert.
pub fn compile<S: AsRef<str>>(decls: &[S]) -> MatcherSet {
    let matchers: Vec<Matcher> = decls
        .iter()
        .filter_map(|decl| match compile_rule(decl.as_ref()) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "Dropping tracking rule");
                None
            }
        })
        .collect();

    debug!(count = matchers.len(), "Compiled tracking rules");
    MatcherSet {
        matchers: matchers.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(rule: &str, url: &str) -> Vec<String> {
        compile_rule(rule)
            .unwrap()
            .find_fragments(url)
            .into_iter()
            .map(|r| url[r].to_string())
            .collect()
    }

    #[test]
    fn parse_rule_splits_on_first_at() {
        assert_eq!(
            parse_rule("fbclid@facebook.com"),
            RuleDeclaration { pattern: "fbclid", domain: Some("facebook.com") }
        );
        assert_eq!(
            parse_rule("a@b@c"),
            RuleDeclaration { pattern: "a", domain: Some("b@c") }
        );
        assert_eq!(parse_rule("utm_source").domain, None);
        assert_eq!(parse_rule("ref@").domain, None);
    }

    #[test]
    fn only_first_wildcard_is_expanded() {
        assert_eq!(escape_with_wildcard("ref_*"), "ref_.*");
        assert_eq!(escape_with_wildcard("a*b*"), r"a.*b\*");
        assert_eq!(escape_with_wildcard("amazon.*"), r"amazon\..*");
    }

    #[test]
    fn second_wildcard_stays_literal() {
        assert_eq!(strip("x*y*", "https://a.com/?xQy*=1"), vec!["?xQy*=1"]);
        assert!(strip("x*y*", "https://a.com/?xQyZ=1").is_empty());
    }

    #[test]
    fn metacharacters_match_literally() {
        assert!(strip("a.b", "https://a.com/?aXb=1").is_empty());
        assert_eq!(strip("a.b", "https://a.com/?a.b=1"), vec!["?a.b=1"]);
        assert_eq!(strip("p(1)", "https://a.com/?p(1)=z"), vec!["?p(1)=z"]);
    }

    #[test]
    fn fragment_runs_to_next_ampersand() {
        assert_eq!(
            strip("utm_source", "https://site.com/?utm_source=fb&id=1"),
            vec!["?utm_source=fb"]
        );
        assert_eq!(
            strip("utm_source", "https://site.com/?id=1&utm_source=fb#top"),
            vec!["&utm_source=fb#top"]
        );
    }

    #[test]
    fn empty_value_is_not_a_match() {
        assert!(strip("utm_source", "https://site.com/?utm_source=&id=1").is_empty());
    }

    #[test]
    fn parameter_name_must_follow_a_separator() {
        assert!(strip("source", "https://site.com/?utm_source=fb").is_empty());
    }

    #[test]
    fn finds_every_occurrence() {
        assert_eq!(
            strip("a", "https://x.com/?a=1&b=2&a=3"),
            vec!["?a=1", "&a=3"]
        );
    }

    #[test]
    fn scope_may_precede_or_follow_the_fragment() {
        assert_eq!(
            strip("fbclid@facebook.com", "https://facebook.com/post?fbclid=abc123"),
            vec!["?fbclid=abc123"]
        );
        assert_eq!(
            strip("fbclid@facebook.com", "https://other.com/post?fbclid=abc123&u=facebook.com"),
            vec!["?fbclid=abc123"]
        );
        assert!(strip("fbclid@facebook.com", "https://other.com/post?fbclid=abc123").is_empty());
    }

    #[test]
    fn scope_shortens_value_when_domain_is_inside_it() {
        assert_eq!(
            strip("fbclid@facebook.com", "https://x.com/?fbclid=abc.facebook.com"),
            vec!["?fbclid=abc."]
        );
    }

    #[test]
    fn scope_does_not_cross_line_breaks() {
        assert!(strip("t@x.com", "https://a.com/?t=1&\nx.com").is_empty());
    }

    #[test]
    fn wildcard_domain_scope() {
        assert_eq!(
            strip("tag@amazon.*", "https://a.com/?tag=abc&u=amazon.de"),
            vec!["?tag=abc"]
        );
    }

    #[test]
    fn compile_keeps_declaration_order() {
        let set = compile(&["b", "a@x.com", "c"]);
        let rules: Vec<&str> = set.iter().map(Matcher::rule).collect();
        assert_eq!(rules, vec!["b", "a@x.com", "c"]);
        assert!(set.iter().nth(1).unwrap().is_scoped());
    }

    #[test]
    fn default_rules_all_compile() {
        assert_eq!(compile(DEFAULT_RULES).len(), DEFAULT_RULES.len());
    }
}
