use std::borrow::Cow;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::rules::{self, MatcherSet, DEFAULT_RULES};

static REPEATED_AMPERSANDS: Lazy<Regex> =
    Lazy::new(|| Regex::new("&{2,}").expect("static separator pattern should compile"));

#[derive(Clone, Debug)]
pub struct RuleEngine {
    matchers: MatcherSet,
}

impl RuleEngine {
    pub fn new(matchers: MatcherSet) -> Self {
        Self { matchers }
    }

    pub fn with_default_rules() -> Self {
        let matchers = rules::compile(DEFAULT_RULES);
        info!("Loaded {} tracking rules", matchers.len());
        Self::new(matchers)
    }

    pub fn matchers(&self) -> &MatcherSet {
        &self.matchers
    }

    /// Removes tracked query parameters from a single URL.
    ///
    /// Never fails: if no rule fires, or anything goes wrong while matching,
    /// the input comes back untouched.
    pub fn clean_url<'a>(&self, url: &'a str) -> Cow<'a, str> {
        if url.is_empty() {
            return Cow::Borrowed(url);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.strip_tracking(url))) {
            Ok(Some(cleaned)) => {
                debug!(original = %url, cleaned = %cleaned, "Stripped tracking parameters");
                Cow::Owned(cleaned)
            }
            Ok(None) => Cow::Borrowed(url),
            Err(_) => {
                warn!(url = %url, "URL cleaning failed, keeping the original");
                Cow::Borrowed(url)
            }
        }
    }

    /// `None` when no matcher fired.
    fn strip_tracking(&self, url: &str) -> Option<String> {
        let mut current: Option<String> = None;

        // Later matchers see the output of earlier ones.
        for matcher in &self.matchers {
            let text = current.as_deref().unwrap_or(url);
            let fragments = matcher.find_fragments(text);
            if fragments.is_empty() {
                continue;
            }
            current = Some(remove_fragments(text, &fragments));
        }

        current.map(tidy_separators)
    }
}

/// Cuts each fragment out. A fragment that opened the query leaves its `?`
/// behind so the next parameter can take its place.
fn remove_fragments(text: &str, fragments: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for fragment in fragments {
        out.push_str(&text[last..fragment.start]);
        if text[fragment.start..].starts_with('?') {
            out.push('?');
        }
        last = fragment.end;
    }
    out.push_str(&text[last..]);
    out
}

fn tidy_separators(mut url: String) -> String {
    // 1. Dangling separator at the end
    if url.ends_with(|c: char| c == '?' || c == '&') {
        url.pop();
    }

    // 2. Adjacent separators left by interior removals
    let url = REPEATED_AMPERSANDS.replace_all(&url, "&");

    // 3. Orphaned separator right after the query start
    let mut url = url.replace("?&", "?");

    // Step 3 can expose a bare `?` left by a query that emptied out.
    let kept = url.trim_end_matches(|c: char| c == '?' || c == '&').len();
    url.truncate(kept);
    url
}
