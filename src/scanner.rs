use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::record::UrlRecord;
use crate::sanitizer::RuleEngine;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("static URL pattern should compile"));

/// Every URL-looking run in `text`, in order of appearance, repeats included.
pub fn extract_urls(text: &str) -> Vec<&str> {
    URL_PATTERN.find_iter(text).map(|m| m.as_str()).collect()
}

/// Cleans every URL embedded in `text`.
///
/// Each changed URL is written to `record` and replaced at every place it
/// occurs as a whole URL; text inside other URLs is never touched.
/// Unchanged URLs leave no trace in the record.
pub fn scan<'a, R>(text: &'a str, engine: &RuleEngine, record: &mut R) -> Cow<'a, str>
where
    R: UrlRecord + ?Sized,
{
    let mut out = String::new();
    let mut last = 0;

    for m in URL_PATTERN.find_iter(text) {
        let url = m.as_str();
        let cleaned = engine.clean_url(url);
        if cleaned == url {
            continue;
        }

        debug!(original = %url, cleaned = %cleaned, "Rewriting URL in message");
        record.upsert(url, &cleaned);
        out.push_str(&text[last..m.start()]);
        out.push_str(&cleaned);
        last = m.end();
    }

    if last == 0 {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CleanedUrls;
    use crate::rules;

    fn engine(decls: &[&str]) -> RuleEngine {
        RuleEngine::new(rules::compile(decls))
    }

    #[test]
    fn extracts_urls_in_order() {
        let text = "see https://a.com/x and http://b.org/?q=1, then https://a.com/x";
        assert_eq!(
            extract_urls(text),
            vec!["https://a.com/x", "http://b.org/?q=1,", "https://a.com/x"]
        );
    }

    #[test]
    fn text_without_urls_is_untouched() {
        let mut record = CleanedUrls::new();
        let out = scan("hello world", &engine(&["utm_source"]), &mut record);
        assert!(matches!(out, Cow::Borrowed("hello world")));
        assert!(record.is_empty());
    }

    #[test]
    fn rewrites_and_records_changed_urls() {
        let mut record = CleanedUrls::new();
        let text = "look https://site.com/?utm_source=fb&id=1 and https://plain.com/";
        let out = scan(text, &engine(&["utm_source"]), &mut record);

        assert_eq!(out, "look https://site.com/?id=1 and https://plain.com/");
        assert_eq!(record.len(), 1);
        assert_eq!(
            record.get("https://site.com/?utm_source=fb&id=1"),
            Some("https://site.com/?id=1")
        );
        assert_eq!(record.get("https://plain.com/"), None);
    }

    #[test]
    fn replaces_every_occurrence() {
        let mut record = CleanedUrls::new();
        let url = "https://x.com/?a=1&c=3";
        let text = format!("{url}\n{url} again {url}");
        let out = scan(&text, &engine(&["a"]), &mut record);

        assert_eq!(out, "https://x.com/?c=3\nhttps://x.com/?c=3 again https://x.com/?c=3");
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn shorter_url_does_not_rewrite_a_longer_one() {
        let mut record = CleanedUrls::new();
        let text = "https://x.com/?a=1 https://x.com/?a=1&b=2";
        let out = scan(text, &engine(&["a"]), &mut record);

        assert_eq!(out, "https://x.com/ https://x.com/?b=2");
        assert_eq!(record.get("https://x.com/?a=1"), Some("https://x.com/"));
        assert_eq!(record.get("https://x.com/?a=1&b=2"), Some("https://x.com/?b=2"));
    }

    #[test]
    fn works_with_a_plain_map() {
        let mut record: std::collections::HashMap<String, String> = Default::default();
        scan("https://x.com/?a=1", &engine(&["a"]), &mut record);
        assert_eq!(record.get("https://x.com/?a=1").map(String::as_str), Some("https://x.com/"));
    }
}
