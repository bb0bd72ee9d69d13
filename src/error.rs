use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule `{rule}` produced an unusable parameter pattern: {source}")]
    Pattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule `{rule}` produced an unusable domain scope: {source}")]
    Scope {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown message event `{0}` (expected `send` or `receive`)")]
pub struct UnknownEvent(pub String);
