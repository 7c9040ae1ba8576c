use thiserror::Error;

/// Raised while assembling a [`Grammar`](crate::Grammar) from elements.
///
/// These are construction-time faults: a grammar that builds cleanly can
/// never produce one of these during a parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("production `{rule}` references `{target}`, which is not defined")]
    DanglingReference { rule: String, target: String },
    #[error("production `{0}` is defined twice")]
    DuplicateRule(String),
    #[error("{kind} in production `{rule}` has no children")]
    EmptyElement { rule: String, kind: &'static str },
    #[error("repetition bounds {min}..{max} in production `{rule}` are inverted")]
    InvertedBounds { rule: String, min: u32, max: u32 },
    #[error("pattern `{pattern}` in production `{rule}` failed to compile: {reason}")]
    BadPattern {
        rule: String,
        pattern: String,
        reason: String,
    },
}

/// Raised by the [`Engine`](crate::Engine) for grammar misuse discovered
/// mid-parse. An ordinary failure to match is not an error; it is the
/// `None` side of the match result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(
        "left recursion detected in production `{0}`; rewrite it as right recursion or a repetition"
    )]
    LeftRecursion(String),
    #[error("no production named `{0}` in the grammar")]
    UnknownProduction(String),
    #[error("no successful parse to build a tree from")]
    NoParse,
}

/// Raised when compiling ABNF source text into a [`Grammar`](crate::Grammar).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbnfError {
    #[error("malformed ABNF; the parse stalled at byte {furthest}")]
    Invalid { furthest: usize },
    #[error("repetition `{spec}` in production `{rule}` is not one of `*`, `1*` or `*1`")]
    UnsupportedRepetition { rule: String, spec: String },
    #[error("numeric literal `{literal}` in production `{rule}` is not a valid character")]
    BadCodepoint { rule: String, literal: String },
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}
