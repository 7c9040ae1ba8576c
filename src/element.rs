use std::collections::VecDeque;
use std::fmt::{self, Display};

use strum::{EnumDiscriminants, IntoStaticStr};

/// A literal leaf of a grammar: either an exact text match or a regular
/// expression that is anchored at build time so it can only match at the
/// engine's cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lit {
    Text(String),
    Pattern(String),
}

/// One node of a grammar under construction.
///
/// Elements are plain data; [`GrammarBuilder::build`](crate::GrammarBuilder)
/// validates them and lowers them into the compiled form the engine runs.
/// References are by production name until then, so forward references are
/// fine.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(ElementKind), derive(IntoStaticStr))]
pub enum Element {
    Literal(Lit),
    Sequence(Vec<Element>),
    Choice(Vec<Element>),
    Repeat {
        body: Box<Element>,
        min: u32,
        max: Option<u32>,
    },
    Positive(Box<Element>),
    Negative(Box<Element>),
    Reference(String),
    Eof,
}

impl Element {
    /// Names of every production this element refers to, in breadth-first
    /// order. Duplicates are kept.
    pub fn references(&self) -> Vec<&str> {
        let mut queue: VecDeque<&Element> = VecDeque::from([self]);
        let mut names = vec![];

        while let Some(element) = queue.pop_front() {
            match element {
                Element::Literal(_) | Element::Eof => {}
                Element::Reference(name) => names.push(name.as_str()),
                Element::Sequence(body) | Element::Choice(body) => queue.extend(body),
                Element::Repeat { body, .. }
                | Element::Positive(body)
                | Element::Negative(body) => queue.push_back(body),
            }
        }
        names
    }
}

/// Exact literal text.
pub fn lit(text: impl Into<String>) -> Element {
    Element::Literal(Lit::Text(text.into()))
}

/// Several exact literals, tried in order. A single value stays a plain
/// literal.
pub fn lits<I>(values: I) -> Element
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut body: Vec<Element> = values.into_iter().map(lit).collect();
    if body.len() == 1 {
        body.pop().unwrap_or_else(|| unreachable!())
    } else {
        Element::Choice(body)
    }
}

/// An anchored regular expression over the text at the cursor.
pub fn rx(pattern: impl Into<String>) -> Element {
    Element::Literal(Lit::Pattern(pattern.into()))
}

/// All children must match, in order.
pub fn seq<I: IntoIterator<Item = Element>>(body: I) -> Element {
    Element::Sequence(body.into_iter().collect())
}

/// Prioritized choice: the first child that matches wins.
pub fn alt<I: IntoIterator<Item = Element>>(body: I) -> Element {
    Element::Choice(body.into_iter().collect())
}

/// Alias of [`alt`].
pub fn one<I: IntoIterator<Item = Element>>(body: I) -> Element {
    alt(body)
}

/// Greedy repetition with explicit bounds; `max: None` means unbounded.
pub fn rep(body: Element, min: u32, max: Option<u32>) -> Element {
    Element::Repeat {
        body: Box::new(body),
        min,
        max,
    }
}

/// Zero or more.
pub fn many(body: Element) -> Element {
    rep(body, 0, None)
}

/// One or more.
pub fn some(body: Element) -> Element {
    rep(body, 1, None)
}

/// Zero or one.
pub fn opt(body: Element) -> Element {
    rep(body, 0, Some(1))
}

/// Positive lookahead: succeeds without consuming when `body` matches.
pub fn pos(body: Element) -> Element {
    Element::Positive(Box::new(body))
}

/// Negative lookahead: succeeds without consuming when `body` does not match.
pub fn neg(body: Element) -> Element {
    Element::Negative(Box::new(body))
}

/// Succeeds only at the end of the source.
pub fn eof() -> Element {
    Element::Eof
}

/// A reference to the production `name`, dispatched through the engine so
/// memoization applies.
pub fn refer(name: impl Into<String>) -> Element {
    Element::Reference(name.into())
}

fn write_body(
    f: &mut fmt::Formatter<'_>,
    body: &[Element],
    sep: &'static str,
) -> fmt::Result {
    for (n, child) in body.iter().enumerate() {
        if n > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{child}")?;
    }
    Ok(())
}

/// Renders the ABNF form of the element. Predicates and raw patterns have no
/// ABNF spelling and use PEG-style `&(…)`/`!(…)` and `#"…"` markers instead.
impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Literal(Lit::Text(text)) => write!(f, "%s\"{text}\""),
            Element::Literal(Lit::Pattern(pattern)) => write!(f, "#\"{pattern}\""),
            Element::Reference(name) => write!(f, "{name}"),
            Element::Sequence(body) => {
                write!(f, "(")?;
                write_body(f, body, " ")?;
                write!(f, ")")
            }
            Element::Choice(body) => {
                write!(f, "(")?;
                write_body(f, body, " / ")?;
                write!(f, ")")
            }
            Element::Repeat { body, min: 0, max: None } => write!(f, "*({body})"),
            Element::Repeat { body, min: 1, max: None } => write!(f, "1*({body})"),
            Element::Repeat { body, min: 0, max: Some(1) } => write!(f, "[{body}]"),
            Element::Repeat { body, min, max: Some(max) } => write!(f, "{min}*{max}({body})"),
            Element::Repeat { body, min, max: None } => write!(f, "{min}*({body})"),
            Element::Positive(body) => write!(f, "&({body})"),
            Element::Negative(body) => write!(f, "!({body})"),
            Element::Eof => write!(f, "<eof>"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn abnf_rendering() {
        let element = alt([
            seq([refer("digit"), opt(lit("."))]),
            many(rx("[a-z]")),
            some(refer("word")),
        ]);
        assert_eq!(
            element.to_string(),
            r#"((digit [%s"."]) / *(#"[a-z]") / 1*(word))"#
        );
    }

    #[test]
    fn lits_sugars_to_choice() {
        assert_eq!(lits(["if", "then"]), alt([lit("if"), lit("then")]));
        assert_eq!(lits(["if"]), lit("if"));
    }

    #[test]
    fn collects_references() {
        let element = seq([
            refer("a"),
            alt([lit("x"), refer("b")]),
            many(neg(refer("c"))),
        ]);
        insta::assert_compact_debug_snapshot!(element.references(), @r#"["a", "b", "c"]"#);
    }
}
