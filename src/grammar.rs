use std::collections::HashMap;

use regex::Regex;

use crate::{
    element::{Element, ElementKind, Lit},
    error::GrammarError,
};

/// Identifies a named production. Ids are assigned densely at build time so
/// the engine can key its memo table with plain integers instead of hashing
/// names on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoalId(pub(crate) u32);

impl GoalId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies an interned literal. Literals are deduplicated by value, so
/// the same text or pattern shares one memo slot wherever it appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LitId(pub(crate) u32);

impl LitId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compiled literal. Patterns are anchored here, exactly once, so the
/// engine never has to re-wrap them.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    Text(String),
    Pattern(Regex),
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Matcher::Text(a), Matcher::Text(b)) => a == b,
            (Matcher::Pattern(a), Matcher::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for Matcher {}

/// The compiled body of a production: the same shape as [`Element`], with
/// names resolved to ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pattern {
    Literal(LitId),
    Sequence(Vec<Pattern>),
    Choice(Vec<Pattern>),
    Repeat {
        body: Box<Pattern>,
        min: u32,
        max: Option<u32>,
    },
    Positive(Box<Pattern>),
    Negative(Box<Pattern>),
    Reference(GoalId),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Production {
    pub(crate) name: String,
    pub(crate) body: Pattern,
}

/// An immutable compiled grammar: a set of named productions plus the
/// interned literals their bodies share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    productions: Vec<Production>,
    index: HashMap<String, GoalId>,
    literals: Vec<Matcher>,
}

impl Grammar {
    /// Looks a production up by name.
    pub fn goal(&self, name: &str) -> Option<GoalId> {
        self.index.get(name).copied()
    }

    /// The name a [`GoalId`] was assigned to.
    pub fn name(&self, goal: GoalId) -> &str {
        &self.productions[goal.index()].name
    }

    /// Production names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.productions.iter().map(|p| p.name.as_str())
    }

    /// Number of productions.
    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    pub(crate) fn body(&self, goal: GoalId) -> &Pattern {
        &self.productions[goal.index()].body
    }

    pub(crate) fn matcher(&self, lit: LitId) -> &Matcher {
        &self.literals[lit.index()]
    }
}

/// Collects named productions and lowers them into a [`Grammar`].
///
/// ```
/// use abnf_packrat::{lit, refer, some, GrammarBuilder};
///
/// let mut builder = GrammarBuilder::new();
/// builder.rule("word", some(refer("letter")));
/// builder.rule("letter", lit("a"));
/// let grammar = builder.build().unwrap();
/// assert_eq!(grammar.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    rules: Vec<(String, Element)>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines the production `name` with the given body. Definition order
    /// is preserved; references may point at rules defined later.
    pub fn rule(&mut self, name: impl Into<String>, body: Element) -> &mut Self {
        self.rules.push((name.into(), body));
        self
    }

    /// Validates every element and produces the compiled grammar.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        let mut index = HashMap::with_capacity(self.rules.len());
        for (n, (name, _)) in self.rules.iter().enumerate() {
            let id = GoalId(u32::try_from(n).unwrap_or_else(|_| unreachable!()));
            if index.insert(name.clone(), id).is_some() {
                return Err(GrammarError::DuplicateRule(name.clone()));
            }
        }

        let mut interner = Interner::default();
        let mut productions = Vec::with_capacity(self.rules.len());
        for (name, element) in &self.rules {
            let body = lower(name, element, &index, &mut interner)?;
            productions.push(Production {
                name: name.clone(),
                body,
            });
        }

        Ok(Grammar {
            productions,
            index,
            literals: interner.matchers,
        })
    }
}

#[derive(Debug, Default)]
struct Interner {
    seen: HashMap<Lit, LitId>,
    matchers: Vec<Matcher>,
}

impl Interner {
    fn intern(&mut self, rule: &str, literal: &Lit) -> Result<LitId, GrammarError> {
        if let Some(&id) = self.seen.get(literal) {
            return Ok(id);
        }
        let matcher = match literal {
            Lit::Text(text) => Matcher::Text(text.clone()),
            Lit::Pattern(pattern) => {
                Matcher::Pattern(anchor(pattern).map_err(|e| GrammarError::BadPattern {
                    rule: rule.to_owned(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?)
            }
        };
        let id = LitId(u32::try_from(self.matchers.len()).unwrap_or_else(|_| unreachable!()));
        self.matchers.push(matcher);
        self.seen.insert(literal.clone(), id);
        Ok(id)
    }
}

/// Wraps a pattern with a beginning-of-text anchor (`\A`, not the line
/// anchor) so it can only match at the start of the inspected slice.
fn anchor(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\A(?:{pattern})"))
}

fn lower(
    rule: &str,
    element: &Element,
    index: &HashMap<String, GoalId>,
    interner: &mut Interner,
) -> Result<Pattern, GrammarError> {
    let lower_all = |body: &[Element], interner: &mut Interner| {
        if body.is_empty() {
            return Err(GrammarError::EmptyElement {
                rule: rule.to_owned(),
                kind: ElementKind::from(element).into(),
            });
        }
        body.iter()
            .map(|child| lower(rule, child, index, interner))
            .collect::<Result<Vec<_>, _>>()
    };

    match element {
        Element::Literal(literal) => Ok(Pattern::Literal(interner.intern(rule, literal)?)),
        Element::Sequence(body) => Ok(Pattern::Sequence(lower_all(body, interner)?)),
        Element::Choice(body) => Ok(Pattern::Choice(lower_all(body, interner)?)),
        Element::Repeat { body, min, max } => {
            if let Some(max) = *max
                && *min > max
            {
                return Err(GrammarError::InvertedBounds {
                    rule: rule.to_owned(),
                    min: *min,
                    max,
                });
            }
            Ok(Pattern::Repeat {
                body: Box::new(lower(rule, body, index, interner)?),
                min: *min,
                max: *max,
            })
        }
        Element::Positive(body) => Ok(Pattern::Positive(Box::new(lower(
            rule, body, index, interner,
        )?))),
        Element::Negative(body) => Ok(Pattern::Negative(Box::new(lower(
            rule, body, index, interner,
        )?))),
        Element::Reference(target) => {
            index
                .get(target)
                .copied()
                .map(Pattern::Reference)
                .ok_or_else(|| GrammarError::DanglingReference {
                    rule: rule.to_owned(),
                    target: target.clone(),
                })
        }
        Element::Eof => Ok(Pattern::Eof),
    }
}
