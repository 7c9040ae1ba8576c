use tracing::trace;

use crate::{
    ast::{self, Ast, AstOptions},
    error::ParseError,
    grammar::{GoalId, Grammar, LitId, Matcher, Pattern},
    memo::{MemoTable, Outcome, Slot},
};

/// The packrat engine: matches one source text against a compiled
/// [`Grammar`], memoizing every `(index, goal)` attempt.
///
/// A failure to match is the `None` half of the result; `Err` is reserved
/// for grammar misuse (left recursion, unknown production names).
///
/// ```
/// use abnf_packrat::{lit, many, Engine, GrammarBuilder};
///
/// let mut builder = GrammarBuilder::new();
/// builder.rule("word", many(lit("ab")));
/// let grammar = builder.build().unwrap();
///
/// let mut engine = Engine::new(&grammar, "ababab");
/// assert_eq!(engine.parse("word").unwrap(), Some(6));
/// ```
#[derive(Debug)]
pub struct Engine<'g, 's> {
    grammar: &'g Grammar,
    source: &'s str,
    memo: MemoTable,
    ignored: Vec<GoalId>,
    /// Re-entrancy guard: true while an ignore production is itself being
    /// matched, so the ignore policy cannot recurse into itself.
    skipping: bool,
    invocations: u64,
    outcome: Option<(GoalId, usize, usize)>,
}

impl<'g, 's> Engine<'g, 's> {
    pub fn new(grammar: &'g Grammar, source: &'s str) -> Self {
        Engine {
            grammar,
            source,
            memo: MemoTable::new(source.len()),
            ignored: vec![],
            skipping: false,
            invocations: 0,
            outcome: None,
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    /// Sets the ignore set: productions consumed opportunistically before
    /// every named goal or literal, in the order given. Typically whitespace
    /// and comments.
    pub fn set_ignore<I>(&mut self, names: I) -> Result<(), ParseError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.ignored = names
            .into_iter()
            .map(|name| self.resolve(name.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Resets the memo table and matches `goal` from index 0. Returns the
    /// final end index, which need not cover the whole source.
    pub fn parse(&mut self, goal: &str) -> Result<Option<usize>, ParseError> {
        self.parse_at(goal, 0)
    }

    /// As [`parse`](Engine::parse), from an arbitrary start index.
    pub fn parse_at(&mut self, goal: &str, start: usize) -> Result<Option<usize>, ParseError> {
        let goal = self.resolve(goal)?;
        self.memo = MemoTable::new(self.source.len());
        self.outcome = None;
        self.invocations = 0;
        if start > self.source.len() {
            return Ok(None);
        }

        let at = self.skip_ignored(start)?;
        let end = self.match_rule(goal, at)?;
        if let Some(end) = end {
            self.outcome = Some((goal, at, end));
        }
        Ok(end)
    }

    /// Matches the production `goal` at `at` through the memo table. This is
    /// the only way a named production is ever entered.
    pub fn match_goal(&mut self, goal: &str, at: usize) -> Result<Option<usize>, ParseError> {
        let goal = self.resolve(goal)?;
        self.match_rule(goal, at)
    }

    /// Non-failing match: the match's end index, or `at` untouched when the
    /// goal does not match.
    pub fn allow(&mut self, goal: &str, at: usize) -> Result<usize, ParseError> {
        Ok(self.match_goal(goal, at)?.unwrap_or(at))
    }

    /// Positive lookahead: `at` when the goal matches here, without
    /// consuming anything.
    pub fn check(&mut self, goal: &str, at: usize) -> Result<Option<usize>, ParseError> {
        Ok(self.match_goal(goal, at)?.map(|_| at))
    }

    /// Negative lookahead: `at` when the goal does not match here.
    pub fn disallow(&mut self, goal: &str, at: usize) -> Result<Option<usize>, ParseError> {
        Ok(match self.match_goal(goal, at)? {
            Some(_) => None,
            None => Some(at),
        })
    }

    /// Succeeds exactly when `at` is at or past the end of the source.
    pub fn eof(&self, at: usize) -> Option<usize> {
        (at >= self.source.len()).then_some(at)
    }

    /// How many production bodies ran during the last parse. Memo hits do
    /// not count, so this is the quantity bounded by the packrat guarantee.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// The highest index the last parse touched. Mostly useful for error
    /// reporting after a failed parse.
    pub fn furthest(&self) -> Option<usize> {
        self.memo.furthest()
    }

    /// Builds the tree of named productions recorded by the last successful
    /// parse.
    pub fn ast(&self, options: &AstOptions) -> Result<Ast<'s>, ParseError> {
        let (goal, at, end) = self.outcome.ok_or(ParseError::NoParse)?;
        Ok(ast::build(
            self.grammar,
            self.source,
            &self.memo,
            options,
            goal,
            at,
            end,
        ))
    }

    fn resolve(&self, name: &str) -> Result<GoalId, ParseError> {
        self.grammar
            .goal(name)
            .ok_or_else(|| ParseError::UnknownProduction(name.to_owned()))
    }

    fn match_rule(&mut self, goal: GoalId, at: usize) -> Result<Option<usize>, ParseError> {
        let at = self.skip_ignored(at)?;
        let slot = Slot::goal(goal);
        if let Some(outcome) = self.memo.lookup(at, slot) {
            return match outcome {
                Outcome::End(end) => Ok(Some(end)),
                Outcome::NoMatch => Ok(None),
                Outcome::InUse => Err(ParseError::LeftRecursion(
                    self.grammar.name(goal).to_owned(),
                )),
            };
        }

        self.memo.begin(at, slot);
        self.invocations += 1;
        let end = self.match_pattern(self.grammar.body(goal), at)?;
        self.memo.settle(at, slot, end);
        if let Some(end) = end {
            self.memo.record_found(at, goal);
            trace!(goal = self.grammar.name(goal), start = at, end, "matched");
        }
        Ok(end)
    }

    fn match_pattern(
        &mut self,
        pattern: &'g Pattern,
        at: usize,
    ) -> Result<Option<usize>, ParseError> {
        match pattern {
            Pattern::Literal(lit) => self.match_literal(*lit, at),
            Pattern::Sequence(body) => {
                let mut pos = at;
                for child in body {
                    match self.match_pattern(child, pos)? {
                        Some(next) => pos = next,
                        None => return Ok(None),
                    }
                }
                Ok(Some(pos))
            }
            Pattern::Choice(body) => {
                for child in body {
                    if let Some(end) = self.match_pattern(child, at)? {
                        return Ok(Some(end));
                    }
                }
                Ok(None)
            }
            Pattern::Repeat { body, min, max } => {
                let mut pos = at;
                let mut count = 0u32;
                while max.is_none_or(|max| count < max) {
                    match self.match_pattern(body, pos)? {
                        Some(next) => {
                            count += 1;
                            // Zero-width success: counting it again would
                            // loop forever.
                            if next == pos {
                                break;
                            }
                            pos = next;
                        }
                        None => break,
                    }
                }
                Ok((count >= *min).then_some(pos))
            }
            Pattern::Positive(body) => Ok(self.match_pattern(body, at)?.map(|_| at)),
            Pattern::Negative(body) => Ok(match self.match_pattern(body, at)? {
                Some(_) => None,
                None => Some(at),
            }),
            Pattern::Reference(goal) => self.match_rule(*goal, at),
            Pattern::Eof => Ok(self.eof(at)),
        }
    }

    fn match_literal(&mut self, lit: LitId, at: usize) -> Result<Option<usize>, ParseError> {
        let at = self.skip_ignored(at)?;
        let slot = Slot::literal(lit);
        if let Some(outcome) = self.memo.lookup(at, slot) {
            return Ok(match outcome {
                Outcome::End(end) => Some(end),
                _ => None,
            });
        }

        let rest = &self.source[at..];
        let end = match self.grammar.matcher(lit) {
            Matcher::Text(text) => rest.starts_with(text.as_str()).then(|| at + text.len()),
            Matcher::Pattern(regex) => regex.find(rest).map(|found| at + found.end()),
        };
        self.memo.settle(at, slot, end);
        Ok(end)
    }

    /// Runs the ignore set once, in order, before a goal or literal match.
    /// Each production is attempted with `allow` semantics; greediness comes
    /// from the ignore productions themselves.
    fn skip_ignored(&mut self, at: usize) -> Result<usize, ParseError> {
        if self.skipping || self.ignored.is_empty() {
            return Ok(at);
        }

        self.skipping = true;
        let mut pos = at;
        let mut result = Ok(());
        let mut n = 0;
        while n < self.ignored.len() {
            match self.match_rule(self.ignored[n], pos) {
                Ok(Some(end)) => pos = end,
                Ok(None) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            n += 1;
        }
        self.skipping = false;
        result.map(|()| pos)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        element::{alt, eof, lit, many, neg, opt, pos, refer, rx, seq, some},
        grammar::GrammarBuilder,
    };

    fn grammar(rules: &[(&str, crate::Element)]) -> Grammar {
        let mut builder = GrammarBuilder::new();
        for (name, body) in rules {
            builder.rule(*name, body.clone());
        }
        builder.build().unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn literal_and_regex() {
        let g = grammar(&[("word", lit("ab")), ("digits", rx("[0-9]+"))]);
        let mut engine = Engine::new(&g, "ab123");
        assert_eq!(engine.parse("word").unwrap(), Some(2));
        assert_eq!(engine.parse_at("digits", 2).unwrap(), Some(5));
        assert_eq!(engine.parse_at("digits", 0).unwrap(), None);
    }

    #[test]
    fn sequences_do_not_commit_partially() {
        let g = grammar(&[("ab", seq([lit("a"), lit("b")]))]);
        let mut engine = Engine::new(&g, "ac");
        assert_eq!(engine.parse("ab").unwrap(), None);
    }

    #[test]
    fn choice_is_prioritized() {
        let g = grammar(&[("word", alt([lit("ab"), lit("abc")]))]);
        let mut engine = Engine::new(&g, "abc");
        assert_eq!(engine.parse("word").unwrap(), Some(2));
    }

    #[test]
    fn repetition_is_greedy() {
        let g = grammar(&[("word", many(lit("a")))]);
        let mut engine = Engine::new(&g, "aaab");
        assert_eq!(engine.parse("word").unwrap(), Some(3));
    }

    #[test]
    fn repetition_bounds() {
        let g = grammar(&[("two", crate::element::rep(lit("a"), 2, Some(3)))]);

        assert_eq!(Engine::new(&g, "a").parse("two").unwrap(), None);
        assert_eq!(Engine::new(&g, "aa").parse("two").unwrap(), Some(2));
        assert_eq!(Engine::new(&g, "aaaa").parse("two").unwrap(), Some(3));
    }

    #[test]
    fn zero_width_repetition_terminates() {
        let g = grammar(&[("loop", many(opt(lit("a"))))]);
        let mut engine = Engine::new(&g, "aab");
        assert_eq!(engine.parse("loop").unwrap(), Some(2));
    }

    #[test]
    fn predicates_do_not_consume() {
        let g = grammar(&[
            ("guarded", seq([pos(lit("ab")), lit("abc")])),
            ("negated", seq([neg(lit("x")), lit("abc")])),
        ]);
        let mut engine = Engine::new(&g, "abc");
        assert_eq!(engine.parse("guarded").unwrap(), Some(3));
        assert_eq!(engine.parse("negated").unwrap(), Some(3));
    }

    #[test]
    fn eof_element() {
        let g = grammar(&[("all", seq([many(lit("a")), eof()]))]);
        assert_eq!(Engine::new(&g, "aaa").parse("all").unwrap(), Some(3));
        assert_eq!(Engine::new(&g, "aab").parse("all").unwrap(), None);
    }

    #[test]
    fn memoization_runs_bodies_once() {
        // Both alternatives start with `inner` at index 0; the second
        // attempt must come from the memo.
        let g = grammar(&[
            (
                "outer",
                alt([seq([refer("inner"), lit("x")]), seq([refer("inner"), lit("y")])]),
            ),
            ("inner", lit("a")),
        ]);
        let mut engine = Engine::new(&g, "ay");
        assert_eq!(engine.parse("outer").unwrap(), Some(2));
        assert_eq!(engine.invocations(), 2);
    }

    #[test]
    fn direct_left_recursion_is_fatal() {
        let g = grammar(&[("x", seq([refer("x"), lit("a")]))]);
        let mut engine = Engine::new(&g, "aaa");
        assert_eq!(
            engine.parse("x").unwrap_err(),
            ParseError::LeftRecursion("x".into())
        );
    }

    #[test]
    fn indirect_left_recursion_is_fatal() {
        let g = grammar(&[("x", refer("y")), ("y", seq([refer("x"), lit("a")]))]);
        let mut engine = Engine::new(&g, "aaa");
        assert_eq!(
            engine.parse("x").unwrap_err(),
            ParseError::LeftRecursion("x".into())
        );
    }

    #[test]
    fn unknown_goal() {
        let g = grammar(&[("a", lit("a"))]);
        let mut engine = Engine::new(&g, "a");
        assert_eq!(
            engine.parse("missing").unwrap_err(),
            ParseError::UnknownProduction("missing".into())
        );
    }

    #[test]
    fn lookahead_helpers() {
        let g = grammar(&[("a", lit("a"))]);
        let mut engine = Engine::new(&g, "ab");
        engine.parse("a").unwrap();

        assert_eq!(engine.allow("a", 0).unwrap(), 1);
        assert_eq!(engine.allow("a", 1).unwrap(), 1);
        assert_eq!(engine.check("a", 0).unwrap(), Some(0));
        assert_eq!(engine.check("a", 1).unwrap(), None);
        assert_eq!(engine.disallow("a", 0).unwrap(), None);
        assert_eq!(engine.disallow("a", 1).unwrap(), Some(1));
    }

    #[test]
    fn ignore_set_is_transparent() {
        let g = grammar(&[
            ("phrase", some(refer("word"))),
            ("word", lit("ab")),
            ("sp", rx("[ \t]+")),
        ]);
        let mut engine = Engine::new(&g, "ab \t ab ab");
        engine.set_ignore(["sp"]).unwrap();
        assert_eq!(engine.parse("phrase").unwrap(), Some(10));

        let mut bare = Engine::new(&g, "ab \t ab ab");
        assert_eq!(bare.parse("phrase").unwrap(), Some(2));
    }

    #[test]
    fn ignore_applies_before_literals() {
        let g = grammar(&[("pair", seq([lit("a"), lit("b")])), ("sp", lit(" "))]);
        let mut engine = Engine::new(&g, "a b");
        engine.set_ignore(["sp"]).unwrap();
        assert_eq!(engine.parse("pair").unwrap(), Some(3));
    }

    #[test]
    fn parse_resets_the_memo() {
        let g = grammar(&[("a", lit("a"))]);
        let mut engine = Engine::new(&g, "a");
        assert_eq!(engine.parse("a").unwrap(), Some(1));
        assert_eq!(engine.invocations(), 1);
        assert_eq!(engine.parse("a").unwrap(), Some(1));
        assert_eq!(engine.invocations(), 1);
    }
}
