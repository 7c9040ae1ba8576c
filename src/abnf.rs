use std::collections::HashSet;
use std::sync::OnceLock;

use tracing::debug;

use crate::{
    ast::{AstOptions, Node},
    element::{Element, alt, eof, lit, many, neg, opt, refer, rx, seq, some},
    engine::Engine,
    error::AbnfError,
    grammar::{Grammar, GrammarBuilder},
};

/// Node navigation operation names. A production normalizing to one of these
/// is prefixed so it cannot shadow a tree operation. Sorted.
const RESERVED: &[&str] = &[
    "children",
    "children_named",
    "count",
    "depth",
    "end",
    "find",
    "first_child",
    "is_empty",
    "last_child",
    "len",
    "name",
    "next_sibling",
    "parent",
    "range",
    "root",
    "source",
    "start",
    "stripped",
    "text",
];

/// RFC 5234 appendix B core rules, in the same ABNF this module reads.
const CORE_ABNF: &str = "\
alpha = %x41-5A / %x61-7A
bit = \"0\" / \"1\"
char = %x01-7F
cr = %x0D
crlf = cr lf
ctl = %x00-1F / %x7F
digit = %x30-39
dquote = %x22
hexdig = digit / \"A\" / \"B\" / \"C\" / \"D\" / \"E\" / \"F\"
htab = %x09
lf = %x0A
lwsp = *(wsp / crlf wsp)
octet = %x00-FF
sp = %x20
vchar = %x21-7E
wsp = sp / htab
";

static BOOTSTRAP: OnceLock<Grammar> = OnceLock::new();
static CORE: OnceLock<Vec<(String, Element)>> = OnceLock::new();

/// The grammar this module uses to read ABNF source: ABNF described in
/// engine primitives, whitespace and comments handled by the ignore set.
///
/// Alternative order is load-bearing everywhere a prefix is shared, since
/// the engine's choice is committal.
fn bootstrap() -> &'static Grammar {
    BOOTSTRAP.get_or_init(|| {
        let mut b = GrammarBuilder::new();
        b.rule("grammar", seq([some(refer("prod")), eof()]));
        b.rule("prodname", rx("[A-Za-z][-A-Za-z0-9]*"));
        b.rule("ws", rx(r"([ \t\n]|;[^\n]*\n)+"));
        b.rule("s", opt(refer("ws")));
        b.rule(
            "prod",
            seq([
                refer("prodname"),
                refer("s"),
                lit("="),
                refer("s"),
                refer("prodalt"),
                refer("s"),
            ]),
        );
        b.rule(
            "prodalt",
            seq([
                refer("prodterm"),
                many(seq([refer("s"), lit("/"), refer("s"), refer("prodterm")])),
            ]),
        );
        b.rule(
            "prodterm",
            seq([
                refer("prodatom"),
                many(seq([refer("s"), refer("prodatom")])),
            ]),
        );
        b.rule(
            "prodatom",
            alt([
                refer("numlit"),
                refer("casese"),
                seq([opt(lit("%i")), refer("casein")]),
                // A reference, unless it opens the next definition.
                seq([refer("prodname"), neg(seq([refer("s"), lit("=")]))]),
                refer("optgroup"),
                refer("repgroup"),
                refer("group"),
            ]),
        );
        b.rule(
            "numlit",
            alt([
                rx("%x[0-9A-Fa-f]{2}([-.][0-9A-Fa-f]{2})*"),
                rx("%d[0-9]+([-.][0-9]+)*"),
            ]),
        );
        b.rule("casein", rx("\"[^\"]+\""));
        b.rule("casese", rx("%s\"[^\"]+\""));
        b.rule(
            "optgroup",
            seq([lit("["), refer("s"), refer("prodalt"), refer("s"), lit("]")]),
        );
        b.rule(
            "group",
            seq([lit("("), refer("s"), refer("prodalt"), refer("s"), lit(")")]),
        );
        b.rule("repgroup", seq([refer("repspec"), refer("prodatom")]));
        b.rule("repspec", rx(r"[0-9]*\*[0-9]*"));
        b.build().unwrap_or_else(|e| unreachable!("{e}"))
    })
}

fn core_rules() -> &'static [(String, Element)] {
    CORE.get_or_init(|| read(CORE_ABNF).unwrap_or_else(|e| unreachable!("{e}")))
}

/// Compiles ABNF source text (RFC 5234, with RFC 7405 `%s"…"` strings) into
/// a [`Grammar`]. Every referenced production must be defined in `source`.
///
/// ```
/// use abnf_packrat::{compile, Engine};
///
/// let grammar = compile("digit = %x30-39\nnumber = 1*digit\n").unwrap();
/// let mut engine = Engine::new(&grammar, "123xyz");
/// assert_eq!(engine.parse("number").unwrap(), Some(3));
/// ```
pub fn compile(source: &str) -> Result<Grammar, AbnfError> {
    build_rules(read(source)?)
}

/// As [`compile`], but definitions for RFC 5234 core rules (`ALPHA`,
/// `DIGIT`, `CRLF`, …) that `source` references without defining are
/// appended automatically.
pub fn compile_with_core(source: &str) -> Result<Grammar, AbnfError> {
    let mut rules = read(source)?;
    inject_core(&mut rules);
    build_rules(rules)
}

/// Lowercases a production name and turns dashes into underscores. Names
/// that would collide with a tree navigation operation get a `p_` prefix.
pub fn normalize_name(name: &str) -> String {
    let mut normalized: String = name
        .chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect();
    if RESERVED.binary_search(&normalized.as_str()).is_ok() {
        normalized.insert_str(0, "p_");
    }
    normalized
}

/// Parses `source` with the bootstrap grammar and lowers each production
/// into builder elements.
fn read(source: &str) -> Result<Vec<(String, Element)>, AbnfError> {
    let mut engine = Engine::new(bootstrap(), source);
    engine.set_ignore(["ws", "s"])?;
    if engine.parse("grammar")?.is_none() {
        return Err(AbnfError::Invalid {
            furthest: engine.furthest().unwrap_or(0),
        });
    }

    let tree = engine.ast(&AstOptions::new().ignore_all(["ws", "s"]))?;
    let mut rules = vec![];
    for prod in tree.root().children_named("prod") {
        let name = normalize_name(child(prod, "prodname").text());
        let body = lower_alt(&name, child(prod, "prodalt"))?;
        rules.push((name, body));
    }
    Ok(rules)
}

fn build_rules(rules: Vec<(String, Element)>) -> Result<Grammar, AbnfError> {
    let mut builder = GrammarBuilder::new();
    for (name, body) in rules {
        builder.rule(name, body);
    }
    let grammar = builder.build()?;
    debug!(productions = grammar.len(), "compiled ABNF grammar");
    Ok(grammar)
}

/// Appends core rules for every name referenced but not defined, following
/// references between core rules themselves.
fn inject_core(rules: &mut Vec<(String, Element)>) {
    let mut defined: HashSet<String> = rules.iter().map(|(name, _)| name.clone()).collect();
    let mut pending: Vec<String> = rules
        .iter()
        .flat_map(|(_, body)| body.references())
        .map(str::to_owned)
        .collect();

    while let Some(name) = pending.pop() {
        if defined.contains(&name) {
            continue;
        }
        let Some((_, body)) = core_rules().iter().find(|(core, _)| *core == name) else {
            continue;
        };
        defined.insert(name.clone());
        pending.extend(body.references().iter().map(|r| (*r).to_owned()));
        rules.push((name, body.clone()));
    }
}

fn child<'a, 's>(node: Node<'a, 's>, name: &str) -> Node<'a, 's> {
    node.find(name)
        .unwrap_or_else(|| unreachable!("the bootstrap grammar guarantees a `{name}` child"))
}

fn lower_alt(rule: &str, node: Node<'_, '_>) -> Result<Element, AbnfError> {
    let mut terms = node
        .children_named("prodterm")
        .map(|term| lower_term(rule, term))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if terms.len() == 1 {
        terms.pop().unwrap_or_else(|| unreachable!())
    } else {
        alt(terms)
    })
}

fn lower_term(rule: &str, node: Node<'_, '_>) -> Result<Element, AbnfError> {
    let mut atoms = node
        .children_named("prodatom")
        .map(|atom| lower_atom(rule, atom))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if atoms.len() == 1 {
        atoms.pop().unwrap_or_else(|| unreachable!())
    } else {
        seq(atoms)
    })
}

fn lower_atom(rule: &str, node: Node<'_, '_>) -> Result<Element, AbnfError> {
    let inner = node
        .children()
        .next()
        .unwrap_or_else(|| unreachable!("an atom wraps one production"));
    match inner.name() {
        "numlit" => lower_numlit(rule, inner.text()),
        "casese" => {
            let text = inner.text();
            Ok(lit(&text[3..text.len() - 1]))
        }
        "casein" => {
            let text = inner.text();
            let escaped = regex::escape(&text[1..text.len() - 1]);
            Ok(rx(format!("(?i:{escaped})")))
        }
        "prodname" => Ok(refer(normalize_name(inner.text()))),
        "optgroup" => Ok(opt(lower_alt(rule, child(inner, "prodalt"))?)),
        "group" => lower_alt(rule, child(inner, "prodalt")),
        "repgroup" => {
            let spec = child(inner, "repspec").text();
            let atom = lower_atom(rule, child(inner, "prodatom"))?;
            lower_repetition(rule, spec, atom)
        }
        other => unreachable!("unexpected production `{other}` inside an atom"),
    }
}

/// `min*max` with a missing min meaning 0 and a missing max meaning
/// unbounded. Only the three classic forms are supported.
fn lower_repetition(rule: &str, spec: &str, atom: Element) -> Result<Element, AbnfError> {
    let (lo, hi) = spec.split_once('*').unwrap_or((spec, ""));
    let min: Option<u32> = if lo.is_empty() { Some(0) } else { lo.parse().ok() };
    let max: Option<Option<u32>> = if hi.is_empty() {
        Some(None)
    } else {
        hi.parse().ok().map(Some)
    };
    match (min, max) {
        (Some(0), Some(None)) => Ok(many(atom)),
        (Some(1), Some(None)) => Ok(some(atom)),
        (Some(0), Some(Some(1))) => Ok(opt(atom)),
        _ => Err(AbnfError::UnsupportedRepetition {
            rule: rule.to_owned(),
            spec: spec.to_owned(),
        }),
    }
}

/// `%x`/`%d` literals: a bare number is one character, `.`-separated numbers
/// concatenate, and `lo-hi` becomes a single-character class.
fn lower_numlit(rule: &str, text: &str) -> Result<Element, AbnfError> {
    let radix = if text.starts_with("%x") { 16 } else { 10 };
    let digits = &text[2..];
    let bad = || AbnfError::BadCodepoint {
        rule: rule.to_owned(),
        literal: text.to_owned(),
    };

    match digits.find(['-', '.']) {
        None => Ok(lit(
            decode(digits, radix).ok_or_else(bad)?.to_string(),
        )),
        Some(split) if digits.as_bytes()[split] == b'.' => {
            let mut word = String::new();
            for part in digits.split('.') {
                word.push(decode(part, radix).ok_or_else(bad)?);
            }
            Ok(lit(word))
        }
        Some(split) => {
            let tail = &digits[split + 1..];
            let lo = decode(&digits[..split], radix).ok_or_else(bad)?;
            let hi = decode(tail.split(['-', '.']).next().unwrap_or(tail), radix)
                .ok_or_else(bad)?;
            Ok(rx(format!(
                r"[\u{{{:X}}}-\u{{{:X}}}]",
                u32::from(lo),
                u32::from(hi)
            )))
        }
    }
}

fn decode(digits: &str, radix: u32) -> Option<char> {
    u32::from_str_radix(digits, radix)
        .ok()
        .and_then(char::from_u32)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::GrammarError;

    fn end_of(grammar: &Grammar, goal: &str, input: &str) -> Option<usize> {
        Engine::new(grammar, input)
            .parse(goal)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_name("Foo-Bar"), "foo_bar");
        assert_eq!(normalize_name("DIGIT"), "digit");
        assert_eq!(normalize_name("FIND"), "p_find");
        assert_eq!(normalize_name("first-child"), "p_first_child");
    }

    #[test]
    fn compiles_references_and_ranges() {
        let grammar = compile("digit = %x30-39\nnumber = 1*digit\n").unwrap();
        assert_eq!(grammar.names().collect::<Vec<_>>(), ["digit", "number"]);
        assert_eq!(end_of(&grammar, "number", "123xyz"), Some(3));
        assert_eq!(end_of(&grammar, "number", "xyz"), None);
    }

    #[test]
    fn numeric_concatenation() {
        let grammar = compile("crlf = %x0D.0A\n").unwrap();
        assert_eq!(end_of(&grammar, "crlf", "\r\n"), Some(2));
        assert_eq!(end_of(&grammar, "crlf", "\n"), None);
    }

    #[test]
    fn decimal_literals() {
        let grammar = compile("tab = %d9\nlow = %d48-57\n").unwrap();
        assert_eq!(end_of(&grammar, "tab", "\t"), Some(1));
        assert_eq!(end_of(&grammar, "low", "7"), Some(1));
        assert_eq!(end_of(&grammar, "low", "a"), None);
    }

    #[test]
    fn case_sensitivity() {
        let grammar = compile("kw = %s\"IF\"\n").unwrap();
        assert_eq!(end_of(&grammar, "kw", "If"), None);
        assert_eq!(end_of(&grammar, "kw", "IF"), Some(2));

        let grammar = compile("kw = \"IF\"\n").unwrap();
        assert_eq!(end_of(&grammar, "kw", "if"), Some(2));

        let grammar = compile("kw = %i\"IF\"\n").unwrap();
        assert_eq!(end_of(&grammar, "kw", "iF"), Some(2));
    }

    #[test]
    fn case_insensitive_metacharacters_are_escaped() {
        let grammar = compile("star = \"*\"\n").unwrap();
        assert_eq!(end_of(&grammar, "star", "*"), Some(1));
        assert_eq!(end_of(&grammar, "star", "x"), None);
    }

    #[test]
    fn optional_and_grouping() {
        let src = "int = [sign] 1*digit\nsign = \"-\" / \"+\"\ndigit = %x30-39\n";
        let grammar = compile(src).unwrap();
        assert_eq!(end_of(&grammar, "int", "-42"), Some(3));
        assert_eq!(end_of(&grammar, "int", "42"), Some(2));

        let grammar = compile("pair = (\"a\" / \"b\") \"x\"\n").unwrap();
        assert_eq!(end_of(&grammar, "pair", "bx"), Some(2));
    }

    #[test]
    fn comments_are_transparent() {
        let src = "a = \"x\" ; trailing comment\nb = a\n";
        let grammar = compile(src).unwrap();
        assert_eq!(end_of(&grammar, "b", "x"), Some(1));
    }

    #[test]
    fn unsupported_repetition_bounds() {
        let err = compile("x = 2*5\"a\"\n").unwrap_err();
        assert_eq!(
            err,
            AbnfError::UnsupportedRepetition {
                rule: "x".into(),
                spec: "2*5".into()
            }
        );
    }

    #[test]
    fn invalid_source_reports_the_stall_point() {
        assert_eq!(compile("=").unwrap_err(), AbnfError::Invalid { furthest: 0 });
        assert_eq!(
            compile("foo = ").unwrap_err(),
            AbnfError::Invalid { furthest: 6 }
        );
    }

    #[test]
    fn dangling_references_fail_the_build() {
        let err = compile("word = 1*ALPHA\n").unwrap_err();
        assert_eq!(
            err,
            AbnfError::Grammar(GrammarError::DanglingReference {
                rule: "word".into(),
                target: "alpha".into()
            })
        );
    }

    #[test]
    fn core_rules_are_injected_on_demand() {
        let grammar = compile_with_core("word = 1*ALPHA\n").unwrap();
        assert_eq!(end_of(&grammar, "word", "Hello9"), Some(5));

        // Transitive: crlf pulls in cr and lf.
        let grammar = compile_with_core("line = 1*VCHAR CRLF\n").unwrap();
        assert_eq!(end_of(&grammar, "line", "hi\r\n"), Some(4));
    }

    #[test]
    fn double_compile_is_deterministic() {
        let src = "digit = %x30-39\nnumber = 1*digit\n";
        assert_eq!(compile(src).unwrap(), compile(src).unwrap());
    }
}
