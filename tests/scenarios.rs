use abnf_packrat::{AstOptions, Engine, GrammarBuilder, Node, ParseError, compile, lit, many};

#[test]
fn star_on_empty_input() {
    let mut builder = GrammarBuilder::new();
    builder.rule("s", many(lit("a")));
    let grammar = builder.build().unwrap_or_else(|e| panic!("{e}"));

    let mut engine = Engine::new(&grammar, "");
    assert_eq!(engine.parse("s").unwrap(), Some(0));
}

#[test]
fn star_consumes_the_whole_input() {
    let mut builder = GrammarBuilder::new();
    builder.rule("s", many(lit("a")));
    let grammar = builder.build().unwrap();

    let mut engine = Engine::new(&grammar, "aaaa");
    assert_eq!(engine.parse("s").unwrap(), Some(4));

    let tree = engine.ast(&AstOptions::new()).unwrap();
    assert_eq!(tree.root().name(), "s");
    assert_eq!(tree.root().len(), 4);
}

#[test]
fn number_stops_at_the_first_nondigit() {
    let grammar = compile("digit = %x30-39\nnumber = 1*digit\n").unwrap();
    let mut engine = Engine::new(&grammar, "123xyz");
    assert_eq!(engine.parse("number").unwrap(), Some(3));
}

#[test]
fn choice_commits_to_the_first_matching_prefix() {
    let grammar = compile("alt = \"foo\" / \"foobar\"\n").unwrap();
    let mut engine = Engine::new(&grammar, "foobar");
    assert_eq!(engine.parse("alt").unwrap(), Some(3));

    // The documented fix: longer alternatives first.
    let grammar = compile("alt = \"foobar\" / \"foo\"\n").unwrap();
    let mut engine = Engine::new(&grammar, "foobar");
    assert_eq!(engine.parse("alt").unwrap(), Some(6));
}

#[test]
fn case_sensitive_and_insensitive_literals() {
    let grammar = compile("kw = %s\"IF\"\n").unwrap();
    assert_eq!(Engine::new(&grammar, "If").parse("kw").unwrap(), None);
    assert_eq!(Engine::new(&grammar, "IF").parse("kw").unwrap(), Some(2));

    let grammar = compile("kw = \"IF\"\n").unwrap();
    assert_eq!(Engine::new(&grammar, "if").parse("kw").unwrap(), Some(2));
}

#[test]
fn failed_alternatives_do_not_poison_later_ones() {
    let src = "repeat = 1*digit / (*digit \"*\" *digit)\ndigit = %x30-39\n";
    let grammar = compile(src).unwrap();
    let mut engine = Engine::new(&grammar, "*3");
    assert_eq!(engine.parse("repeat").unwrap(), Some(2));

    let src = "repeat = (*digit \"*\" *digit) / 1*digit\ndigit = %x30-39\n";
    let grammar = compile(src).unwrap();
    let mut engine = Engine::new(&grammar, "*3");
    assert_eq!(engine.parse("repeat").unwrap(), Some(2));
}

#[test]
fn left_recursive_rules_are_rejected_at_parse_time() {
    let grammar = compile("x = x \"a\"\n").unwrap();
    let mut engine = Engine::new(&grammar, "aaa");
    assert_eq!(
        engine.parse("x").unwrap_err(),
        ParseError::LeftRecursion("x".into())
    );
}

#[test]
fn alternatives_share_memoized_prefixes() {
    let src = "stmt = word \"!\" / word \"?\"\nword = 1*alpha\nalpha = %x61-7A\n";
    let grammar = compile(src).unwrap();
    let mut engine = Engine::new(&grammar, "hey?");
    assert_eq!(engine.parse("stmt").unwrap(), Some(4));

    // One body run for `stmt` and `word`, four for `alpha` (three matches
    // and the final miss); the second alternative reuses the memo.
    assert_eq!(engine.invocations(), 6);
}

#[test]
fn ast_ranges_nest_and_stay_ordered() {
    fn check(node: Node<'_, '_>) {
        let mut previous_end = node.start();
        for child in node.children() {
            assert!(child.start() >= previous_end, "siblings overlap");
            assert!(child.end() <= node.end(), "child escapes its parent");
            check(child);
            previous_end = child.end();
        }
    }

    let src = "list = item *(\",\" item)\nitem = 1*digit\ndigit = %x30-39\n";
    let grammar = compile(src).unwrap();
    let mut engine = Engine::new(&grammar, "12,3,456");
    assert_eq!(engine.parse("list").unwrap(), Some(8));

    let tree = engine.ast(&AstOptions::new()).unwrap();
    check(tree.root());
    assert_eq!(tree.root().count("item"), 3);
}
