#![cfg(test)]
use proptest::prelude::*;

use crate::{
    Element, Engine, GrammarBuilder, compile,
    element::{alt, eof, lit, many, opt, refer, rx, seq, some},
};

/// Productions every generated grammar defines, so references always
/// resolve.
const NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn element_strategy() -> impl Strategy<Value = Element> {
    let leaf = prop_oneof![
        (0..NAMES.len()).prop_map(|n| refer(NAMES[n])),
        "[a-z]{1,6}".prop_map(lit),
    ];

    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(seq),
            prop::collection::vec(inner.clone(), 2..4).prop_map(alt),
            inner.clone().prop_map(many),
            inner.clone().prop_map(some),
            inner.prop_map(opt),
        ]
    })
}

proptest! {
    /// Rendering an element as ABNF and compiling it back yields the same
    /// grammar as lowering the element directly.
    #[test]
    fn rendered_elements_compile_back(element in element_strategy()) {
        let mut text = format!("start = {element}\n");
        for name in NAMES {
            text.push_str(&format!("{name} = %s\"{name}\"\n"));
        }

        let mut builder = GrammarBuilder::new();
        builder.rule("start", element);
        for name in NAMES {
            builder.rule(name, lit(name));
        }
        let direct = builder.build().unwrap_or_else(|e| panic!("{e}"));

        let compiled = compile(&text).unwrap_or_else(|e| panic!("{e}\nsource:\n{text}"));
        prop_assert_eq!(direct, compiled);
    }
}

proptest! {
    #[test]
    fn repetition_is_maximal(n in 0usize..40) {
        let mut builder = GrammarBuilder::new();
        builder.rule("run", many(lit("a")));
        let grammar = builder.build().unwrap();

        let input = "a".repeat(n);
        let mut engine = Engine::new(&grammar, &input);
        prop_assert_eq!(engine.parse("run").unwrap(), Some(n));
    }

    #[test]
    fn prioritized_choice_takes_the_first_match(word in "[a-z]{1,8}") {
        // Both alternatives match at index 0; the first one's end wins.
        let mut builder = GrammarBuilder::new();
        builder.rule("w", alt([lit(&word[..1]), lit(word.clone())]));
        let grammar = builder.build().unwrap();

        let mut engine = Engine::new(&grammar, &word);
        prop_assert_eq!(engine.parse("w").unwrap(), Some(1));
    }

    #[test]
    fn ignored_tokens_are_transparent(seps in prop::collection::vec("[ \t]{0,3}", 0..5)) {
        let mut builder = GrammarBuilder::new();
        builder.rule("phrase", seq([some(refer("word")), eof()]));
        builder.rule("word", lit("ab"));
        builder.rule("blank", rx("[ \t]+"));
        let grammar = builder.build().unwrap();

        let mut input = String::from("ab");
        for sep in &seps {
            input.push_str(sep);
            input.push_str("ab");
        }

        let mut engine = Engine::new(&grammar, &input);
        engine.set_ignore(["blank"]).unwrap();
        prop_assert_eq!(engine.parse("phrase").unwrap(), Some(input.len()));
    }

    /// The packrat bound: production bodies run at most once per position.
    #[test]
    fn invocations_stay_linear(n in 1usize..30) {
        let mut builder = GrammarBuilder::new();
        builder.rule(
            "list",
            seq([refer("item"), many(seq([lit(","), refer("item")]))]),
        );
        builder.rule("item", some(refer("digit")));
        builder.rule("digit", rx("[0-9]"));
        let grammar = builder.build().unwrap();

        let input: Vec<String> = (0..n).map(|i| (i % 10).to_string()).collect();
        let input = input.join(",");
        let mut engine = Engine::new(&grammar, &input);

        prop_assert_eq!(engine.parse("list").unwrap(), Some(input.len()));
        let bound = (grammar.len() as u64) * (input.len() as u64 + 1);
        prop_assert!(engine.invocations() <= bound);
    }
}
