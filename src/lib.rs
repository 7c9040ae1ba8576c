#![forbid(unsafe_code)]
#![warn(explicit_outlives_requirements)]
#![warn(missing_debug_implementations)]
#![warn(clippy::pedantic)]
#![warn(missing_copy_implementations)]
#![warn(redundant_lifetimes)]
//#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(unused_crate_dependencies)]
#![warn(unused_qualifications)]
#![allow(clippy::must_use_candidate)]

//! A packrat (memoizing PEG) parsing engine with an ABNF front-end.
//!
//! Grammars come from two places: [`compile`] reads RFC 5234 ABNF text
//! (with RFC 7405 `%s"…"` case-sensitive literals), and [`GrammarBuilder`]
//! assembles the same shape programmatically from [`Element`] values.
//! Either way the [`Engine`] matches a chosen production against a source
//! text in linear time, and the memo table a parse leaves behind can be
//! reconstructed into an [`Ast`] of named nodes over source ranges.
//!
//! ```
//! use abnf_packrat::{compile, AstOptions, Engine};
//!
//! let grammar = compile(
//!     "expr = term *(\"+\" term)\nterm = 1*digit\ndigit = %x30-39\n",
//! ).unwrap();
//!
//! let mut engine = Engine::new(&grammar, "12+34");
//! assert_eq!(engine.parse("expr").unwrap(), Some(5));
//!
//! let tree = engine.ast(&AstOptions::new()).unwrap();
//! assert_eq!(tree.root().count("term"), 2);
//! ```
//!
//! Prioritized choice is committal: when alternatives share a prefix the
//! longer one must come first in its choice, or the shorter match wins and
//! is never revisited. Left-recursive productions are rejected at parse
//! time; rewrite them as right recursion or a repetition.
//!
//! Positions are byte offsets into the source. ABNF numeric literals denote
//! Unicode scalar values, so a `%x`/`%d` range matches one `char` and may
//! advance more than one byte.

mod abnf;
mod ast;
mod element;
mod engine;
mod error;
mod grammar;
mod memo;
mod proptesting;

pub use crate::{
    abnf::{compile, compile_with_core, normalize_name},
    ast::{Ast, AstOptions, Children, Node},
    element::{
        Element, ElementKind, Lit, alt, eof, lit, lits, many, neg, one, opt, pos, refer, rep, rx,
        seq, some,
    },
    engine::Engine,
    error::{AbnfError, GrammarError, ParseError},
    grammar::{GoalId, Grammar, GrammarBuilder},
};
