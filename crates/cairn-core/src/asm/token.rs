//! Token types for the listing assembler

use logos::Logos;

/// The kind of token found on a listing line
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"([ \t\r]+|;[^\n]*)")]
pub enum TokenKind {
    // ========== Keywords ==========
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ========== Literals ==========
    /// Double literal: `3.5`, `-2`, `1e3`
    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    Number,

    /// SmallNumber literal: `7s`
    #[regex(r"-?[0-9]+s")]
    Small,

    /// BigNumber literal: `123.45n`
    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?n")]
    Big,

    /// Double-quoted text with backslash escapes
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    Text,

    // ========== Identifiers ==========
    /// Mnemonics, and bare operands such as variable or kind names
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", priority = 1)]
    Ident,
}
