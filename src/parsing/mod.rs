//! Parsers for the line-oriented triple syntax used by changeset files
//! and base dataset files.

pub mod triple_parser;

pub use triple_parser::parse_triple_line;
