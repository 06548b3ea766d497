//! SQL front end: a pest grammar producing the AST consumed by the binder.

pub mod ast;
mod grammar;

pub use grammar::parse_query;
