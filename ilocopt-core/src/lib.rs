//! Optimizing back end for the ILOC intermediate language.
//!
//! The crate consumes ILOC source text, lowers it into a basic-block IR,
//! and runs a configurable sequence of analyses and transformations over
//! it: local value numbering, SSA construction, aggressive dead-code
//! elimination, and Chaitin-Briggs register allocation. The result is
//! emitted back out as ILOC text.

pub mod optimizer;
