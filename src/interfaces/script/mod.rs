//! JSON-lines scenario scripts standing in for the host transport.
//!
//! Each line is one host call or one native SDK event. The runner plays them
//! against a `PaymentBridge` and writes every callback delivery, release and
//! call result to its output as a JSON line carrying an `event` field.

pub mod reader;
pub mod runner;
pub mod step;
