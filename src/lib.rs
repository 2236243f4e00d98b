pub mod config;
pub mod harness;
pub mod parser;
pub mod sandbox;
pub mod verifier;
