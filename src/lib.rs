//! # Cursor Bridge
//!
//! Exposes the `cursor-agent` CLI to other tools.
//!
//! This library provides:
//! - A bounded, shell-free process runner for the agent binary
//! - An OpenAI-compatible HTTP bridge with a model cache and model pinning
//! - Patch generation in disposable git worktrees
//! - MCP tools wrapping the above, plus a thin cloud REST client
//!
//! ## Request Flow
//! 1. Receive a chat completion over HTTP
//! 2. Resolve the model (explicit, pinned, or default) and flatten messages into a prompt
//! 3. Run `cursor-agent --print` and return its stdout as the assistant message
//!
//! ## Modules
//! - `process`: subprocess invocation with timeout and output capture
//! - `agent`: CLI arguments, model list parsing and caching, prompt building
//! - `worktree`: isolated patch generation
//! - `api`: HTTP surface

pub mod agent;
pub mod api;
pub mod cloud;
pub mod config;
pub mod process;
pub mod tools;
pub mod util;
pub mod worktree;

pub use config::Config;
