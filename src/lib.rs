//! corrente: a progressive response-streaming engine for server-rendered
//! pages.
//!
//! Given a resolved page object, the engine streams a complete HTML document
//! incrementally: components render as their data arrives, output reaches
//! the wire strictly in declaration order, client scripts are gated on
//! above-the-fold completion, and data that resolves after the body closes
//! is streamed to the already-rendered page.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
