//! Client core for a consumer router's text-based `/cgi` administration
//! protocol.
//!
//! # Overview
//! One HTTP POST carries a batch of commands, each addressing a named
//! configuration module and either reading fields or assigning them. The
//! router answers with per-command sections of value lines and a trailing
//! status code.
//!
//! # Design
//! - `codec` encodes command batches and decodes responses. It is pure and
//!   knows nothing about what any module means.
//! - `Session` wraps an encoded batch in the authenticated request, sends it
//!   through a `Transport` and turns HTTP and router failures into `ApiError`.
//! - `Session` is stateless apart from its configuration, so it can be
//!   shared freely between threads.
//! - `templates` and `ip` are conveniences for the router's known modules.

pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod ip;
pub mod session;
pub mod templates;
pub mod transport;

pub use codec::{
    decode, encode, extract_assigned_id, Command, CommandBatch, Decoded, DecodedSection,
    Operation, SectionHeader, Selector, NO_SELECTOR,
};
pub use config::RouterConfig;
pub use error::{ApiError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::Session;
pub use transport::{Transport, UreqTransport, REQUEST_TIMEOUT};
