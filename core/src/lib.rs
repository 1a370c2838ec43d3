//! Synchronous client for the GitLab REST API v4.
//!
//! # Overview
//! `GitlabClient` exposes one method per endpoint (groups, members, projects,
//! issues, labels, notes, time tracking, uploads, namespaces, users). Each
//! method performs exactly one blocking round trip, authenticated with the
//! `PRIVATE-TOKEN` header, and returns the decoded JSON or an `ApiError`.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`);
//!   the network sits behind the `Transport` trait, with `UreqTransport` as
//!   the default.
//! - The client holds only its immutable `ClientConfig`, transport and
//!   clock. No caching, retries or pagination traversal.
//! - Failures carry the method, URL, status and body and are also logged
//!   through `tracing`.
//!
//! ```no_run
//! use gitlab_core::{AccessLevel, GitlabClient};
//!
//! let client = GitlabClient::new("https://gitlab.example.com", "glpat-...");
//! let group = client.create_group("Platform", "platform")?;
//! let group_id = group["id"].to_string();
//! client.add_group_member(&group_id, 42, AccessLevel::Owner)?;
//! # Ok::<(), gitlab_core::ApiError>(())
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;
mod upload;

pub use client::{ApiResult, GitlabClient, PRIVATE_TOKEN_HEADER};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{from_fn, FnTransport, Transport, TransportError, UreqTransport};
pub use types::{AccessLevel, IssueFields, Pagination, ProjectCreationLevel, Visibility};
