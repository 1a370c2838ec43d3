//! Error types for the GitLab API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the group/project/issue does not exist" from "the server returned an
//! unexpected status." All other non-2xx responses land in `Http` with the
//! raw status code and body. Every variant produced by the request executor
//! carries the method and URL that failed.

use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpMethod;

/// Errors returned by `GitlabClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("{method} {url}: not found: {body}")]
    NotFound {
        method: HttpMethod,
        url: String,
        body: String,
    },

    /// The server returned a non-2xx status other than 404.
    #[error("{method} {url}: HTTP {status}: {body}")]
    Http {
        method: HttpMethod,
        url: String,
        status: u16,
        body: String,
    },

    /// No response was received.
    #[error("{method} {url}: transport error: {message}")]
    Transport {
        method: HttpMethod,
        url: String,
        message: String,
    },

    /// A 2xx response body was not valid JSON.
    #[error("{method} {url}: invalid JSON in response: {message}")]
    Decode {
        method: HttpMethod,
        url: String,
        message: String,
    },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A local file needed for the request could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of an `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server answered with a non-2xx status.
    Status,
    Transport,
    Decode,
    /// Failed before anything was sent.
    Local,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound { .. } | ApiError::Http { .. } => ErrorKind::Status,
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::Decode { .. } => ErrorKind::Decode,
            ApiError::Serialization(_) | ApiError::Io { .. } => ErrorKind::Local,
        }
    }

    /// HTTP status of the failed response, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body of the failed response, if the server answered.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::NotFound { body, .. } | ApiError::Http { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }

    /// Method and URL of the request that failed, if one was sent.
    pub fn request(&self) -> Option<(HttpMethod, &str)> {
        match self {
            ApiError::NotFound { method, url, .. }
            | ApiError::Http { method, url, .. }
            | ApiError::Transport { method, url, .. }
            | ApiError::Decode { method, url, .. } => Some((*method, url.as_str())),
            ApiError::Serialization(_) | ApiError::Io { .. } => None,
        }
    }
}
