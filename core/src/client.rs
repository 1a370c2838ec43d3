//! Blocking client for the GitLab REST API v4.
//!
//! # Design
//! Every public operation goes through the same three steps: build an
//! `HttpRequest` (`get` puts parameters in the query string, `post`/`put`
//! send a form-encoded body, `upload` encodes a multipart form), hand it to
//! `execute`, and classify the `HttpResponse` the transport returns.
//! `execute` is the only place that touches the network.
//!
//! Headers are layered in a fixed order: `Accept: application/json`, then
//! the request's own headers, then `PRIVATE-TOKEN`. The token layer is
//! applied last and unconditionally, so no request leaves without it and a
//! caller-supplied `PRIVATE-TOKEN` never replaces the configured one.

use std::fs;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::clock::{self, Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{set_header, HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    self, AccessLevel, AddMember, CreateGroup, CreateNote, CreateProject, IssueFields, Pagination,
    ProjectCreationLevel, SpentTime, Visibility,
};
use crate::upload::{self, EncodedForm};

/// Header carrying the personal access token.
pub const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

const API_PREFIX: &str = "/api/v4";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub type ApiResult = Result<Value, ApiError>;

/// Synchronous client for one GitLab instance.
///
/// Holds only immutable state, so a shared reference can be used from
/// several threads when the transport and clock allow it.
#[derive(Debug, Clone)]
pub struct GitlabClient<T = UreqTransport, C = SystemClock> {
    config: ClientConfig,
    transport: T,
    clock: C,
}

impl GitlabClient {
    /// `base_url` is the instance root, e.g. `https://gitlab.example.com`.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self::from_config(ClientConfig::new(base_url, token))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: UreqTransport::new(),
            clock: SystemClock,
        }
    }
}

impl<T, C> GitlabClient<T, C> {
    pub fn with_transport<U: Transport>(self, transport: U) -> GitlabClient<U, C> {
        GitlabClient {
            config: self.config,
            transport,
            clock: self.clock,
        }
    }

    pub fn with_clock<D: Clock>(self, clock: D) -> GitlabClient<T, D> {
        GitlabClient {
            config: self.config,
            transport: self.transport,
            clock,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<T: Transport, C: Clock> GitlabClient<T, C> {
    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    /// `group` is a numeric ID or a full path such as `parent/child`.
    pub fn get_group(&self, group: &str) -> ApiResult {
        self.get(&format!("/groups/{}", segment(group)), &[])
    }

    /// Creates a private group in which developers may create projects.
    pub fn create_group(&self, name: &str, path: &str) -> ApiResult {
        self.post(
            "/groups",
            &CreateGroup {
                name: name.to_string(),
                path: path.to_string(),
                visibility: Visibility::Private,
                project_creation_level: ProjectCreationLevel::Developer,
            },
        )
    }

    pub fn add_group_member(&self, group: &str, user_id: u64, access_level: AccessLevel) -> ApiResult {
        self.post(
            &format!("/groups/{}/members", segment(group)),
            &AddMember { user_id, access_level },
        )
    }

    pub fn find_group_project(&self, group: &str, project: &str) -> ApiResult {
        self.get(
            &format!("/groups/{}/projects", segment(group)),
            &[("search", project.to_string())],
        )
    }

    // -----------------------------------------------------------------------
    // Issues
    // -----------------------------------------------------------------------

    /// One page of a project's issues; `None` means page 1 of 20.
    pub fn list_issues(&self, project_id: u64, pagination: Option<Pagination>) -> ApiResult {
        self.get(
            &format!("/projects/{project_id}/issues"),
            &pagination.unwrap_or_default().query(),
        )
    }

    /// Issues whose title or description matches `title`.
    pub fn find_issue(&self, project_id: u64, title: &str) -> ApiResult {
        self.get(
            &format!("/projects/{project_id}/issues"),
            &[("search", title.to_string())],
        )
    }

    pub fn create_issue(&self, project_id: u64, fields: &IssueFields) -> ApiResult {
        self.post(&format!("/projects/{project_id}/issues"), &types::form_pairs(fields))
    }

    pub fn update_issue(&self, project_id: u64, issue_iid: u64, fields: &IssueFields) -> ApiResult {
        self.put(
            &format!("/projects/{project_id}/issues/{issue_iid}"),
            &types::form_pairs(fields),
        )
    }

    pub fn list_labels(&self, project_id: u64) -> ApiResult {
        self.get(&format!("/projects/{project_id}/labels"), &[])
    }

    /// `duration` uses GitLab's notation, e.g. `1h30m`.
    pub fn add_time_spent(&self, project_id: u64, issue_iid: u64, duration: &str) -> ApiResult {
        self.post(
            &format!("/projects/{project_id}/issues/{issue_iid}/add_spent_time"),
            &SpentTime {
                duration: duration.to_string(),
            },
        )
    }

    /// Adds a note to an issue. Without `created_at` the note is dated with
    /// the client clock's current time.
    pub fn create_issue_comment(
        &self,
        project_id: u64,
        issue_iid: u64,
        comment: &str,
        created_at: Option<DateTime<FixedOffset>>,
    ) -> ApiResult {
        let created_at = created_at.unwrap_or_else(|| self.clock.now());
        self.post(
            &format!("/projects/{project_id}/issues/{issue_iid}/notes"),
            &CreateNote {
                body: comment.to_string(),
                created_at: clock::iso8601(&created_at),
            },
        )
    }

    /// Uploads a local file to the project. The response's `markdown` field
    /// can be embedded in issue descriptions and notes.
    pub fn upload_attachment(&self, project_id: u64, file_path: impl AsRef<Path>) -> ApiResult {
        let path = file_path.as_ref();
        let io_error = |source: std::io::Error| ApiError::Io {
            path: path.to_path_buf(),
            source,
        };
        let data = fs::read(path).map_err(io_error)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let form = upload::file_form("file", filename, data).map_err(io_error)?;
        self.upload(&format!("/projects/{project_id}/uploads"), form)
    }

    // -----------------------------------------------------------------------
    // Projects, namespaces, users
    // -----------------------------------------------------------------------

    /// `name` is a numeric ID or a full namespace path.
    pub fn get_namespace(&self, name: &str) -> ApiResult {
        self.get(&format!("/namespaces/{}", segment(name)), &[])
    }

    /// One page of projects visible to the token; `None` means page 1 of 20.
    pub fn list_projects(&self, pagination: Option<Pagination>) -> ApiResult {
        self.get("/projects", &pagination.unwrap_or_default().query())
    }

    /// Creates a private project under `namespace_id`.
    pub fn create_project(&self, namespace_id: u64, path: &str) -> ApiResult {
        self.post(
            "/projects",
            &CreateProject {
                path: path.to_string(),
                visibility: Visibility::Private,
                namespace_id,
            },
        )
    }

    pub fn search_users(&self, query: &str) -> ApiResult {
        self.get("/users", &[("search", query.to_string())])
    }

    // -----------------------------------------------------------------------
    // Verb helpers
    // -----------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.config.base_url())
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> ApiResult {
        let url = format!("{}{}", self.url(path), query_string(query));
        self.execute(HttpRequest::new(HttpMethod::Get, url))
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult {
        self.send_form(HttpMethod::Post, path, body)
    }

    fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult {
        self.send_form(HttpMethod::Put, path, body)
    }

    fn send_form<B: Serialize + ?Sized>(&self, method: HttpMethod, path: &str, body: &B) -> ApiResult {
        let body = serde_urlencoded::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let request = HttpRequest::new(method, self.url(path))
            .with_header("Content-Type", FORM_CONTENT_TYPE)
            .with_body(body.into_bytes());
        self.execute(request)
    }

    fn upload(&self, path: &str, form: EncodedForm) -> ApiResult {
        let request = HttpRequest::new(HttpMethod::Post, self.url(path))
            .with_header("Content-Type", form.content_type)
            .with_body(form.body);
        self.execute(request)
    }

    // -----------------------------------------------------------------------
    // Executor
    // -----------------------------------------------------------------------

    /// Authenticate and send `request`, then decode the JSON response.
    ///
    /// The request's own headers override the defaults, except
    /// `PRIVATE-TOKEN`, which always carries the configured token. Failures
    /// are logged at `error` level with the method and URL and returned.
    pub fn execute(&self, request: HttpRequest) -> ApiResult {
        let request = self.authorize(request);
        debug!(method = %request.method, url = %request.url, "sending request");

        let response = match self.transport.execute(&request) {
            Ok(response) => response,
            Err(err) => {
                error!(method = %request.method, url = %request.url, error = %err, "request failed");
                return Err(ApiError::Transport {
                    method: request.method,
                    url: request.url,
                    message: err.message,
                });
            }
        };

        check_status(&request, &response)?;
        decode(request, response)
    }

    fn authorize(&self, mut request: HttpRequest) -> HttpRequest {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        for (name, value) in request.headers.drain(..) {
            set_header(&mut headers, name, value);
        }
        set_header(
            &mut headers,
            PRIVATE_TOKEN_HEADER.to_string(),
            self.config.token().to_string(),
        );
        request.headers = headers;
        request
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(request: &HttpRequest, response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    error!(
        method = %request.method,
        url = %request.url,
        status = response.status,
        body = %response.body,
        "request failed"
    );
    if response.status == 404 {
        return Err(ApiError::NotFound {
            method: request.method,
            url: request.url.clone(),
            body: response.body.clone(),
        });
    }
    Err(ApiError::Http {
        method: request.method,
        url: request.url.clone(),
        status: response.status,
        body: response.body.clone(),
    })
}

/// An empty 2xx body decodes as `null`.
fn decode(request: HttpRequest, response: HttpResponse) -> ApiResult {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| {
        error!(method = %request.method, url = %request.url, error = %e, "response is not valid JSON");
        ApiError::Decode {
            method: request.method,
            url: request.url,
            message: e.to_string(),
        }
    })
}

/// Percent-encode an identifier so it stays a single path segment.
fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn query_string(params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect();
    format!("?{}", pairs.join("&"))
}
