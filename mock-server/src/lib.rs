//! In-memory stand-in for the slice of the GitLab v4 API that `gitlab-core`
//! calls. Every route lives under `/api/v4` and requires the configured
//! `PRIVATE-TOKEN`.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEFAULT_TOKEN: &str = "test-token";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Namespace {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub kind: String,
    pub full_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub state: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub full_path: String,
    pub visibility: String,
    pub project_creation_level: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub access_level: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    pub visibility: String,
    pub namespace: Namespace,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimeStats {
    pub time_estimate: u64,
    pub total_time_spent: u64,
    pub human_time_estimate: Option<String>,
    pub human_total_time_spent: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: u64,
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub labels: Vec<String>,
    pub time_stats: TimeStats,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub id: u64,
    pub name: String,
    pub color: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: u64,
    pub body: String,
    pub created_at: String,
    pub noteable_iid: u64,
    pub noteable_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Upload {
    pub id: u64,
    pub alt: String,
    pub url: String,
    pub full_path: String,
    pub markdown: String,
}

#[derive(Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub path: String,
    #[serde(default = "private")]
    pub visibility: String,
    #[serde(default = "developer")]
    pub project_creation_level: String,
}

#[derive(Deserialize)]
pub struct AddMember {
    pub user_id: u64,
    pub access_level: u8,
}

#[derive(Deserialize)]
pub struct CreateProject {
    pub path: String,
    pub namespace_id: u64,
    #[serde(default = "private")]
    pub visibility: String,
}

#[derive(Deserialize)]
pub struct SpentTime {
    pub duration: String,
}

#[derive(Deserialize)]
pub struct CreateNote {
    pub body: String,
    pub created_at: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

fn private() -> String {
    "private".to_string()
}

fn developer() -> String {
    "developer".to_string()
}

/// Everything the server knows. Groups and users own namespaces; a group
/// shares its ID with its namespace, as on GitLab.
#[derive(Debug, Default)]
pub struct Store {
    next_id: u64,
    pub users: Vec<User>,
    pub namespaces: Vec<Namespace>,
    pub groups: Vec<Group>,
    pub members: Vec<(u64, Member)>,
    pub projects: Vec<Project>,
    pub issues: Vec<Issue>,
    pub labels: Vec<(u64, Label)>,
    pub notes: Vec<(u64, Note)>,
    pub uploads: Vec<(u64, Upload, Vec<u8>)>,
}

impl Store {
    /// Seeded with `root`, `alice` and `bob` and their user namespaces.
    pub fn seeded() -> Self {
        let mut store = Store::default();
        for (username, name) in [("root", "Administrator"), ("alice", "Alice Liddell"), ("bob", "Bob Builder")] {
            let id = store.allocate_id();
            store.users.push(User {
                id,
                username: username.to_string(),
                name: name.to_string(),
                state: "active".to_string(),
            });
            let namespace_id = store.allocate_id();
            store.namespaces.push(Namespace {
                id: namespace_id,
                name: name.to_string(),
                path: username.to_string(),
                kind: "user".to_string(),
                full_path: username.to_string(),
            });
        }
        store
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn group(&self, key: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| g.full_path == key || g.id.to_string() == key)
    }

    fn namespace(&self, key: &str) -> Option<&Namespace> {
        self.namespaces
            .iter()
            .find(|n| n.full_path == key || n.id.to_string() == key)
    }

    fn project(&self, id: u64) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    fn ensure_label(&mut self, project_id: u64, name: &str) {
        if self.labels.iter().any(|(p, l)| *p == project_id && l.name == name) {
            return;
        }
        let id = self.allocate_id();
        self.labels.push((
            project_id,
            Label {
                id,
                name: name.to_string(),
                color: "#6699cc".to_string(),
            },
        ));
    }
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    token: Arc<str>,
}

type ApiError = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: impl Into<Value>) -> ApiError {
    (status, Json(json!({ "message": message.into() })))
}

fn not_found(what: &str) -> ApiError {
    error(StatusCode::NOT_FOUND, format!("404 {what} Not Found"))
}

fn bad_request(message: impl Into<Value>) -> ApiError {
    error(StatusCode::BAD_REQUEST, message)
}

/// Router accepting `DEFAULT_TOKEN`.
pub fn app() -> Router {
    app_with_token(DEFAULT_TOKEN)
}

pub fn app_with_token(token: &str) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(Store::seeded())),
        token: Arc::from(token),
    };
    router(state)
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/groups", post(create_group))
        .route("/groups/{group}", get(get_group))
        .route("/groups/{group}/members", post(add_group_member))
        .route("/groups/{group}/projects", get(group_projects))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}/issues", get(list_issues).post(create_issue))
        .route("/projects/{id}/issues/{iid}", put(update_issue))
        .route("/projects/{id}/issues/{iid}/add_spent_time", post(add_spent_time))
        .route("/projects/{id}/issues/{iid}/notes", post(create_note))
        .route("/projects/{id}/labels", get(list_labels))
        .route("/projects/{id}/uploads", post(upload))
        .route("/namespaces/{name}", get(get_namespace))
        .route("/users", get(search_users))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state);
    Router::new().nest("/api/v4", api)
}

pub async fn run(listener: TcpListener, token: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_token(token)).await
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get("private-token")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == &*state.token);
    if !authorized {
        tracing::warn!(uri = %request.uri(), "rejected request without valid token");
        return error(StatusCode::UNAUTHORIZED, "401 Unauthorized").into_response();
    }
    next.run(request).await
}

/// Apply `page`/`per_page` and GitLab's `x-*` pagination headers.
fn paginate<T: Serialize>(items: Vec<T>, params: &ListParams) -> impl IntoResponse {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
    let total = items.len();
    let slice: Vec<T> = items.into_iter().skip((page - 1) * per_page).take(per_page).collect();
    (
        [
            ("x-total", total.to_string()),
            ("x-page", page.to_string()),
            ("x-per-page", per_page.to_string()),
        ],
        Json(slice),
    )
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// --- groups ---

async fn get_group(State(state): State<AppState>, Path(group): Path<String>) -> Result<Json<Group>, ApiError> {
    let db = state.db.read().await;
    db.group(&group).cloned().map(Json).ok_or_else(|| not_found("Group"))
}

async fn create_group(
    State(state): State<AppState>,
    Form(input): Form<CreateGroup>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let mut db = state.db.write().await;
    if db.namespaces.iter().any(|n| n.full_path == input.path) {
        return Err(bad_request(json!({ "path": ["has already been taken"] })));
    }
    let id = db.allocate_id();
    let group = Group {
        id,
        name: input.name.clone(),
        path: input.path.clone(),
        full_path: input.path.clone(),
        visibility: input.visibility,
        project_creation_level: input.project_creation_level,
    };
    db.namespaces.push(Namespace {
        id,
        name: input.name,
        path: input.path.clone(),
        kind: "group".to_string(),
        full_path: input.path,
    });
    db.groups.push(group.clone());
    Ok((StatusCode::CREATED, Json(group)))
}

async fn add_group_member(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Form(input): Form<AddMember>,
) -> Result<(StatusCode, Json<Member>), ApiError> {
    let mut db = state.db.write().await;
    let group_id = db.group(&group).map(|g| g.id).ok_or_else(|| not_found("Group"))?;
    if ![10, 20, 30, 40, 50].contains(&input.access_level) {
        return Err(bad_request("access_level does not have a valid value"));
    }
    let user = db
        .users
        .iter()
        .find(|u| u.id == input.user_id)
        .cloned()
        .ok_or_else(|| not_found("User"))?;
    if db.members.iter().any(|(g, m)| *g == group_id && m.id == user.id) {
        return Err(error(StatusCode::CONFLICT, "Member already exists"));
    }
    let member = Member {
        id: user.id,
        username: user.username,
        name: user.name,
        access_level: input.access_level,
    };
    db.members.push((group_id, member.clone()));
    Ok((StatusCode::CREATED, Json(member)))
}

async fn group_projects(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.read().await;
    let group_id = db.group(&group).map(|g| g.id).ok_or_else(|| not_found("Group"))?;
    let projects: Vec<Project> = db
        .projects
        .iter()
        .filter(|p| p.namespace.id == group_id)
        .filter(|p| params.search.as_deref().map_or(true, |s| contains_ci(&p.name, s) || contains_ci(&p.path, s)))
        .cloned()
        .collect();
    Ok(paginate(projects, &params))
}

// --- projects ---

async fn list_projects(State(state): State<AppState>, Query(params): Query<ListParams>) -> impl IntoResponse {
    let db = state.db.read().await;
    let projects: Vec<Project> = db
        .projects
        .iter()
        .filter(|p| params.search.as_deref().map_or(true, |s| contains_ci(&p.name, s)))
        .cloned()
        .collect();
    paginate(projects, &params)
}

async fn create_project(
    State(state): State<AppState>,
    Form(input): Form<CreateProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let mut db = state.db.write().await;
    let namespace = db
        .namespaces
        .iter()
        .find(|n| n.id == input.namespace_id)
        .cloned()
        .ok_or_else(|| not_found("Namespace"))?;
    let path_with_namespace = format!("{}/{}", namespace.full_path, input.path);
    if db.projects.iter().any(|p| p.path_with_namespace == path_with_namespace) {
        return Err(bad_request(json!({ "path": ["has already been taken"] })));
    }
    let project = Project {
        id: db.allocate_id(),
        name: input.path.clone(),
        path: input.path,
        path_with_namespace,
        visibility: input.visibility,
        namespace,
    };
    db.projects.push(project.clone());
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_labels(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Vec<Label>>, ApiError> {
    let db = state.db.read().await;
    db.project(id).ok_or_else(|| not_found("Project"))?;
    let labels = db
        .labels
        .iter()
        .filter(|(p, _)| *p == id)
        .map(|(_, l)| l.clone())
        .collect();
    Ok(Json(labels))
}

async fn upload(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Upload>), ApiError> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("file").to_string();
        let data = field.bytes().await.map_err(|e| bad_request(e.body_text()))?;
        file = Some((filename, data.to_vec()));
    }
    let (filename, data) = file.ok_or_else(|| bad_request("file is missing"))?;

    let mut db = state.db.write().await;
    let project = db.project(id).cloned().ok_or_else(|| not_found("Project"))?;
    let secret = Uuid::new_v4().simple().to_string();
    let url = format!("/uploads/{secret}/{filename}");
    let image = [".png", ".jpg", ".jpeg", ".gif"].iter().any(|ext| filename.ends_with(ext));
    let markdown = if image {
        format!("![{filename}]({url})")
    } else {
        format!("[{filename}]({url})")
    };
    let upload = Upload {
        id: db.allocate_id(),
        alt: filename,
        full_path: format!("/{}{url}", project.path_with_namespace),
        url,
        markdown,
    };
    db.uploads.push((id, upload.clone(), data));
    Ok((StatusCode::CREATED, Json(upload)))
}

// --- issues ---

async fn list_issues(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.read().await;
    db.project(id).ok_or_else(|| not_found("Project"))?;
    let issues: Vec<Issue> = db
        .issues
        .iter()
        .rev()
        .filter(|i| i.project_id == id)
        .filter(|i| {
            params.search.as_deref().map_or(true, |s| {
                contains_ci(&i.title, s) || i.description.as_deref().is_some_and(|d| contains_ci(d, s))
            })
        })
        .cloned()
        .collect();
    Ok(paginate(issues, &params))
}

/// Issue attributes read from form pairs. Unknown keys are ignored.
#[derive(Debug, Default, PartialEq)]
pub struct IssueForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub labels: Option<Vec<String>>,
    pub state_event: Option<String>,
}

impl IssueForm {
    /// `labels` may be one comma-separated value or repeated as `labels[]`.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = IssueForm::default();
        for (key, value) in pairs {
            match key.as_str() {
                "title" => form.title = Some(value),
                "description" => form.description = Some(value),
                "state_event" => form.state_event = Some(value),
                "labels" => form.labels.get_or_insert_with(Vec::new).extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                ),
                "labels[]" => form.labels.get_or_insert_with(Vec::new).push(value),
                _ => {}
            }
        }
        form
    }
}

async fn create_issue(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<(StatusCode, Json<Issue>), ApiError> {
    let fields = IssueForm::from_pairs(pairs);
    let title = fields
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| bad_request("title is missing"))?;

    let mut db = state.db.write().await;
    db.project(id).ok_or_else(|| not_found("Project"))?;
    let labels = fields.labels.unwrap_or_default();
    for label in &labels {
        db.ensure_label(id, label);
    }
    let iid = db.issues.iter().filter(|i| i.project_id == id).count() as u64 + 1;
    let issue = Issue {
        id: db.allocate_id(),
        iid,
        project_id: id,
        title,
        description: fields.description,
        state: "opened".to_string(),
        labels,
        time_stats: TimeStats {
            time_estimate: 0,
            total_time_spent: 0,
            human_time_estimate: None,
            human_total_time_spent: None,
        },
    };
    db.issues.push(issue.clone());
    Ok((StatusCode::CREATED, Json(issue)))
}

async fn update_issue(
    State(state): State<AppState>,
    Path((id, iid)): Path<(u64, u64)>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Json<Issue>, ApiError> {
    let fields = IssueForm::from_pairs(pairs);
    let mut db = state.db.write().await;
    let labels = fields.labels;
    if let Some(labels) = &labels {
        for label in labels {
            db.ensure_label(id, label);
        }
    }
    let issue = db
        .issues
        .iter_mut()
        .find(|i| i.project_id == id && i.iid == iid)
        .ok_or_else(|| not_found("Issue"))?;
    if let Some(title) = fields.title {
        issue.title = title;
    }
    if let Some(description) = fields.description {
        issue.description = Some(description);
    }
    if let Some(labels) = labels {
        issue.labels = labels;
    }
    match fields.state_event.as_deref() {
        Some("close") => issue.state = "closed".to_string(),
        Some("reopen") => issue.state = "opened".to_string(),
        _ => {}
    }
    Ok(Json(issue.clone()))
}

/// Seconds in a GitLab duration such as `1w 2d 3h 30m`. A day is 8 hours,
/// a week 5 days and a month 4 weeks.
pub fn parse_duration(input: &str) -> Option<u64> {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 8 * HOUR;
    const WEEK: u64 = 5 * DAY;
    const MONTH: u64 = 4 * WEEK;

    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let mut total = 0;
    let mut rest = compact.as_str();
    while !rest.is_empty() {
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let (unit, len) = if rest.starts_with("mo") {
            (MONTH, 2)
        } else {
            match rest.chars().next()? {
                'w' => (WEEK, 1),
                'd' => (DAY, 1),
                'h' => (HOUR, 1),
                'm' => (MINUTE, 1),
                's' => (1, 1),
                _ => return None,
            }
        };
        total += amount * unit;
        rest = &rest[len..];
    }
    Some(total)
}

fn human_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

async fn add_spent_time(
    State(state): State<AppState>,
    Path((id, iid)): Path<(u64, u64)>,
    Form(input): Form<SpentTime>,
) -> Result<(StatusCode, Json<TimeStats>), ApiError> {
    let seconds = parse_duration(&input.duration).ok_or_else(|| bad_request("Invalid duration"))?;
    let mut db = state.db.write().await;
    let issue = db
        .issues
        .iter_mut()
        .find(|i| i.project_id == id && i.iid == iid)
        .ok_or_else(|| not_found("Issue"))?;
    issue.time_stats.total_time_spent += seconds;
    issue.time_stats.human_total_time_spent = Some(human_duration(issue.time_stats.total_time_spent));
    Ok((StatusCode::CREATED, Json(issue.time_stats.clone())))
}

async fn create_note(
    State(state): State<AppState>,
    Path((id, iid)): Path<(u64, u64)>,
    Form(input): Form<CreateNote>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let mut db = state.db.write().await;
    if !db.issues.iter().any(|i| i.project_id == id && i.iid == iid) {
        return Err(not_found("Issue"));
    }
    let note = Note {
        id: db.allocate_id(),
        body: input.body,
        created_at: input.created_at.unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string()),
        noteable_iid: iid,
        noteable_type: "Issue".to_string(),
    };
    db.notes.push((id, note.clone()));
    Ok((StatusCode::CREATED, Json(note)))
}

// --- namespaces and users ---

async fn get_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Namespace>, ApiError> {
    let db = state.db.read().await;
    db.namespace(&name).cloned().map(Json).ok_or_else(|| not_found("Namespace"))
}

async fn search_users(State(state): State<AppState>, Query(params): Query<ListParams>) -> impl IntoResponse {
    let db = state.db.read().await;
    let users: Vec<User> = db
        .users
        .iter()
        .filter(|u| {
            params
                .search
                .as_deref()
                .map_or(true, |s| contains_ci(&u.username, s) || contains_ci(&u.name, s))
        })
        .cloned()
        .collect();
    paginate(users, &params)
}
