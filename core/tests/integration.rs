//! Full lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then exercises every client
//! operation over real HTTP through the default `UreqTransport`. Validates
//! that URL construction, parameter placement, authentication and multipart
//! encoding are accepted by an actual server.

use chrono::DateTime;
use gitlab_core::{
    AccessLevel, ApiError, ErrorKind, GitlabClient, HttpMethod, HttpRequest, IssueFields, Pagination, Transport,
    UreqTransport, PRIVATE_TOKEN_HEADER,
};
use serde_json::json;

/// Start the mock server on a random port and return its base URL.
fn start_server(token: &'static str) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, token).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn fields(value: serde_json::Value) -> IssueFields {
    value.as_object().cloned().unwrap()
}

#[test]
fn group_project_issue_lifecycle() {
    // Step 1: start mock server.
    let base_url = start_server(mock_server::DEFAULT_TOKEN);
    let client = GitlabClient::new(&base_url, mock_server::DEFAULT_TOKEN);

    // Step 2: group does not exist yet.
    let err = client.get_group("platform/tools").unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));

    // Step 3: create the group and fetch it back by path and by id.
    let group = client.create_group("Platform", "platform").unwrap();
    assert_eq!(group["visibility"], "private");
    assert_eq!(group["project_creation_level"], "developer");
    let group_id = group["id"].as_u64().unwrap();
    assert_eq!(client.get_group("platform").unwrap(), group);
    assert_eq!(client.get_group(&group_id.to_string()).unwrap(), group);

    // Step 4: find a user and make them owner.
    let users = client.search_users("alice").unwrap();
    assert_eq!(users.as_array().unwrap().len(), 1);
    let alice_id = users[0]["id"].as_u64().unwrap();
    let member = client
        .add_group_member("platform", alice_id, AccessLevel::Owner)
        .unwrap();
    assert_eq!(member["access_level"], 50);

    // Step 5: adding the same member again is a 409 with the body preserved.
    let err = client
        .add_group_member("platform", alice_id, AccessLevel::Owner)
        .unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert!(err.body().unwrap().contains("Member already exists"));

    // Step 6: resolve the namespace and create a project in it.
    let namespace = client.get_namespace("platform").unwrap();
    assert_eq!(namespace["id"].as_u64(), Some(group_id));
    let project = client.create_project(group_id, "tracker").unwrap();
    assert_eq!(project["visibility"], "private");
    assert_eq!(project["path_with_namespace"], "platform/tracker");
    let project_id = project["id"].as_u64().unwrap();

    let found = client.find_group_project("platform", "track").unwrap();
    assert_eq!(found[0]["id"].as_u64(), Some(project_id));
    let projects = client.list_projects(None).unwrap();
    assert!(projects.as_array().unwrap().iter().any(|p| p["id"].as_u64() == Some(project_id)));

    // Step 7: create issues.
    let issue = client
        .create_issue(
            project_id,
            &fields(json!({"title": "Login fails", "description": "500 on submit", "labels": ["bug", "auth"]})),
        )
        .unwrap();
    assert_eq!(issue["iid"], 1);
    for n in 2..=3 {
        client
            .create_issue(project_id, &fields(json!({"title": format!("Chore {n}")})))
            .unwrap();
    }

    // Step 8: listing defaults to page 1, and explicit pages work.
    let page = client.list_issues(project_id, None).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 3);
    let page = client.list_issues(project_id, Some(Pagination::new(2, 2))).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 1);

    // Step 9: search by title.
    let hits = client.find_issue(project_id, "login").unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["title"], "Login fails");

    // Step 10: labels were created with the issue.
    let labels = client.list_labels(project_id).unwrap();
    let mut names: Vec<&str> = labels
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["name"].as_str().unwrap())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["auth", "bug"]);

    // Step 11: update, track time, comment.
    let updated = client
        .update_issue(project_id, 1, &fields(json!({"state_event": "close"})))
        .unwrap();
    assert_eq!(updated["state"], "closed");

    let stats = client.add_time_spent(project_id, 1, "1h30m").unwrap();
    assert_eq!(stats["total_time_spent"], 5400);

    let at = DateTime::parse_from_rfc3339("2024-02-29T08:00:00+02:00").unwrap();
    let note = client
        .create_issue_comment(project_id, 1, "Fixed in !12", Some(at))
        .unwrap();
    assert_eq!(note["body"], "Fixed in !12");
    assert_eq!(note["created_at"], "2024-02-29T08:00:00+02:00");

    let note = client.create_issue_comment(project_id, 1, "Verified", None).unwrap();
    assert!(DateTime::parse_from_rfc3339(note["created_at"].as_str().unwrap()).is_ok());

    // Step 12: upload an attachment.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.log");
    std::fs::write(&path, b"panic at line 3\n").unwrap();
    let upload = client.upload_attachment(project_id, &path).unwrap();
    assert_eq!(upload["alt"], "trace.log");
    assert!(upload["url"].as_str().unwrap().ends_with("/trace.log"));

    // Step 13: operations on missing entities are NotFound.
    let err = client.update_issue(project_id, 99, &fields(json!({"title": "x"}))).unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));
    let err = client.add_time_spent(project_id, 1, "whenever").unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[test]
fn wrong_token_is_rejected() {
    let base_url = start_server("right-token");
    let client = GitlabClient::new(&base_url, "wrong-token");

    let err = client.search_users("alice").unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 401, .. }));
}

#[test]
fn unreachable_server_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let client = GitlabClient::new(&format!("http://{addr}"), "t");

    let err = client.list_projects(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    let (_, url) = err.request().unwrap();
    assert_eq!(url, format!("http://{addr}/api/v4/projects?page=1&per_page=20"));
}

#[test]
fn ureq_transport_returns_error_statuses_and_headers_as_data() {
    let base_url = start_server(mock_server::DEFAULT_TOKEN);
    let transport = UreqTransport::new();

    let request = HttpRequest::new(HttpMethod::Get, format!("{base_url}/api/v4/users?per_page=2"))
        .with_header(PRIVATE_TOKEN_HEADER, mock_server::DEFAULT_TOKEN);
    let response = transport.execute(&request).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("X-Total"), Some("3"));
    assert_eq!(response.header("x-per-page"), Some("2"));

    let request = HttpRequest::new(HttpMethod::Get, format!("{base_url}/api/v4/users"));
    let response = transport.execute(&request).unwrap();
    assert_eq!(response.status, 401);
    assert!(response.body.contains("401 Unauthorized"));
}

#[test]
fn form_bodies_reach_the_server_intact() {
    let base_url = start_server(mock_server::DEFAULT_TOKEN);
    let client = GitlabClient::new(&base_url, mock_server::DEFAULT_TOKEN);

    let group = client.create_group("R&D / Ops", "rnd-ops").unwrap();
    assert_eq!(group["name"], "R&D / Ops");
    let project = client.create_project(group["id"].as_u64().unwrap(), "infra").unwrap();
    let project_id = project["id"].as_u64().unwrap();

    let issue = client
        .create_issue(
            project_id,
            &fields(json!({"title": "50% = half + more", "description": "a=b&c=d", "labels": "x, y"})),
        )
        .unwrap();
    assert_eq!(issue["title"], "50% = half + more");
    assert_eq!(issue["description"], "a=b&c=d");
    assert_eq!(issue["labels"], json!(["x", "y"]));
}
