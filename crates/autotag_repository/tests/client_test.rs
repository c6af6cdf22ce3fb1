//! Contract tests for RestRepository against a mocked repository API.

use autotag_repository::{Repository, RepositoryConfig, RepositoryError, RestRepository};
use wiremock::matchers::{basic_auth, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PREFIX: &str = "/alfresco/api/-default-/public/alfresco/versions/1";

fn test_client(server: &MockServer, page_size: u32) -> RestRepository {
    let config = RepositoryConfig::new(&server.uri(), "svc", "pw")
        .unwrap()
        .with_timeout_secs(5)
        .with_page_size(page_size);
    RestRepository::new(config).unwrap()
}

fn child(id: &str, name: &str, folder: bool) -> serde_json::Value {
    serde_json::json!({ "entry": { "id": id, "name": name, "isFolder": folder, "isFile": !folder } })
}

#[tokio::test]
async fn list_children_follows_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{PREFIX}/nodes/-root-/children")))
        .and(query_param("skipCount", "0"))
        .and(basic_auth("svc", "pw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "list": {
                "pagination": { "count": 2, "hasMoreItems": true, "skipCount": 0, "maxItems": 2 },
                "entries": [child("a", "Courses", true), child("b", "readme.txt", false)]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{PREFIX}/nodes/-root-/children")))
        .and(query_param("skipCount", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "list": {
                "pagination": { "count": 1, "hasMoreItems": false, "skipCount": 2, "maxItems": 2 },
                "entries": [child("c", "RULE_BASED_TAGS", true)]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let children = test_client(&server, 2).list_children("-root-").await.unwrap();
    let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Courses", "readme.txt", "RULE_BASED_TAGS"]);
    assert!(children[0].is_folder);
    assert!(!children[1].is_folder);
}

#[tokio::test]
async fn download_streams_to_file() {
    let server = MockServer::start().await;
    let payload = vec![7u8; 64 * 1024];

    Mock::given(method("GET"))
        .and(path(format!("{PREFIX}/nodes/zip-1/content")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("course.zip");
    let written = test_client(&server, 100)
        .download_content("zip-1", &target)
        .await
        .unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), payload);
}

#[tokio::test]
async fn download_missing_binary_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{PREFIX}/nodes/missing/content")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = test_client(&server, 100)
        .download_content("missing", &dir.path().join("x.zip"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.kind().is_transient());
}

#[tokio::test]
async fn create_folder_returns_new_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{PREFIX}/nodes/parent-1/children")))
        .and(body_json(serde_json::json!({ "name": "course", "nodeType": "cm:folder" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "entry": { "id": "folder-9", "name": "course", "isFolder": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = test_client(&server, 100)
        .create_folder("parent-1", "course")
        .await
        .unwrap();
    assert_eq!(id, "folder-9");
}

#[tokio::test]
async fn upload_file_posts_multipart() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{PREFIX}/nodes/folder-9/children")))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "entry": { "id": "file-1", "name": "index.html", "isFile": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("index.html");
    std::fs::write(&local, "<html></html>").unwrap();

    let id = test_client(&server, 100)
        .upload_file("folder-9", &local, "index.html")
        .await
        .unwrap();
    assert_eq!(id, "file-1");

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"filedata\""));
    assert!(body.contains("<html></html>"));
    assert!(body.contains("autoRename"));
}

#[tokio::test]
async fn tags_list_and_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{PREFIX}/nodes/n-1/tags")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "list": { "entries": [ { "entry": { "tag": "ecm", "id": "t1" } } ] }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{PREFIX}/nodes/n-1/tags")))
        .and(body_json(serde_json::json!({ "tag": "ECM" })))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate"))
        .mount(&server)
        .await;

    let client = test_client(&server, 100);
    assert_eq!(client.list_tags("n-1").await.unwrap(), vec!["ecm".to_string()]);

    let err = client.add_tag("n-1", "ECM").await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn server_error_is_transient_and_bad_request_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{PREFIX}/nodes/n-2/tags")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{PREFIX}/nodes/n-3/tags")))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad tag"))
        .mount(&server)
        .await;

    let client = test_client(&server, 100);

    let err = client.add_tag("n-2", "x").await.unwrap_err();
    assert!(err.kind().is_transient());

    let err = client.add_tag("n-3", "x").await.unwrap_err();
    assert!(!err.kind().is_transient());
    match err {
        RepositoryError::Status { status, body, .. } => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad tag");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
