use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Path as AxumPath, http::StatusCode, routing::{get, post}, Extension, Router};
use serde_json::{json, Value};

use dataset_ingestion::clients::{ContainerSupervisor, ReloadCoordinator};
use dataset_ingestion::config::{Config, ReloadMode};
use dataset_ingestion::pipeline::IngestionEngine;
use dataset_ingestion::server::{build_router, ADMIN_PASSWORD_HEADER};

const SECRET: &str = "fs-admin";
const VALID: &str = "Area,Year,Item,Value,Unit\nKenya,2020,Cereal,1.5,t\nChad,2019-2021,Cereal,2,t\n";

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

fn config_in(dir: &std::path::Path) -> Config {
    Config {
        active_dataset_path: dir.join("FS_selection.csv"),
        backup_dir: dir.join("backups"),
        admin_password: SECRET.to_string(),
        reload_mode: ReloadMode::Manual,
        container_marker: dir.join("no-dockerenv"),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_rest_upload_status_codes() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    let base = spawn(build_router(IngestionEngine::new(&cfg), &cfg)).await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/dataset?filename=FS_selection.csv", base);

    let res = client.post(&url).header(ADMIN_PASSWORD_HEADER, "nope").body(VALID).send().await.unwrap();
    assert_eq!(res.status().as_u16(), StatusCode::UNAUTHORIZED.as_u16());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["rejection"], json!("Unauthorized"));

    let res = client
        .post(&url)
        .header(ADMIN_PASSWORD_HEADER, SECRET)
        .body("Area,Year\nKenya,2020\n")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), StatusCode::UNPROCESSABLE_ENTITY.as_u16());

    let res = client
        .post(&url)
        .header(ADMIN_PASSWORD_HEADER, SECRET)
        .header("content-type", "text/csv")
        .body(VALID)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["stage"], json!("Done"));
    assert_eq!(body["rows"], json!(2));
    assert!(cfg.active_dataset_path.is_file());
}

#[tokio::test]
async fn test_status_and_health_routes() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    std::fs::write(&cfg.active_dataset_path, VALID).unwrap();
    let base = spawn(build_router(IngestionEngine::new(&cfg), &cfg)).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "OK");

    let status: Value = client
        .get(format!("{}/admin/dataset/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["exists"], json!(true));
    assert_eq!(status["rows"], json!(2));
    assert_eq!(status["columns"], json!(5));
    assert_eq!(status["environment"], json!("Local"));
}

#[tokio::test]
async fn test_graphql_upload_dataset() {
    use base64::Engine as _;

    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    let base = spawn(build_router(IngestionEngine::new(&cfg), &cfg)).await;
    let contents = format!(
        "data:text/csv;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(VALID)
    );
    let query = json!({
        "query": "mutation($f: String!, $c: String!, $p: String!) { uploadDataset(filename: $f, contents: $c, password: $p) { success message rows backup } }",
        "variables": { "f": "FS_selection.csv", "c": contents, "p": SECRET }
    });

    let res: Value = reqwest::Client::new()
        .post(format!("{}/graphql", base))
        .json(&query)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let upload = &res["data"]["uploadDataset"];
    assert_eq!(upload["success"], json!(true), "{}", res);
    assert_eq!(upload["message"], json!("Upload Successful!"));
    assert_eq!(upload["rows"], json!(2));
    assert_eq!(upload["backup"], json!("No existing file to backup"));

    let res: Value = reqwest::Client::new()
        .post(format!("{}/graphql", base))
        .json(&json!({ "query": "{ datasetStatus { exists rows backupCount } }" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(res["data"]["datasetStatus"]["rows"], json!(2));
    assert_eq!(res["data"]["datasetStatus"]["backupCount"], json!(0));
}

#[derive(Default)]
struct FakeDocker {
    inspected: AtomicUsize,
    restarted: AtomicUsize,
}

#[tokio::test]
async fn test_container_supervisor_requests_restart() {
    let docker = Arc::new(FakeDocker::default());
    let app = Router::new()
        .route(
            "/containers/{name}/json",
            get(|Extension(d): Extension<Arc<FakeDocker>>, AxumPath(name): AxumPath<String>| async move {
                d.inspected.fetch_add(1, Ordering::SeqCst);
                axum::Json(json!({ "Name": format!("/{}", name), "State": { "Running": true } }))
            }),
        )
        .route(
            "/containers/{name}/restart",
            post(|Extension(d): Extension<Arc<FakeDocker>>| async move {
                d.restarted.fetch_add(1, Ordering::SeqCst);
                StatusCode::NO_CONTENT
            }),
        )
        .layer(Extension(docker.clone()));
    let base = spawn(app).await;

    let cfg = Config {
        docker_host: Some(base.replace("http://", "tcp://")),
        container_name: Some("food-security-dashboard".into()),
        reload_grace_ms: 10,
        ..Config::default()
    };
    let supervisor = ContainerSupervisor::from_config(&cfg);
    let status = supervisor.reload().await;
    assert!(status.attempted && status.succeeded, "{:?}", status);
    assert_eq!(docker.inspected.load(Ordering::SeqCst), 1);

    for _ in 0..50 {
        if docker.restarted.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(docker.restarted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_container_supervisor_unknown_container_is_not_attempted() {
    let app = Router::new().route(
        "/containers/{name}/json",
        get(|| async { (StatusCode::NOT_FOUND, axum::Json(json!({ "message": "No such container" }))) }),
    );
    let base = spawn(app).await;

    let cfg = Config {
        docker_host: Some(base),
        container_name: Some("missing".into()),
        ..Config::default()
    };
    let status = ContainerSupervisor::from_config(&cfg).reload().await;
    assert!(!status.attempted);
    assert!(status.message.contains("restart the app manually"), "{}", status.message);
}

#[tokio::test]
async fn test_backups_listed_newest_first_on_both_routes() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    std::fs::write(&cfg.active_dataset_path, VALID).unwrap();
    let base = spawn(build_router(IngestionEngine::new(&cfg), &cfg)).await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/dataset?filename=FS_selection.csv", base);

    for _ in 0..3 {
        let res = client.post(&url).header(ADMIN_PASSWORD_HEADER, SECRET).body(VALID).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
    }

    let rest: Value = client.get(format!("{}/admin/backups", base)).send().await.unwrap().json().await.unwrap();
    let rest_names: Vec<String> = rest
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(rest_names.len(), 3);
    assert!(rest_names[0] > rest_names[1] && rest_names[1] > rest_names[2], "{:?}", rest_names);

    let gql: Value = client
        .post(format!("{}/graphql", base))
        .json(&json!({ "query": "{ backups { name createdAt } }" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let gql_backups = gql["data"]["backups"].as_array().unwrap();
    let gql_names: Vec<String> = gql_backups
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(gql_names, rest_names);
    // DateTime scalar, RFC 3339 text
    let created = gql_backups[0]["createdAt"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(created).is_ok(), "{}", created);
}

#[tokio::test]
async fn test_graphql_dataset_status_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    std::fs::write(&cfg.active_dataset_path, VALID).unwrap();
    let base = spawn(build_router(IngestionEngine::new(&cfg), &cfg)).await;

    let res: Value = reqwest::Client::new()
        .post(format!("{}/graphql", base))
        .json(&json!({ "query": "{ datasetStatus { modifiedAt } }" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let modified = res["data"]["datasetStatus"]["modifiedAt"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(modified).is_ok(), "{}", modified);
}

#[tokio::test]
async fn test_graphql_body_is_capped() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config { max_upload_mb: 1, ..config_in(dir.path()) };
    let base = spawn(build_router(IngestionEngine::new(&cfg), &cfg)).await;

    // 3 MB of base64 text is well past the encoded size of a 1 MB upload
    let contents = "A".repeat(3 * 1024 * 1024);
    let query = json!({
        "query": "mutation($c: String!) { uploadDataset(filename: \"big.csv\", contents: $c, password: \"fs-admin\") { success } }",
        "variables": { "c": contents }
    });
    let res = reqwest::Client::new()
        .post(format!("{}/graphql", base))
        .json(&query)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), StatusCode::PAYLOAD_TOO_LARGE.as_u16());
    assert!(!cfg.active_dataset_path.exists());
}

/// Answers Docker Engine API calls on a unix socket, counting inspect and restart requests.
#[cfg(unix)]
async fn spawn_docker_socket(path: std::path::PathBuf, docker: Arc<FakeDocker>) {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let docker = docker.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                reader.read_line(&mut request_line).await.unwrap();
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).await.unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }
                let response = if request_line.starts_with("GET /containers/dashboard/json ") {
                    docker.inspected.fetch_add(1, Ordering::SeqCst);
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}"
                } else if request_line.starts_with("POST /containers/dashboard/restart ") {
                    docker.restarted.fetch_add(1, Ordering::SeqCst);
                    "HTTP/1.1 204 No Content\r\n\r\n"
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"
                };
                let mut stream = reader.into_inner();
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            });
        }
    });
}

#[cfg(unix)]
#[tokio::test]
async fn test_container_supervisor_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("docker.sock");
    let docker = Arc::new(FakeDocker::default());
    spawn_docker_socket(socket.clone(), docker.clone()).await;

    let cfg = Config {
        docker_host: Some(format!("unix://{}", socket.display())),
        container_name: Some("dashboard".into()),
        reload_grace_ms: 10,
        ..Config::default()
    };
    let status = ContainerSupervisor::from_config(&cfg).reload().await;
    assert!(status.attempted && status.succeeded, "{:?}", status);
    assert_eq!(docker.inspected.load(Ordering::SeqCst), 1);

    for _ in 0..50 {
        if docker.restarted.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(docker.restarted.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_unknown_container_is_not_attempted() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("docker.sock");
    spawn_docker_socket(socket.clone(), Arc::new(FakeDocker::default())).await;

    let cfg = Config {
        docker_host: Some(format!("unix://{}", socket.display())),
        container_name: Some("other".into()),
        ..Config::default()
    };
    let status = ContainerSupervisor::from_config(&cfg).reload().await;
    assert!(!status.attempted);
    assert!(status.message.contains("404"), "{}", status.message);
}
