//! Integration tests for depot

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path as UrlPath;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use depot::auth::{Access, Principal};
use depot::repo::engine::{ResolutionEngine, WriteOutcome};
use depot::repo::fetch::set_modified;
use depot::repo::RemoteRepository;

fn engine(root: &std::path::Path, remotes: Vec<RemoteRepository>) -> ResolutionEngine {
    ResolutionEngine::new(root, remotes, 64 * 1024 * 1024, Duration::from_secs(5))
}

fn writer() -> Principal {
    Principal::new("admin", Access::Write)
}

fn reader() -> Principal {
    Principal::new("ci", Access::Read)
}

fn remote(name: &str, addr: SocketAddr) -> RemoteRepository {
    RemoteRepository {
        name: name.to_string(),
        url: format!("http://{}/", addr),
        username: None,
        password: None,
    }
}

/// Spawn a stub mirror that counts hits and answers with the closure result
async fn spawn_mirror<F>(respond: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(String) -> axum::response::Response + Clone + Send + Sync + 'static,
{
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/{*path}",
        get(move |UrlPath(path): UrlPath<String>| {
            let respond = respond.clone();
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                respond(path)
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

mod engine_tests {
    use super::*;

    #[tokio::test]
    async fn release_put_then_get_roundtrips() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        let content = b"release bytes".to_vec();
        let outcome = engine
            .write("com/example/lib/1.0/lib-1.0.jar", &writer(), content.clone())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        let view = engine
            .read("com/example/lib/1.0/lib-1.0.jar", &reader())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.file.content, content);
        assert_eq!(view.content_type, "application/java-archive");

        // ETag is the digest of exactly the served bytes
        let expected = hex::encode(<sha2::Sha256 as sha2::Digest>::digest(&content));
        assert_eq!(view.file.etag(), format!("\"{}\"", expected));
    }

    #[tokio::test]
    async fn release_files_are_write_once() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        let path = "com/example/lib/1.0/lib-1.0.jar";
        engine.write(path, &writer(), b"first".to_vec()).await.unwrap();
        let err = engine
            .write(path, &writer(), b"second".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, depot::DepotError::ReleaseImmutable(_)));

        // original content is untouched
        let view = engine.read(path, &reader()).await.unwrap().unwrap();
        assert_eq!(view.file.content, b"first");
    }

    #[tokio::test]
    async fn snapshot_upload_is_rewritten_with_embedded_timestamp() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        engine
            .write(
                "com/example/mylib/1.0-SNAPSHOT/mylib-1.0-20230615.120000-3.jar",
                &writer(),
                b"snapshot build".to_vec(),
            )
            .await
            .unwrap();

        let stored = storage
            .path()
            .join("local/com/example/mylib/1.0-SNAPSHOT/mylib-1.0-SNAPSHOT.jar");
        assert!(stored.is_file());

        let modified: DateTime<Utc> =
            std::fs::metadata(&stored).unwrap().modified().unwrap().into();
        assert_eq!(modified, "2023-06-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap());

        let view = engine
            .read(
                "com/example/mylib/1.0-SNAPSHOT/mylib-1.0-SNAPSHOT.jar",
                &reader(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.file.content, b"snapshot build");
        assert_eq!(view.file.http_last_modified(), "Thu, 15 Jun 2023 12:00:00 GMT");
    }

    #[tokio::test]
    async fn snapshot_replacement_reports_ok_and_serves_new_bytes() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);
        let upload = "com/example/mylib/1.0-SNAPSHOT/mylib-1.0-20230615.120000-1.jar";
        let serve = "com/example/mylib/1.0-SNAPSHOT/mylib-1.0-SNAPSHOT.jar";

        let first = engine.write(upload, &writer(), b"build one".to_vec()).await.unwrap();
        assert_eq!(first, WriteOutcome::Created);
        assert_eq!(
            engine.read(serve, &reader()).await.unwrap().unwrap().file.content,
            b"build one"
        );

        let upload_two = "com/example/mylib/1.0-SNAPSHOT/mylib-1.0-20230616.090000-2.jar";
        let second = engine.write(upload_two, &writer(), b"build two".to_vec()).await.unwrap();
        assert_eq!(second, WriteOutcome::Replaced);

        // the cache was invalidated, readers observe the replacement
        assert_eq!(
            engine.read(serve, &reader()).await.unwrap().unwrap().file.content,
            b"build two"
        );
    }

    #[tokio::test]
    async fn snapshot_cleanup_prunes_differently_timed_siblings() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);
        let version_dir = storage.path().join("local/com/example/mylib/1.0-SNAPSHOT");
        std::fs::create_dir_all(&version_dir).unwrap();

        let build_time = "2023-06-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        // a leftover from an older build, and a file stamped exactly at the
        // incoming build's time
        let stale = version_dir.join("mylib-1.0-SNAPSHOT-sources.jar");
        std::fs::write(&stale, b"old sources").unwrap();
        set_modified(&stale, "2023-06-01T00:00:00Z".parse().unwrap()).unwrap();

        let current = version_dir.join("mylib-1.0-SNAPSHOT.pom");
        std::fs::write(&current, b"pom").unwrap();
        set_modified(&current, build_time).unwrap();

        engine
            .write(
                "com/example/mylib/1.0-SNAPSHOT/mylib-1.0-20230615.120000-3.jar",
                &writer(),
                b"jar".to_vec(),
            )
            .await
            .unwrap();

        assert!(!stale.exists(), "stale sibling should be pruned");
        assert!(current.exists(), "equal-mtime sibling should survive");
        assert!(version_dir.join("mylib-1.0-SNAPSHOT.jar").exists());
    }

    #[tokio::test]
    async fn non_timestamped_snapshot_upload_skips_cleanup() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);
        let version_dir = storage.path().join("local/com/example/mylib/1.0-SNAPSHOT");
        std::fs::create_dir_all(&version_dir).unwrap();

        let sibling = version_dir.join("mylib-1.0-SNAPSHOT.pom");
        std::fs::write(&sibling, b"pom").unwrap();
        set_modified(&sibling, "2020-01-01T00:00:00Z".parse().unwrap()).unwrap();

        engine
            .write(
                "com/example/mylib/1.0-SNAPSHOT/mylib-1.0-SNAPSHOT.jar",
                &writer(),
                b"jar".to_vec(),
            )
            .await
            .unwrap();

        assert!(sibling.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshot_reads_never_touch_remotes() {
        let storage = TempDir::new().unwrap();
        let (addr, hits) = spawn_mirror(|_| StatusCode::OK.into_response()).await;
        let engine = engine(storage.path(), vec![remote("central", addr)]);

        let missing = engine
            .read("com/example/mylib/1.0-SNAPSHOT/mylib-1.0-SNAPSHOT.jar", &reader())
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn release_fallback_tries_mirrors_in_order_and_short_circuits() {
        let storage = TempDir::new().unwrap();
        let (miss_addr, miss_hits) =
            spawn_mirror(|_| StatusCode::NOT_FOUND.into_response()).await;
        let (hit_addr, hit_hits) =
            spawn_mirror(|_| (StatusCode::OK, b"mirrored".to_vec()).into_response()).await;
        let (unused_addr, unused_hits) =
            spawn_mirror(|_| (StatusCode::OK, b"wrong".to_vec()).into_response()).await;

        let engine = engine(
            storage.path(),
            vec![
                remote("first", miss_addr),
                remote("second", hit_addr),
                remote("third", unused_addr),
            ],
        );

        let view = engine
            .read("com/example/lib/2.0/lib-2.0.jar", &reader())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.file.content, b"mirrored");
        assert_eq!(miss_hits.load(Ordering::SeqCst), 1);
        assert_eq!(hit_hits.load(Ordering::SeqCst), 1);
        assert_eq!(unused_hits.load(Ordering::SeqCst), 0);

        // persisted into the winning mirror's slot
        assert!(storage
            .path()
            .join("second/com/example/lib/2.0/lib-2.0.jar")
            .is_file());

        // a second read is served locally, no further mirror traffic
        engine
            .read("com/example/lib/2.0/lib-2.0.jar", &reader())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(miss_hits.load(Ordering::SeqCst), 1);
        assert_eq!(hit_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fetched_file_takes_last_modified_header() {
        let storage = TempDir::new().unwrap();
        let (addr, _) = spawn_mirror(|_| {
            (
                StatusCode::OK,
                [("Last-Modified", "Thu, 15 Jun 2023 12:00:00 GMT")],
                b"dated".to_vec(),
            )
                .into_response()
        })
        .await;
        let engine = engine(storage.path(), vec![remote("central", addr)]);

        let view = engine
            .read("com/example/lib/3.0/lib-3.0.jar", &reader())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.file.http_last_modified(), "Thu, 15 Jun 2023 12:00:00 GMT");
    }

    #[tokio::test]
    async fn metadata_documents_are_never_served() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        // even a file that exists on disk is refused
        let dir = storage.path().join("local/com/example/mylib");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("maven-metadata.xml"), b"<metadata/>").unwrap();

        let result = engine
            .read("com/example/mylib/maven-metadata.xml", &reader())
            .await
            .unwrap();
        assert!(result.is_none());

        // accepted and discarded on write
        let outcome = engine
            .write(
                "com/example/mylib/maven-metadata.xml",
                &writer(),
                b"<metadata/>".to_vec(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Discarded);
    }

    #[tokio::test]
    async fn traversal_is_a_security_violation_not_a_miss() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        let err = engine.read("../../etc/passwd", &reader()).await.unwrap_err();
        assert!(matches!(err, depot::DepotError::PathSecurity { .. }));
    }

    #[tokio::test]
    async fn unsupported_suffix_is_rejected() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        let err = engine
            .write("com/example/lib/1.0/lib-1.0.exe", &writer(), b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, depot::DepotError::UnsupportedSuffix(_)));
    }

    #[tokio::test]
    async fn access_levels_are_enforced() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        let err = engine
            .write("com/example/lib/1.0/lib-1.0.jar", &reader(), b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, depot::DepotError::AccessDenied { .. }));

        let nobody = Principal::new("nobody", Access::None);
        let err = engine
            .read("com/example/lib/1.0/lib-1.0.jar", &nobody)
            .await
            .unwrap_err();
        assert!(matches!(err, depot::DepotError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn options_reflects_write_access() {
        let storage = TempDir::new().unwrap();
        let engine = engine(storage.path(), vec![]);

        let allowed = engine
            .allowed_methods("com/example/lib/1.0/lib-1.0.jar", &reader())
            .unwrap()
            .unwrap();
        assert_eq!(allowed.header_value(), "OPTIONS, HEAD, GET");

        let allowed = engine
            .allowed_methods("com/example/lib/1.0/lib-1.0.jar", &writer())
            .unwrap()
            .unwrap();
        assert_eq!(allowed.header_value(), "OPTIONS, HEAD, GET, PUT");

        assert!(engine
            .allowed_methods("com/example/mylib/maven-metadata.xml", &reader())
            .unwrap()
            .is_none());
    }
}

mod http_tests {
    use super::*;
    use depot::auth::{basic_header, Authenticator};
    use depot::config::schema::AuthConfig;
    use depot::http::{router, AppState};
    use std::collections::BTreeMap;

    struct Reply {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    async fn spawn_app(storage: &TempDir, default_access: Access) -> SocketAddr {
        let mut users = BTreeMap::new();
        let mut writers = BTreeMap::new();
        writers.insert("admin".to_string(), "hunter2".to_string());
        users.insert(Access::Write, writers);

        let engine = engine(storage.path(), vec![]);
        let state = AppState::new(
            engine,
            Authenticator::new(AuthConfig {
                default_access,
                users,
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        addr
    }

    /// Blocking ureq call moved off the runtime threads
    async fn request(
        method: &'static str,
        url: String,
        authorization: Option<String>,
        body: Option<Vec<u8>>,
    ) -> Reply {
        tokio::task::spawn_blocking(move || {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .new_agent();
            let response = match method {
                "GET" => {
                    let mut request = agent.get(&url);
                    if let Some(header) = &authorization {
                        request = request.header("Authorization", header);
                    }
                    request.call()
                }
                "HEAD" => agent.head(&url).call(),
                "OPTIONS" => {
                    let mut request = agent.options(&url);
                    if let Some(header) = &authorization {
                        request = request.header("Authorization", header);
                    }
                    request.call()
                }
                "PUT" => {
                    let mut request = agent.put(&url);
                    if let Some(header) = &authorization {
                        request = request.header("Authorization", header);
                    }
                    request.send(&body.unwrap_or_default()[..])
                }
                other => panic!("unsupported method {}", other),
            };
            let mut response = response.unwrap();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();
            Reply {
                status: response.status().as_u16(),
                headers,
                body: response.body_mut().read_to_vec().unwrap_or_default(),
            }
        })
        .await
        .unwrap()
    }

    fn header<'a>(reply: &'a Reply, name: &str) -> Option<&'a str> {
        reply
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn header_count(reply: &Reply, name: &str) -> usize {
        reply
            .headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .count()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn put_then_get_over_http() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;
        let url = format!("http://{}/repository/com/example/lib/1.0/lib-1.0.jar", addr);

        let auth = basic_header("admin", "hunter2");
        let put = request("PUT", url.clone(), Some(auth), Some(b"bytes".to_vec())).await;
        assert_eq!(put.status, 201);
        assert_eq!(
            header(&put, "content-location"),
            Some("/repository/com/example/lib/1.0/lib-1.0.jar")
        );

        let get = request("GET", url, None, None).await;
        assert_eq!(get.status, 200);
        assert_eq!(get.body, b"bytes");
        assert_eq!(header(&get, "content-type"), Some("application/java-archive"));
        // the body must not contribute a second Content-Type value
        assert_eq!(header_count(&get, "content-type"), 1);
        assert!(header(&get, "etag").unwrap().starts_with('"'));
        assert!(header(&get, "last-modified").unwrap().ends_with("GMT"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn head_carries_headers_without_body() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;
        let url = format!("http://{}/repository/com/example/lib/1.0/lib-1.0.pom", addr);

        let auth = basic_header("admin", "hunter2");
        request("PUT", url.clone(), Some(auth), Some(b"<project/>".to_vec())).await;

        let head = request("HEAD", url, None, None).await;
        assert_eq!(head.status, 200);
        assert_eq!(header(&head, "content-type"), Some("text/xml"));
        assert_eq!(header_count(&head, "content-type"), 1);
        assert!(head.body.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multi_megabyte_upload_roundtrips() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;
        let url = format!("http://{}/repository/com/example/big/1.0/big-1.0.jar", addr);

        // well past the 2 MB request-body default that would otherwise 413
        let content = vec![7u8; 3 * 1024 * 1024];
        let auth = basic_header("admin", "hunter2");
        let put = request("PUT", url.clone(), Some(auth), Some(content.clone())).await;
        assert_eq!(put.status, 201);

        let get = request("GET", url, None, None).await;
        assert_eq!(get.status, 200);
        assert_eq!(get.body.len(), content.len());
        assert_eq!(get.body, content);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn options_reports_allowed_methods() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;
        let url = format!("http://{}/repository/com/example/lib/1.0/lib-1.0.jar", addr);

        let anonymous = request("OPTIONS", url.clone(), None, None).await;
        assert_eq!(anonymous.status, 204);
        assert_eq!(header(&anonymous, "allow"), Some("OPTIONS, HEAD, GET"));

        let auth = basic_header("admin", "hunter2");
        let writer = request("OPTIONS", url, Some(auth), None).await;
        assert_eq!(writer.status, 204);
        assert_eq!(header(&writer, "allow"), Some("OPTIONS, HEAD, GET, PUT"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn anonymous_is_denied_when_default_access_is_none() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::None).await;
        let url = format!("http://{}/repository/com/example/lib/1.0/lib-1.0.jar", addr);

        let reply = request("GET", url, None, None).await;
        assert_eq!(reply.status, 401);
        assert_eq!(
            header(&reply, "www-authenticate"),
            Some("Basic realm=\"depot\"")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn write_requires_write_access() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;
        let url = format!("http://{}/repository/com/example/lib/1.0/lib-1.0.jar", addr);

        let reply = request("PUT", url, None, Some(b"x".to_vec())).await;
        assert_eq!(reply.status, 401);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn release_overwrite_is_bad_request() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;
        let url = format!("http://{}/repository/com/example/lib/1.0/lib-1.0.jar", addr);
        let auth = basic_header("admin", "hunter2");

        let first = request("PUT", url.clone(), Some(auth.clone()), Some(b"x".to_vec())).await;
        assert_eq!(first.status, 201);
        let second = request("PUT", url, Some(auth), Some(b"y".to_vec())).await;
        assert_eq!(second.status, 400);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn metadata_is_not_found_over_http() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;
        let url = format!(
            "http://{}/repository/com/example/lib/maven-metadata.xml",
            addr
        );

        let reply = request("GET", url, None, None).await;
        assert_eq!(reply.status, 404);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn health_reports_ok() {
        let storage = TempDir::new().unwrap();
        let addr = spawn_app(&storage, Access::Read).await;

        let reply = request("GET", format!("http://{}/health", addr), None, None).await;
        assert_eq!(reply.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body["status"], "ok");
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn depot() -> Command {
        cargo_bin_cmd!("depot")
    }

    #[test]
    fn help_displays() {
        depot()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Maven artifact repository"));
    }

    #[test]
    fn version_displays() {
        depot()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depot"));
    }

    #[test]
    fn config_show_prints_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        depot()
            .args(["config", "show"])
            .args(["--config", temp.path().join("config.toml").to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"));
    }

    #[test]
    fn config_path_prints_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        depot()
            .args(["config", "path"])
            .args(["--config", path.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn debug_logging_covers_config_loading() {
        // the subscriber must be up before the config file is read
        let temp = tempfile::TempDir::new().unwrap();
        depot()
            .args(["config", "path"])
            .args(["--config", temp.path().join("missing.toml").to_str().unwrap()])
            .arg("-vv")
            .assert()
            .success()
            .stdout(predicate::str::contains("Config file not found"));
    }

    #[test]
    fn init_writes_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        depot()
            .arg("init")
            .args(["--config", path.to_str().unwrap()])
            .assert()
            .success();
        assert!(path.exists());
    }
}
