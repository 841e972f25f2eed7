use super::*;
use crate::test_helpers::{test_credential, test_session};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCID: &str = "d4b70100-48b2-4c6b-a6c0-d0d0b5a8c276";
const PFN: &str = "Microsoft.ProjectSpark_8wekyb3d8bbwe";
const LIST_PATH: &str = "/connectedstorage/users/xuid(2535)/scids/d4b70100-48b2-4c6b-a6c0-d0d0b5a8c276";

fn page(range: std::ops::Range<usize>, total: usize, token: Option<&str>) -> serde_json::Value {
    let blobs: Vec<_> = range
        .map(|i| {
            serde_json::json!({
                "fileName": format!("slot{}/saveXdat,savedgame", i),
                "etag": format!("\"0x{:X}\"", i),
                "clientFileTime": "2023-05-01T12:00:00.000Z",
                "size": 100 + i,
            })
        })
        .collect();
    serde_json::json!({
        "blobs": blobs,
        "pagingInfo": {"totalItems": total, "continuationToken": token},
    })
}

#[tokio::test]
async fn list_follows_continuation_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param_is_missing("continuationToken"))
        .and(header("x-xbl-contract-version", "107"))
        .and(header("x-xbl-pfn", PFN))
        .and(header("Accept-Language", "en-US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..50, 57, Some("T"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("continuationToken", "T"))
        .and(query_param("skipItems", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(50..57, 57, None)))
        .expect(1)
        .mount(&server)
        .await;

    let client = TitleStorageClient::new(server.uri());
    let catalog = client
        .list_blobs(&test_session(), &test_credential("2535"), SCID, PFN)
        .await
        .unwrap();

    assert_eq!(catalog.len(), 57);
    assert!(!catalog.has_more());
    assert_eq!(catalog.paging_info.total_items, 57);
    assert_eq!(catalog.blobs[0].file_name, "slot0/saveXdat,savedgame");
    assert_eq!(catalog.blobs[56].file_name, "slot56/saveXdat,savedgame");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn list_sends_signed_authorized_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("Authorization", "XBL3.0 x=1234567890;xsts-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..3, 3, None)))
        .mount(&server)
        .await;

    let client = TitleStorageClient::new(format!("{}/", server.uri()));
    let catalog = client
        .list_blobs(&test_session(), &test_credential("2535"), SCID, PFN)
        .await
        .unwrap();
    assert_eq!(catalog.len(), 3);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.contains_key("Signature"));
}

#[tokio::test]
async fn missing_title_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = TitleStorageClient::new(server.uri())
        .list_blobs(&test_session(), &test_credential("2535"), SCID, PFN)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, Error::Upstream { status: 404, .. }));
}

#[tokio::test]
async fn failing_later_page_fails_the_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param_is_missing("continuationToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..50, 57, Some("T"))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("continuationToken", "T"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = TitleStorageClient::new(server.uri())
        .list_blobs(&test_session(), &test_credential("2535"), SCID, PFN)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upstream { status: 503, .. }));
}

#[tokio::test]
async fn fetch_writes_body_verbatim() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..=255u8).collect();
    Mock::given(method("GET"))
        .and(path(format!(
            "{}/4A67F6D5-32FC-4915-9534-2AA6072C3432,binary",
            LIST_PATH
        )))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("assemblies/01/objects.ass/ECW0");
    tokio::fs::create_dir_all(target.parent().unwrap()).await.unwrap();
    tokio::fs::write(&target, b"stale contents that are longer than nothing")
        .await
        .unwrap();

    let written = TitleStorageClient::new(server.uri())
        .fetch_blob(
            &test_session(),
            &test_credential("2535"),
            SCID,
            PFN,
            "4A67F6D5-32FC-4915-9534-2AA6072C3432,binary",
            &target,
        )
        .await
        .unwrap();

    assert_eq!(written, target);
    assert_eq!(tokio::fs::read(&target).await.unwrap(), body);
}

#[tokio::test]
async fn fetch_creates_nested_parents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/assemblies/01/objectsXass,savedgame", LIST_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"atoms":{}}"#))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("_meta/assemblies/01/objects.ass.meta.json");

    TitleStorageClient::new(server.uri())
        .fetch_blob(
            &test_session(),
            &test_credential("2535"),
            SCID,
            PFN,
            "assemblies/01/objectsXass,savedgame",
            &target,
        )
        .await
        .unwrap();

    assert_eq!(
        tokio::fs::read_to_string(&target).await.unwrap(),
        r#"{"atoms":{}}"#
    );
}

#[tokio::test]
async fn fetch_failure_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("blob");
    let err = TitleStorageClient::new(server.uri())
        .fetch_blob(
            &test_session(),
            &test_credential("2535"),
            SCID,
            PFN,
            "blob,binary",
            &target,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Upstream { status: 500, .. }));
    assert!(!target.exists());
}
