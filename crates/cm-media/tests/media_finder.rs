//! `MediaFinder` against `wiremock` stand-ins for the image providers.

use std::path::PathBuf;

use cm_core::{Retriable, RetryPolicy};
use cm_media::{ImageProvider, MediaError, MediaFinder, MediaProvider, MediaSource};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGE_BYTES: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg";

fn temp_media_dir() -> PathBuf {
    std::env::temp_dir().join(format!("cm-media-test-{}", uuid::Uuid::new_v4()))
}

fn keywords() -> Vec<String> {
    vec!["octopus".to_string(), "hearts".to_string()]
}

fn finder(
    providers: Vec<ImageProvider>,
    media_dir: PathBuf,
    fallback: Option<PathBuf>,
) -> MediaFinder {
    MediaFinder::new(5, "cm-test/0.1", providers, media_dir, fallback, RetryPolicy::none())
        .expect("finder")
}

async fn mount_image(server: &MockServer, image_path: &str) {
    Mock::given(method("GET"))
        .and(path(image_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_BYTES))
        .mount(server)
        .await;
}

#[tokio::test]
async fn unsplash_hit_is_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .and(header("authorization", "Client-ID us-key"))
        .and(query_param("query", "octopus hearts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "results": [{
                "id": "u1",
                "urls": {"regular": format!("{}/img/u1.jpg", server.uri())},
                "links": {"html": "https://unsplash.com/photos/u1"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_image(&server, "/img/u1.jpg").await;

    let media_dir = temp_media_dir();
    let provider = ImageProvider::new(MediaProvider::Unsplash, "us-key").with_base_url(&server.uri());
    let found = finder(vec![provider], media_dir.clone(), None)
        .find(&keywords())
        .await
        .unwrap()
        .expect("image found");

    assert_eq!(found.source, MediaSource::Provider(MediaProvider::Unsplash));
    assert_eq!(
        found.source_url.as_deref(),
        Some(format!("{}/img/u1.jpg", server.uri()).as_str())
    );
    assert!(found.path.starts_with(media_dir.join("images")));
    assert_eq!(tokio::fs::read(&found.path).await.unwrap(), IMAGE_BYTES);

    let _ = tokio::fs::remove_dir_all(&media_dir).await;
}

#[tokio::test]
async fn empty_results_fall_through_to_next_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(header("authorization", "pexels-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"photos": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(query_param("key", "pixabay-key"))
        .and(query_param("q", "octopus hearts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalHits": 1,
            "hits": [{
                "id": 7,
                "webformatURL": format!("{}/img/p7.jpg", server.uri()),
                "pageURL": "https://pixabay.com/photos/p7"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_image(&server, "/img/p7.jpg").await;

    let media_dir = temp_media_dir();
    let providers = vec![
        ImageProvider::new(MediaProvider::Pexels, "pexels-key").with_base_url(&server.uri()),
        ImageProvider::new(MediaProvider::Pixabay, "pixabay-key").with_base_url(&server.uri()),
    ];
    let found = finder(providers, media_dir.clone(), None)
        .find(&keywords())
        .await
        .unwrap()
        .expect("image found");
    assert_eq!(found.source, MediaSource::Provider(MediaProvider::Pixabay));

    let _ = tokio::fs::remove_dir_all(&media_dir).await;
}

#[tokio::test]
async fn permanent_error_moves_on_to_next_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": [{
                "id": 3,
                "url": "https://www.pexels.com/photo/3",
                "src": {"large": format!("{}/img/x3.jpg", server.uri())}
            }]
        })))
        .mount(&server)
        .await;
    mount_image(&server, "/img/x3.jpg").await;

    let media_dir = temp_media_dir();
    let providers = vec![
        ImageProvider::new(MediaProvider::Unsplash, "bad").with_base_url(&server.uri()),
        ImageProvider::new(MediaProvider::Pexels, "pexels-key").with_base_url(&server.uri()),
    ];
    let found = finder(providers, media_dir.clone(), None)
        .find(&keywords())
        .await
        .unwrap()
        .expect("image found");
    assert_eq!(found.source, MediaSource::Provider(MediaProvider::Pexels));

    let _ = tokio::fs::remove_dir_all(&media_dir).await;
}

#[tokio::test]
async fn transient_failure_without_result_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fallback_dir = temp_media_dir();
    tokio::fs::create_dir_all(&fallback_dir).await.unwrap();
    let fallback = fallback_dir.join("default.jpg");
    tokio::fs::write(&fallback, IMAGE_BYTES).await.unwrap();

    let provider = ImageProvider::new(MediaProvider::Unsplash, "k").with_base_url(&server.uri());
    let err = finder(vec![provider], temp_media_dir(), Some(fallback))
        .find(&keywords())
        .await
        .unwrap_err();
    assert!(err.is_retriable(), "got {err:?}");
    assert!(matches!(err, MediaError::UnexpectedStatus { status: 503, .. }));

    let _ = tokio::fs::remove_dir_all(&fallback_dir).await;
}

#[tokio::test]
async fn no_match_uses_fallback_copy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let fallback_dir = temp_media_dir();
    tokio::fs::create_dir_all(&fallback_dir).await.unwrap();
    let fallback = fallback_dir.join("default.jpg");
    tokio::fs::write(&fallback, IMAGE_BYTES).await.unwrap();

    let media_dir = temp_media_dir();
    let provider = ImageProvider::new(MediaProvider::Unsplash, "k").with_base_url(&server.uri());
    let found = finder(vec![provider], media_dir.clone(), Some(fallback))
        .find(&keywords())
        .await
        .unwrap()
        .expect("fallback used");

    assert_eq!(found.source, MediaSource::Fallback);
    assert!(found.source_url.is_none());
    assert_eq!(found.path, media_dir.join("images").join("fallback_default.jpg"));
    assert_eq!(tokio::fs::read(&found.path).await.unwrap(), IMAGE_BYTES);

    let _ = tokio::fs::remove_dir_all(&media_dir).await;
    let _ = tokio::fs::remove_dir_all(&fallback_dir).await;
}

#[tokio::test]
async fn no_match_and_no_fallback_is_none() {
    let finder = finder(Vec::new(), temp_media_dir(), Some(PathBuf::from("/nonexistent/x.jpg")));
    assert!(finder.find(&keywords()).await.unwrap().is_none());
}
