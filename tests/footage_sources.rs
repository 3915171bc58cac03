use finshorts::footage::FootageFetcher;
use finshorts::sources::{FreepikSource, PexelsSource, PixabaySource, VideoSource};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn key() -> Option<String> {
    Some("test-key".to_string())
}

#[tokio::test]
async fn pexels_picks_largest_wide_mp4() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videos/search"))
        .and(header("authorization", "test-key"))
        .and(query_param("query", "stock market"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videos": [
                {
                    "id": 11,
                    "url": "https://www.pexels.com/video/trading-floor-11/",
                    "duration": 12.0,
                    "video_files": [
                        {"file_type": "video/mp4", "width": 640, "height": 360, "link": "https://cdn/sd.mp4"},
                        {"file_type": "video/mp4", "width": 1920, "height": 1080, "link": "https://cdn/hd.mp4"},
                        {"file_type": "video/webm", "width": 3840, "height": 2160, "link": "https://cdn/4k.webm"}
                    ]
                },
                {"id": 12, "url": "", "duration": 1.5, "video_files": []}
            ]
        })))
        .mount(&server)
        .await;

    let source = PexelsSource::new(Client::new(), key()).with_base_url(server.uri());
    let results = source.search("stock market", 5).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].download_url, "https://cdn/hd.mp4");
    assert_eq!(results[0].title, "trading-floor-11");
    assert_eq!(results[0].source, "pexels");
}

#[tokio::test]
async fn pexels_rate_limit_sticks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let source = PexelsSource::new(Client::new(), key()).with_base_url(server.uri());
    assert!(source.search("bank", 3).await.unwrap().is_empty());
    assert!(!source.is_available());
    assert!(source.search("bank", 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn pixabay_filters_short_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/videos/"))
        .and(query_param("key", "test-key"))
        .and(query_param("video_type", "film"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [
                {
                    "id": 7,
                    "tags": "finance, chart",
                    "duration": 20.0,
                    "videos": {
                        "large": {"url": "https://px/large.mp4", "width": 1920, "height": 1080},
                        "small": {"url": "https://px/small.mp4", "width": 640, "height": 360}
                    }
                },
                {
                    "id": 8,
                    "tags": "blink",
                    "duration": 2.0,
                    "videos": {"large": {"url": "https://px/short.mp4", "width": 1920, "height": 1080}}
                }
            ]
        })))
        .mount(&server)
        .await;

    let source = PixabaySource::new(Client::new(), key()).with_base_url(server.uri());
    let results = source.search("finance chart", 5).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "7");
    assert_eq!(results[0].download_url, "https://px/large.mp4");
}

#[tokio::test]
async fn freepik_resolves_download_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/videos"))
        .and(header("x-freepik-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 501, "name": "Office skyline", "width": 3840, "height": 2160, "duration": 15.0},
                {"name": "no id"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/videos/501/download"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/501/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"url": "https://fp/501.mp4"}})))
        .mount(&server)
        .await;

    let source = FreepikSource::new(Client::new(), key()).with_base_url(server.uri());
    let results = source.search("office skyline", 5).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].download_url, "https://fp/501.mp4");
    assert_eq!((results[0].width, results[0].height), (3840, 2160));
}

#[tokio::test]
async fn fetcher_falls_through_empty_providers() {
    let pexels = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"videos": []})))
        .mount(&pexels)
        .await;
    let pixabay = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{
                "id": 1,
                "tags": "money",
                "duration": 9.0,
                "videos": {"medium": {"url": "https://px/m.mp4", "width": 1280, "height": 720}}
            }]
        })))
        .mount(&pixabay)
        .await;

    let client = Client::new();
    let sources: Vec<Arc<dyn VideoSource>> = vec![
        Arc::new(PexelsSource::new(client.clone(), key()).with_base_url(pexels.uri())),
        Arc::new(PixabaySource::new(client.clone(), key()).with_base_url(pixabay.uri())),
        Arc::new(FreepikSource::new(client.clone(), None)),
    ];
    let fetcher = FootageFetcher::new(client, sources, (720, 1280));

    let results = fetcher.search_parallel("money", 3).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, "pixabay");
}

#[tokio::test]
async fn unkeyed_sources_never_call_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let source = PexelsSource::new(Client::new(), None).with_base_url(server.uri());
    assert!(!source.is_available());
    assert!(source.search("anything", 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_providers_hit_the_configured_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"videos": [], "hits": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let pexels = PexelsSource::new(Client::new(), key())
        .with_base_url(server.uri())
        .with_timeout(Duration::from_millis(50));
    assert!(pexels.search("bonds", 3).await.is_err());

    let pixabay = PixabaySource::new(Client::new(), key())
        .with_base_url(server.uri())
        .with_timeout(Duration::from_millis(50));
    assert!(pixabay.search("bonds", 3).await.is_err());
}
