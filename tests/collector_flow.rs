//! End-to-end collection runs against a mock HTTP server.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gatherer::{
    create_io_context, define_storage, CodecRegistry, CollectorSource, ContentLengthEorTrigger,
    EntryPoint, Error, FsBlobStorage, QueryOptions, ResourceConfig, RuntimeConfig,
    StatusEorTrigger,
};

fn memory_storage() -> Arc<FsBlobStorage<Value>> {
    define_storage()
        .configure(
            Arc::new(CodecRegistry::with_json()),
            "memory",
            json!({}),
            true,
            "count",
            1000.0,
        )
        .expect("memory storage configures")
}

/// Paginated crawl over one mutable axis: two pages of data per area,
/// then 204s until the axis is advanced; the traversal ends on the
/// last area.
#[tokio::test]
async fn paginated_crawl_collects_every_area() {
    let server = MockServer::start().await;
    for area in ["1", "2", "3"] {
        for page in ["1", "2"] {
            Mock::given(method("GET"))
                .and(path("/list"))
                .and(query_param("k", "v"))
                .and(query_param("area", area))
                .and(query_param("page", page))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "area": area,
                    "page": page,
                    "items": [1, 2, 3],
                })))
                .with_priority(1)
                .mount(&server)
                .await;
        }
    }
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(204))
        .with_priority(200)
        .mount(&server)
        .await;

    let storage = memory_storage();
    let mut resource = EntryPoint::define_resource::<Value>(&server.uri()).unwrap();
    resource
        .configure(ResourceConfig {
            max_batch: Some(2),
            eor_triggers: vec![Arc::new(StatusEorTrigger::new(204))],
            ..Default::default()
        })
        .unwrap();
    resource.add_endpoint("list").add_fix_part("list", None);

    let mut io = create_io_context("json", "json", storage.clone()).unwrap();
    {
        let pipeline = io.attach_pipeline();
        pipeline.content_filter(|v: &Value| v.get("items").is_some());
        pipeline
            .step(1, |mut v: Value| {
                v["collected"] = json!(true);
                Ok(v)
            })
            .unwrap();
    }
    resource
        .make_query(
            "areas",
            "list",
            io,
            QueryOptions {
                fix_params: vec![("k".to_string(), "v".to_string())],
                mutable_params: vec![(
                    "area".to_string(),
                    vec!["1".to_string(), "2".to_string(), "3".to_string()],
                )],
                ..Default::default()
            },
        )
        .unwrap();

    let mut collectors = Box::new(resource)
        .build_collectors(&RuntimeConfig::default())
        .unwrap();
    assert_eq!(collectors.len(), 1);
    collectors[0].run_cycle().await.unwrap();

    storage.merge_all().await.unwrap();
    let stored = storage.ls("").await.unwrap();
    assert_eq!(stored.len(), 6, "two pages per area, three areas");
    for path in stored {
        let bytes = storage.read(&path).await.unwrap();
        let record: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record["collected"], json!(true));
    }

    // The mutable axis is walked newest-first.
    let requests = server.received_requests().await.unwrap();
    let first = requests.first().expect("at least one request");
    assert!(first.url.query().unwrap().contains("area=3"));
}

/// An unpaged query hitting a non-2xx response fails the cycle with
/// the offending URL and body attached.
#[tokio::test]
async fn non_success_status_fails_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let storage = memory_storage();
    let mut resource = EntryPoint::define_resource::<Value>(&server.uri()).unwrap();
    resource.add_endpoint("broken").add_fix_part("broken", None);
    let io = create_io_context("json", "json", storage).unwrap();
    resource
        .make_query(
            "broken",
            "broken",
            io,
            QueryOptions {
                has_pages: false,
                ..Default::default()
            },
        )
        .unwrap();

    let mut collectors = Box::new(resource)
        .build_collectors(&RuntimeConfig::default())
        .unwrap();
    let err = collectors[0].run_cycle().await.unwrap_err();
    match err {
        Error::HttpStatus { status, body, url } => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream exploded");
            assert!(url.contains("/broken"));
        }
        other => panic!("expected HttpStatus, got {other}"),
    }
}

/// Short bodies trip the content-length trigger and end the axis
/// without erroring.
#[tokio::test]
async fn content_length_trigger_ends_the_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"items": ["a", "b", "c", "d"]})),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .with_priority(200)
        .mount(&server)
        .await;

    let storage = memory_storage();
    let mut resource = EntryPoint::define_resource::<Value>(&server.uri()).unwrap();
    resource
        .configure(ResourceConfig {
            eor_triggers: vec![Arc::new(ContentLengthEorTrigger::new(5))],
            ..Default::default()
        })
        .unwrap();
    resource.add_endpoint("feed").add_fix_part("feed", None);
    let io = create_io_context("json", "json", storage.clone()).unwrap();
    resource
        .make_query("feed", "feed", io, QueryOptions::default())
        .unwrap();

    let mut collectors = Box::new(resource)
        .build_collectors(&RuntimeConfig::default())
        .unwrap();
    collectors[0].run_cycle().await.unwrap();

    storage.merge_all().await.unwrap();
    let stored = storage.ls("").await.unwrap();
    assert_eq!(stored.len(), 1, "only the full first page is kept");
}
