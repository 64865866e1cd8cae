//! Metadata lookup integration tests against a mock metadata service.
//!
//! Tests verify:
//! - A 200 document's `uri` becomes the `url` parameter
//! - 404 from the metadata service surfaces as 404
//! - Malformed and oversized documents surface as 502
//! - Slow lookups time out
//! - Repeated lookups are served from the cache

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use geotile_gateway::error::ResolutionError;
use geotile_gateway::resolver::{
    Environment, IdentifierResolver, MetadataLookupResolver, PerEnvironment, ResourceKind,
};

use super::test_utils::{fake_downstream, gateway_with, get_json, sharded_resolver};

const RASTER_ID: &str = "2443189116dd4a28bdd7da1384deb51e";
const RASTER_URI: &str = "s3://archive-derivatives/24/43/18/2443189116dd4a28bdd7da1384deb51e/display_raster.tif";

fn lookup_resolver(server: &MockServer, timeout: Duration, cache: usize) -> MetadataLookupResolver {
    let endpoint = Url::parse(&format!("{}/tilemetadata", server.uri())).unwrap();
    MetadataLookupResolver::new(
        MetadataLookupResolver::build_client(timeout).unwrap(),
        PerEnvironment::new(Some(endpoint), None),
        sharded_resolver(),
        cache,
    )
}

async fn mount_document(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/tilemetadata/{}", RASTER_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_lookup_uses_document_uri() {
    let server = MockServer::start().await;
    mount_document(&server, json!({"uri": RASTER_URI, "id": RASTER_ID})).await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 0);
    let router = gateway_with(Arc::new(resolver), Environment::Staging, fake_downstream());

    let (status, json) = get_json(router, &format!("/{}/cog/info", RASTER_ID)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "/cog/info");
    assert_eq!(json["params"]["url"], RASTER_URI);
}

#[tokio::test]
async fn test_mosaic_does_not_call_metadata_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 0);
    let router = gateway_with(Arc::new(resolver), Environment::Staging, fake_downstream());

    let (status, json) = get_json(router, "/123456/mosaicjson").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["params"]["url"],
        "s3://geo-staging/12/34/56/123456/mosaic.json"
    );
}

#[tokio::test]
async fn test_lookup_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 0);
    let router = gateway_with(Arc::new(resolver), Environment::Staging, fake_downstream());

    let (status, json) = get_json(router, &format!("/{}/cog/info", RASTER_ID)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_lookup_server_error_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 0);
    let err = resolver
        .locate(RASTER_ID, ResourceKind::SingleRaster, Environment::Staging)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolutionError::LookupStatus { status: 503, .. }
    ));
}

#[tokio::test]
async fn test_lookup_malformed_document() {
    let server = MockServer::start().await;
    mount_document(&server, json!({"location": RASTER_URI})).await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 0);
    let router = gateway_with(Arc::new(resolver), Environment::Staging, fake_downstream());

    let (status, json) = get_json(router, &format!("/{}/cog/info", RASTER_ID)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "resolution_failed");
}

#[tokio::test]
async fn test_lookup_oversized_document() {
    let server = MockServer::start().await;
    let padding = "x".repeat(4096);
    mount_document(&server, json!({"uri": RASTER_URI, "description": padding})).await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 4).with_max_document_bytes(1024);
    let err = resolver
        .locate(RASTER_ID, ResourceKind::SingleRaster, Environment::Staging)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::MalformedMetadata { .. }));
    assert!(err.to_string().contains("1024 bytes"));
}

#[tokio::test]
async fn test_lookup_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 0);
    let err = resolver
        .locate(RASTER_ID, ResourceKind::SingleRaster, Environment::Staging)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::MalformedMetadata { .. }));
}

#[tokio::test]
async fn test_lookup_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"uri": RASTER_URI}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let resolver = lookup_resolver(&server, Duration::from_millis(50), 0);
    let router = gateway_with(Arc::new(resolver), Environment::Staging, fake_downstream());

    let (status, json) = get_json(router, &format!("/{}/cog/info", RASTER_ID)).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["error"], "lookup_timeout");
}

#[tokio::test]
async fn test_lookup_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/tilemetadata/{}", RASTER_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uri": RASTER_URI})))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 16);

    for _ in 0..3 {
        let location = resolver
            .locate(RASTER_ID, ResourceKind::SingleRaster, Environment::Staging)
            .await
            .unwrap();
        assert_eq!(location.as_str(), RASTER_URI);
    }

    server.verify().await;
}

#[tokio::test]
async fn test_failed_lookup_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let resolver = lookup_resolver(&server, Duration::from_secs(5), 16);

    for _ in 0..2 {
        assert!(resolver
            .locate(RASTER_ID, ResourceKind::SingleRaster, Environment::Staging)
            .await
            .is_err());
    }

    server.verify().await;
}
