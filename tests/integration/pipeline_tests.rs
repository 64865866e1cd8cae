//! Request-path integration tests.
//!
//! Tests verify:
//! - Identifier expansion for mosaic manifests and single rasters
//! - Environment comes from configuration only
//! - Requests that already carry `url`, and unrelated paths, pass through
//! - The downstream server sees the external host
//! - Error responses for unusable identifiers

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;

use geotile_gateway::resolver::Environment;

use super::test_utils::{gateway, get, get_json, send, BASE_HOST};

// =============================================================================
// Identifier Expansion
// =============================================================================

#[tokio::test]
async fn test_mosaic_staging() {
    let (status, json) = get_json(gateway(Environment::Staging), "/123456/mosaicjson").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "/mosaicjson");
    assert_eq!(
        json["params"]["url"],
        "s3://geo-staging/12/34/56/123456/mosaic.json"
    );
}

#[tokio::test]
async fn test_cog_production() {
    let (status, json) = get_json(gateway(Environment::Production), "/123456/cog").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "/cog");
    assert_eq!(
        json["params"]["url"],
        "s3://geo-production/12/34/56/123456/display_raster.tif"
    );
}

#[tokio::test]
async fn test_deep_path_and_query_kept() {
    let (status, json) = get_json(
        gateway(Environment::Staging),
        "/2443189116dd/cog/tiles/WebMercatorQuad/8/180/110@1x?rescale=0%2C255&bidx=1",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "/cog/tiles/WebMercatorQuad/8/180/110@1x");
    assert_eq!(
        json["query"],
        "rescale=0%2C255&bidx=1&url=s3%3A%2F%2Fgeo-staging%2F24%2F43%2F18%2F2443189116dd%2Fdisplay_raster.tif"
    );
    assert_eq!(json["params"]["rescale"], "0,255");
}

#[tokio::test]
async fn test_stage_param_does_not_select_environment() {
    let (status, json) = get_json(
        gateway(Environment::Staging),
        "/123456/mosaicjson?stage=production",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["params"]["url"],
        "s3://geo-staging/12/34/56/123456/mosaic.json"
    );
    assert_eq!(json["params"]["stage"], "production");
}

#[tokio::test]
async fn test_percent_encoded_identifier_decoded() {
    let (status, json) = get_json(
        gateway(Environment::Staging),
        "/%C3%A4%C3%B6%C3%BC%C3%9F%C3%A9%C3%A8/cog",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "/cog");
    assert_eq!(
        json["params"]["url"],
        "s3://geo-staging/äö/üß/éè/äöüßéè/display_raster.tif"
    );

    let (status, json) = get_json(gateway(Environment::Staging), "/abc%20def/cog").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["params"]["url"],
        "s3://geo-staging/ab/c /de/abc def/display_raster.tif"
    );
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_identifiers() {
    let router = gateway(Environment::Staging);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let router = router.clone();
            tokio::spawn(async move {
                let identifier = format!("{:06}", 100000 + i);
                let (_, json) = get_json(router, &format!("/{}/cog", identifier)).await;
                (identifier, json)
            })
        })
        .collect();

    for handle in handles {
        let (identifier, json) = handle.await.unwrap();
        let location = json["params"]["url"].as_str().unwrap();
        assert!(
            location.ends_with(&format!("/{}/display_raster.tif", identifier)),
            "{} resolved to {}",
            identifier,
            location
        );
    }
}

// =============================================================================
// Pass-through
// =============================================================================

#[tokio::test]
async fn test_existing_url_param_passes_through() {
    let (status, json) = get_json(gateway(Environment::Staging), "/?id=banana&url=test").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "/");
    assert_eq!(json["query"], "id=banana&url=test");
}

#[tokio::test]
async fn test_existing_url_param_on_identifier_path() {
    let (status, json) = get_json(
        gateway(Environment::Staging),
        "/123456/cog/info?url=s3%3A%2F%2Fother%2Fraster.tif",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "/123456/cog/info");
    assert_eq!(json["query"], "url=s3%3A%2F%2Fother%2Fraster.tif");
}

#[tokio::test]
async fn test_unrelated_paths_pass_through() {
    for uri in ["/", "/foo/bar", "/cog/info", "/mosaicjson"] {
        let (status, json) = get_json(gateway(Environment::Staging), uri).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(json["path"], uri);
        assert_eq!(json["query"], Value::Null);
    }
}

#[tokio::test]
async fn test_downstream_sees_base_host() {
    let request = Request::builder()
        .uri("/123456/cog/info")
        .header("host", "abc123.lambda-url.internal")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = send(gateway(Environment::Staging), request).await;
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["host"], BASE_HOST);
}

#[tokio::test]
async fn test_non_get_reaches_downstream() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/123456/mosaicjson/validate")
        .body(Body::from("{}"))
        .unwrap();

    let (status, _, body) = send(gateway(Environment::Staging), request).await;
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["method"], "POST");
    assert_eq!(json["path"], "/mosaicjson/validate");
}

// =============================================================================
// Gateway-owned Routes and Errors
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (status, json) = get_json(gateway(Environment::Staging), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_short_identifier_rejected() {
    let (status, json) = get_json(gateway(Environment::Staging), "/12345/cog").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "identifier_too_short");
}

#[tokio::test]
async fn test_undecodable_identifier_rejected() {
    let (status, json) =
        get_json(gateway(Environment::Staging), "/%FF%FE%FD%FC%FB%FA/cog").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_identifier");
}

#[tokio::test]
async fn test_missing_bucket_is_server_error() {
    use std::sync::Arc;

    use geotile_gateway::resolver::{PerEnvironment, ShardedResolver};

    use super::test_utils::{fake_downstream, gateway_with};

    let resolver = ShardedResolver::new(PerEnvironment::new(Some("geo-staging".to_string()), None));
    let router = gateway_with(Arc::new(resolver), Environment::Production, fake_downstream());

    let (status, _, _) = get(router, "/123456/cog").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_cors_preflight_answered() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/123456/mosaicjson/tilejson.json")
        .header("origin", "https://maps.example.org")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();

    let (status, headers, _) = send(gateway(Environment::Staging), request).await;

    assert!(status.is_success());
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert!(headers.get("access-control-allow-credentials").is_none());
}
