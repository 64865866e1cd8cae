//! Downstream forwarding integration tests.
//!
//! The gateway is wired to a mock HTTP tile server so the full path, from
//! rewriting to the network hop and back, is exercised.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use geotile_gateway::resolver::Environment;
use geotile_gateway::server::DownstreamProxy;

use super::test_utils::{gateway_with, get, get_json, send, sharded_resolver, BASE_HOST};

fn gateway_to(server: &MockServer, timeout: Option<Duration>) -> axum::Router {
    let proxy = DownstreamProxy::new(Url::parse(&server.uri()).unwrap(), timeout).unwrap();
    gateway_with(
        Arc::new(sharded_resolver()),
        Environment::Staging,
        proxy.into_router(),
    )
}

#[tokio::test]
async fn test_forwards_rewritten_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cog/info"))
        .and(query_param(
            "url",
            "s3://geo-staging/12/34/56/123456/display_raster.tif",
        ))
        .and(query_param("bidx", "1"))
        .and(header("x-forwarded-host", BASE_HOST))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bounds": [0, 0, 1, 1]})))
        .expect(1)
        .mount(&server)
        .await;

    let router = gateway_to(&server, None);
    let (status, json) = get_json(router, "/123456/cog/info?bidx=1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["bounds"], json!([0, 0, 1, 1]));
}

#[tokio::test]
async fn test_tilejson_from_downstream_rewritten() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mosaicjson/tilejson.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tilejson": "2.2.0",
            "tiles": [
                "https://tiles.example.edu/mosaicjson/tiles/{z}/{x}/{y}?url=s3%3A%2F%2Fgeo-staging%2F12%2F34%2F56%2F123456%2Fmosaic.json"
            ],
            "minzoom": 0
        })))
        .mount(&server)
        .await;

    let router = gateway_to(&server, None);
    let (status, json) = get_json(router, "/123456/mosaicjson/tilejson.json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["tiles"],
        json!(["https://tiles.example.edu/123456/mosaicjson/tiles/{z}/{x}/{y}"])
    );
}

#[tokio::test]
async fn test_downstream_status_and_body_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cog/tiles/1/2/3"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw(
                    r#"{"detail":"Tile(x=2, y=3, z=1) is outside bounds"}"#,
                    "application/json",
                ),
        )
        .mount(&server)
        .await;

    let router = gateway_to(&server, None);
    let (status, headers, body) = get(router, "/123456/cog/tiles/1/2/3").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
    assert_eq!(
        &body[..],
        br#"{"detail":"Tile(x=2, y=3, z=1) is outside bounds"}"#
    );
}

#[tokio::test]
async fn test_request_body_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mosaicjson/validate"))
        .and(body_string(r#"{"mosaicjson":"0.0.3"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"valid": true})))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/123456/mosaicjson/validate")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"mosaicjson":"0.0.3"}"#))
        .unwrap();

    let (status, _, body) = send(gateway_to(&server, None), request).await;
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
}

#[tokio::test]
async fn test_downstream_unreachable_is_bad_gateway() {
    // Nothing listens on a port freed right after binding
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    drop(listener);

    let proxy = DownstreamProxy::new(base, None).unwrap();
    let router = gateway_with(
        Arc::new(sharded_resolver()),
        Environment::Staging,
        proxy.into_router(),
    );

    let (status, json) = get_json(router, "/123456/cog/info").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "bad_gateway");
}

#[tokio::test]
async fn test_downstream_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let router = gateway_to(&server, Some(Duration::from_millis(50)));
    let (status, json) = get_json(router, "/123456/cog/info").await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["error"], "gateway_timeout");
}
