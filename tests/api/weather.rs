use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{berlin_request, forecast_body, spawn_app, spawn_app_with};

/// Berlin request is relayed and the hourly series reshaped with explicit timestamps
#[tokio::test]
async fn weather_returns_reshaped_hourly_series() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "52.52"))
        .and(query_param("longitude", "13.41"))
        .and(query_param("hourly", "temperature_2m"))
        .and(query_param("timezone", "Europe/Berlin"))
        .and(query_param("timeformat", "unixtime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(52.52, 13.41)))
        .expect(1)
        .mount(&test_app.upstream)
        .await;

    let (status, body) = test_app.post_weather("/api/weather", berlin_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latitude"], 52.52);
    assert_eq!(body["longitude"], 13.41);
    assert_eq!(body["elevation"], 38.0);
    assert_eq!(body["timezone"], "Europe/Berlin");
    assert_eq!(body["timezone_abbreviation"], "CEST");
    assert_eq!(body["utc_offset_seconds"], 7200);

    let dates = body["hourly_data"]["date"].as_array().unwrap();
    let values = body["hourly_data"]["temperature_2m"].as_array().unwrap();
    assert_eq!(dates.len(), values.len());
    assert_eq!(dates.len(), 4);
    assert_eq!(dates[0], "2024-06-01T00:00:00Z");
    assert_eq!(dates[3], "2024-06-01T03:00:00Z");
    assert_eq!(values[0], 14.2);
    assert!(values[2].is_null());
}

/// Request defaults apply when only coordinates are posted
#[tokio::test]
async fn weather_applies_request_defaults() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("hourly", "temperature_2m"))
        .and(query_param("timezone", "Europe/Berlin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(52.52, 13.41)))
        .expect(1)
        .mount(&test_app.upstream)
        .await;

    let (status, body) = test_app
        .post_weather("/api/weather", json!({ "latitude": 52.52, "longitude": 13.41 }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["hourly_data"]["temperature_2m"].is_array());
}

/// Repeating a request inside the TTL window must not reach the provider again
#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(52.52, 13.41)))
        .expect(1)
        .mount(&test_app.upstream)
        .await;

    let (first_status, first) = test_app.post_weather("/api/weather", berlin_request()).await;
    let (second_status, second) = test_app.post_weather("/api/v1/weather", berlin_request()).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
}

/// Different parameters are different cache keys
#[tokio::test]
async fn different_coordinates_are_fetched_separately() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "52.52"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(52.52, 13.41)))
        .expect(1)
        .mount(&test_app.upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "48.14"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(48.14, 11.58)))
        .expect(1)
        .mount(&test_app.upstream)
        .await;

    let (_, berlin) = test_app.post_weather("/api/weather", berlin_request()).await;
    let (_, munich) = test_app
        .post_weather("/api/weather", json!({ "latitude": 48.14, "longitude": 11.58 }))
        .await;

    assert_eq!(berlin["latitude"], 52.52);
    assert_eq!(munich["latitude"], 48.14);
}

/// Expired entries are fetched again
#[tokio::test]
async fn expired_cache_entry_is_refetched() {
    let test_app = spawn_app_with(|settings| settings.cache.ttl_seconds = 0).await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(52.52, 13.41)))
        .expect(2)
        .mount(&test_app.upstream)
        .await;

    for _ in 0..2 {
        let (status, _) = test_app.post_weather("/api/weather", berlin_request()).await;
        assert_eq!(status, StatusCode::OK);
    }
}

/// Empty result set maps to 404 without a series
#[tokio::test]
async fn empty_upstream_result_is_not_found() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&test_app.upstream)
        .await;

    let (status, body) = test_app.post_weather("/api/weather", berlin_request()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "No data found" }));
    assert!(body.get("hourly_data").is_none());
}

/// A provider that keeps failing with 5xx is tried 1 + 5 times, then reported as 500
#[tokio::test]
async fn persistent_server_error_is_retried_then_reported() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(503))
        .expect(6)
        .mount(&test_app.upstream)
        .await;

    let started = Instant::now();
    let (status, body) = test_app.post_weather("/api/weather", berlin_request()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["detail"].as_str().unwrap().contains("503"),
        "unexpected detail: {body}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// Transient failure followed by success is invisible to the caller
#[tokio::test]
async fn transient_server_error_recovers() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&test_app.upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(52.52, 13.41)))
        .expect(1)
        .mount(&test_app.upstream)
        .await;

    let (status, body) = test_app.post_weather("/api/weather", berlin_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latitude"], 52.52);
}

/// 4xx answers are final and carry the provider's reason
#[tokio::test]
async fn client_error_is_not_retried() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": true,
            "reason": "Cannot initialize WeatherVariable from invalid String value"
        })))
        .expect(1)
        .mount(&test_app.upstream)
        .await;

    let (status, body) = test_app
        .post_weather(
            "/api/weather",
            json!({ "latitude": 52.52, "longitude": 13.41, "hourly": "not_a_variable" }),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .contains("Cannot initialize WeatherVariable"),
        "unexpected detail: {body}"
    );
}

/// Unreachable provider exhausts retries and reports 500
#[tokio::test]
async fn unreachable_upstream_is_reported() {
    let test_app = spawn_app_with(|settings| {
        settings.upstream.forecast_url = "http://127.0.0.1:9/v1/forecast".to_string();
    })
    .await;

    let started = Instant::now();
    let (status, body) = test_app.post_weather("/api/weather", berlin_request()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("Upstream request failed"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// A provider too slow for the request budget still yields a 500 with a detail
#[tokio::test]
async fn slow_upstream_is_reported_before_request_timeout() {
    let test_app = spawn_app_with(|settings| {
        settings.request_timeout_seconds = 3;
        settings.upstream.timeout_seconds = 1;
    })
    .await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forecast_body(52.52, 13.41))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&test_app.upstream)
        .await;

    let started = Instant::now();
    let (status, body) = test_app.post_weather("/api/weather", berlin_request()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["detail"].as_str().unwrap().contains("did not answer within"),
        "unexpected detail: {body}"
    );
    assert!(started.elapsed() < Duration::from_secs(3));
}

/// A 200 answer with an unexpected shape is an upstream failure and is not cached
#[tokio::test]
async fn malformed_payload_is_upstream_error() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
        .expect(2)
        .mount(&test_app.upstream)
        .await;

    for _ in 0..2 {
        let (status, _) = test_app.post_weather("/api/weather", berlin_request()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

/// Provider omitting the requested variable is an upstream failure
#[tokio::test]
async fn missing_variable_is_upstream_error() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(52.52, 13.41)))
        .mount(&test_app.upstream)
        .await;

    let (status, body) = test_app
        .post_weather(
            "/api/weather",
            json!({ "latitude": 52.52, "longitude": 13.41, "hourly": "rain" }),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("'rain'"));
}

/// Out-of-range coordinates are rejected before any upstream call
#[tokio::test]
async fn out_of_range_latitude_is_rejected() {
    let test_app = spawn_app().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(0.0, 0.0)))
        .expect(0)
        .mount(&test_app.upstream)
        .await;

    let (status, body) = test_app
        .post_weather("/api/weather", json!({ "latitude": 95.0, "longitude": 13.41 }))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("Latitude"));
}

/// Missing coordinates fail request parsing
#[tokio::test]
async fn missing_longitude_is_rejected() {
    let test_app = spawn_app().await;

    let (status, body) = test_app
        .post_weather("/api/weather", json!({ "latitude": 52.52 }))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("longitude"));
}
