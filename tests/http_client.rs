use httpmock::prelude::*;
use taxi_etl::app::ports::HttpClientPort;
use taxi_etl::error::EtlError;
use taxi_etl::infra::ReqwestHttp;

#[tokio::test]
async fn success_returns_body_and_headers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/trip-data/yellow_tripdata_2023-01.parquet");
        then.status(200)
            .header("content-type", "application/octet-stream")
            .body("PAR1....PAR1");
    });

    let http = ReqwestHttp::new(None).unwrap();
    let result = http.get(&server.url("/trip-data/yellow_tripdata_2023-01.parquet")).await.unwrap();

    mock.assert();
    assert!(result.is_success());
    assert_eq!(result.bytes, b"PAR1....PAR1");
    assert_eq!(result.content_length, Some(12));
}

#[tokio::test]
async fn not_found_is_reported_with_empty_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/trip-data/yellow_tripdata_2030-01.parquet");
        then.status(404).body("<Error>NoSuchKey</Error>");
    });

    let http = ReqwestHttp::new(None).unwrap();
    let result = http.get(&server.url("/trip-data/yellow_tripdata_2030-01.parquet")).await.unwrap();
    assert_eq!(result.status, 404);
    assert!(!result.is_success());
    assert!(result.bytes.is_empty());
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let http = ReqwestHttp::new(Some(std::time::Duration::from_secs(2))).unwrap();
    let err = http.get("http://127.0.0.1:1/trip-data/x.parquet").await.unwrap_err();
    assert!(matches!(err, EtlError::Transport { .. }));
}
