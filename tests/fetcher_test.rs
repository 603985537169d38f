// Tests for FmiFetcher against a mocked WFS endpoint
// Uses mockito for HTTP mocking

mod common;

use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use tonkka_bot::fetch_error::FetchError;
use tonkka_bot::models::SeriesKind;

fn observation_query() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("request".into(), "getFeature".into()),
        Matcher::UrlEncoded(
            "storedquery_id".into(),
            "fmi::observations::weather::multipointcoverage".into(),
        ),
        Matcher::UrlEncoded("place".into(), "vantaa".into()),
        Matcher::UrlEncoded("timestep".into(), "10".into()),
        Matcher::UrlEncoded("parameters".into(), "t2m".into()),
        Matcher::Regex("starttime=".into()),
    ])
}

fn forecast_query() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded(
            "storedquery_id".into(),
            "fmi::forecast::harmonie::surface::point::multipointcoverage".into(),
        ),
        Matcher::UrlEncoded("parameters".into(), "temperature".into()),
        Matcher::Regex("endtime=".into()),
    ])
}

#[tokio::test]
async fn test_fetch_history_success() {
    let mut server = Server::new_async().await;
    let points = common::recent_points(&[14.2, 15.0, 15.8, 16.1], 5);

    let mock = server
        .mock("GET", "/wfs")
        .match_query(observation_query())
        .with_status(200)
        .with_header("content-type", "text/xml; charset=UTF8")
        .with_body(common::fmi_xml(&points))
        .create_async()
        .await;

    let fetcher = common::fetcher_for(&server);
    let readings = fetcher.fetch_history(24).await.unwrap();

    assert_eq!(readings.len(), 4);
    assert_eq!(readings[0].temperature, 14.2);
    assert_eq!(readings[3].temperature, 16.1);
    assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_history_drops_points_before_window() {
    let mut server = Server::new_async().await;
    let now = Utc::now();
    let points = vec![
        (now - Duration::hours(5), Some(11.0)),
        (now - Duration::minutes(50), Some(12.0)),
        (now - Duration::minutes(20), None),
        (now - Duration::minutes(10), Some(12.5)),
    ];

    let mock = server
        .mock("GET", "/wfs")
        .match_query(observation_query())
        .with_status(200)
        .with_body(common::fmi_xml(&points))
        .create_async()
        .await;

    let fetcher = common::fetcher_for(&server);
    let readings = fetcher.fetch_history(1).await.unwrap();

    // The 5h old point is outside the window and the NaN is dropped
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].temperature, 12.0);
    assert_eq!(readings[1].temperature, 12.5);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_history_empty_collection() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/wfs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(common::empty_collection_xml())
        .create_async()
        .await;

    let fetcher = common::fetcher_for(&server);
    let result = fetcher.fetch_history(24).await;

    assert!(matches!(
        result,
        Err(FetchError::EmptyData(SeriesKind::History))
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_history_server_error() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/wfs")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let fetcher = common::fetcher_for(&server);
    let result = fetcher.fetch_history(24).await;

    match result {
        Err(e @ FetchError::Status(_)) => {
            assert!(e.is_provider_failure());
            assert!(e.to_string().contains("503"));
        }
        other => panic!("Expected Status error, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_history_malformed_body() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/wfs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<ExceptionReport><Exception>No locations found for the place</Exception></ExceptionReport>")
        .create_async()
        .await;

    let fetcher = common::fetcher_for(&server);
    let result = fetcher.fetch_history(24).await;

    assert!(matches!(result, Err(FetchError::ParseError(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_history_out_of_range_makes_no_request() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/wfs")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let fetcher = common::fetcher_for(&server);
    let result = fetcher.fetch_history(30).await;

    assert!(matches!(
        result,
        Err(FetchError::InvalidRange {
            kind: SeriesKind::History,
            hours: 30,
            min: 1,
            max: 24
        })
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_forecast_limits_horizon() {
    let mut server = Server::new_async().await;
    let now = Utc::now();
    let points: Vec<_> = (1..=60)
        .map(|h| (now + Duration::hours(h), Some(10.0 + h as f64 / 10.0)))
        .collect();

    let mock = server
        .mock("GET", "/wfs")
        .match_query(forecast_query())
        .with_status(200)
        .with_body(common::fmi_xml(&points))
        .create_async()
        .await;

    let fetcher = common::fetcher_for(&server);
    let readings = fetcher.fetch_forecast(12).await.unwrap();

    assert_eq!(readings.len(), 12);
    assert!(readings
        .iter()
        .all(|r| r.timestamp <= Utc::now() + Duration::hours(12)));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_forecast_rejects_over_48_hours() {
    let server = Server::new_async().await;
    let fetcher = common::fetcher_for(&server);

    let result = fetcher.fetch_forecast(49).await;
    assert!(matches!(
        result,
        Err(FetchError::InvalidRange {
            kind: SeriesKind::Forecast,
            max: 48,
            ..
        })
    ));
}
