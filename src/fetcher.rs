use chrono::{DateTime, Duration, Utc};
use scraper::{ElementRef, Html};
use std::time::Duration as StdDuration;
use tracing::{debug, error, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::{sort_and_dedup, Reading, SeriesKind};

pub const MIN_HOURS: u32 = 1;
pub const MAX_HISTORY_HOURS: u32 = 24;
pub const MAX_FORECAST_HOURS: u32 = 48;

pub const DEFAULT_WFS_URL: &str = "https://opendata.fmi.fi/wfs";
pub const DEFAULT_PLACE: &str = "vantaa";

const OBSERVATION_QUERY: &str = "fmi::observations::weather::multipointcoverage";
const FORECAST_QUERY: &str = "fmi::forecast::harmonie::surface::point::multipointcoverage";
const WFS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:00Z";

// html5ever lowercases element names and keeps the namespace prefix
const POSITIONS_TAG: &str = "gmlcov:positions";
const VALUES_TAG: &str = "gml:doubleornilreasontuplelist";
const COLLECTION_TAG: &str = "wfs:featurecollection";

/// Reject hour ranges outside `MIN_HOURS..=max` for the given series
pub fn validate_range(kind: SeriesKind, hours: u32) -> Result<(), FetchError> {
    let max = match kind {
        SeriesKind::History => MAX_HISTORY_HOURS,
        SeriesKind::Forecast => MAX_FORECAST_HOURS,
    };
    if !(MIN_HOURS..=max).contains(&hours) {
        return Err(FetchError::InvalidRange {
            kind,
            hours,
            min: MIN_HOURS,
            max,
        });
    }
    Ok(())
}

/// Client for the FMI open data WFS service
#[derive(Clone)]
pub struct FmiFetcher {
    client: reqwest::Client,
    url: String,
    place: String,
}

impl FmiFetcher {
    pub fn new(url: String, place: String, timeout: StdDuration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, place })
    }

    /// Observed temperatures of the last `hours` hours at 10 minute resolution
    #[instrument(skip(self), fields(url = %self.url, place = %self.place))]
    pub async fn fetch_history(&self, hours: u32) -> Result<Vec<Reading>, FetchError> {
        validate_range(SeriesKind::History, hours)?;

        let start = Utc::now() - Duration::hours(i64::from(hours));
        let starttime = start.format(WFS_TIME_FORMAT).to_string();
        let query = [
            ("request", "getFeature"),
            ("storedquery_id", OBSERVATION_QUERY),
            ("starttime", starttime.as_str()),
            ("place", self.place.as_str()),
            ("timestep", "10"),
            ("parameters", "t2m"),
        ];

        let body = self.get(&query).await?;
        let readings: Vec<Reading> = self
            .parse_response(&body)?
            .into_iter()
            .filter(|r| r.timestamp >= start)
            .collect();

        if readings.is_empty() {
            warn!("No observations returned for the last {} hours", hours);
            return Err(FetchError::EmptyData(SeriesKind::History));
        }
        debug!("Fetched {} observations", readings.len());
        Ok(readings)
    }

    /// Forecast temperatures from now up to `hours` hours ahead
    #[instrument(skip(self), fields(url = %self.url, place = %self.place))]
    pub async fn fetch_forecast(&self, hours: u32) -> Result<Vec<Reading>, FetchError> {
        validate_range(SeriesKind::Forecast, hours)?;

        let end = Utc::now() + Duration::hours(i64::from(hours));
        let endtime = end.format(WFS_TIME_FORMAT).to_string();
        let query = [
            ("request", "getFeature"),
            ("storedquery_id", FORECAST_QUERY),
            ("endtime", endtime.as_str()),
            ("place", self.place.as_str()),
            ("parameters", "temperature"),
        ];

        let body = self.get(&query).await?;
        let readings: Vec<Reading> = self
            .parse_response(&body)?
            .into_iter()
            .filter(|r| r.timestamp <= end)
            .collect();

        if readings.is_empty() {
            warn!("No forecast points returned for the next {} hours", hours);
            return Err(FetchError::EmptyData(SeriesKind::Forecast));
        }
        debug!("Fetched {} forecast points", readings.len());
        Ok(readings)
    }

    async fn get(&self, query: &[(&str, &str)]) -> Result<String, FetchError> {
        debug!("Sending WFS request");
        let response = self.client.get(&self.url).query(query).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if !status.is_success() {
            error!("WFS request failed with status {}", status);
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        debug!("Retrieved XML content, size: {} bytes", body.len());
        Ok(body)
    }

    /// Parse a multipointcoverage response into sorted, deduplicated readings.
    ///
    /// Positions are `lat lon epoch` triples; the tuple list holds one value
    /// line per position. Missing measurements (`NaN`) are dropped. A feature
    /// collection without coverage yields an empty vector.
    #[instrument(skip(self, xml), fields(xml_size = xml.len()))]
    pub fn parse_response(&self, xml: &str) -> Result<Vec<Reading>, FetchError> {
        let document = Html::parse_document(xml);
        let root = document.root_element();
        let elements = || root.descendants().filter_map(ElementRef::wrap);

        if !elements().any(|el| el.value().name() == COLLECTION_TAG) {
            error!("Response is not a WFS feature collection");
            debug!(
                "Response preview (first 500 chars): {}",
                xml.chars().take(500).collect::<String>()
            );
            return Err(FetchError::ParseError(
                "missing wfs:FeatureCollection".to_string(),
            ));
        }

        let mut timestamps = Vec::new();
        for el in elements().filter(|el| el.value().name() == POSITIONS_TAG) {
            timestamps.extend(Self::parse_positions(&el.text().collect::<String>())?);
        }

        let mut values = Vec::new();
        for el in elements().filter(|el| el.value().name() == VALUES_TAG) {
            values.extend(Self::parse_values(&el.text().collect::<String>())?);
        }

        if timestamps.len() != values.len() {
            error!(
                "Position count {} does not match value count {}",
                timestamps.len(),
                values.len()
            );
            return Err(FetchError::ParseError(format!(
                "{} positions but {} values",
                timestamps.len(),
                values.len()
            )));
        }

        let mut missing = 0;
        let readings: Vec<Reading> = timestamps
            .into_iter()
            .zip(values)
            .filter_map(|(timestamp, temperature)| {
                if temperature.is_finite() {
                    Some(Reading::new(timestamp, temperature))
                } else {
                    missing += 1;
                    None
                }
            })
            .collect();

        if missing > 0 {
            debug!("Dropped {} missing measurements", missing);
        }

        Ok(sort_and_dedup(readings))
    }

    fn parse_positions(text: &str) -> Result<Vec<DateTime<Utc>>, FetchError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() % 3 != 0 {
            return Err(FetchError::ParseError(format!(
                "positions list has {} tokens, expected triples",
                tokens.len()
            )));
        }

        tokens
            .chunks(3)
            .map(|triple| {
                let epoch = triple[2]
                    .parse::<i64>()
                    .map_err(|e| FetchError::NumberError(format!("{}: {}", triple[2], e)))?;
                DateTime::<Utc>::from_timestamp(epoch, 0).ok_or_else(|| {
                    FetchError::ParseError(format!("timestamp out of range: {}", epoch))
                })
            })
            .collect()
    }

    fn parse_values(text: &str) -> Result<Vec<f64>, FetchError> {
        text.lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(|value| {
                value
                    .parse::<f64>()
                    .map_err(|e| FetchError::NumberError(format!("{}: {}", value, e)))
            })
            .collect()
    }
}
