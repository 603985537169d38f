// Shared fixtures for integration tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;
use tonkka_bot::fetcher::FmiFetcher;

pub const STATION_LAT: &str = "60.32670";
pub const STATION_LON: &str = "24.95675";

/// Build a minimal FMI multipointcoverage response for the given points.
/// `None` temperatures are written as `NaN` like the real service does.
pub fn fmi_xml(points: &[(DateTime<Utc>, Option<f64>)]) -> String {
    let positions: String = points
        .iter()
        .map(|(t, _)| format!("                {} {}  {}\n", STATION_LAT, STATION_LON, t.timestamp()))
        .collect();
    let values: String = points
        .iter()
        .map(|(_, v)| match v {
            Some(v) => format!("                {:.1} \n", v),
            None => "                NaN \n".to_string(),
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection timeStamp="{now}" numberMatched="1" numberReturned="1">
  <wfs:member>
    <omso:GridSeriesObservation gml:id="obs-obs-1-1">
      <om:result>
        <gmlcov:MultiPointCoverage gml:id="mpcv-1-1-t2m">
          <gml:domainSet>
            <gmlcov:SimpleMultiPoint gml:id="mp-1-1-t2m" srsDimension="3">
              <gmlcov:positions>
{positions}              </gmlcov:positions>
            </gmlcov:SimpleMultiPoint>
          </gml:domainSet>
          <gml:rangeSet>
            <gml:DataBlock>
              <gml:rangeParameters/>
              <gml:doubleOrNilReasonTupleList>
{values}              </gml:doubleOrNilReasonTupleList>
            </gml:DataBlock>
          </gml:rangeSet>
        </gmlcov:MultiPointCoverage>
      </om:result>
    </omso:GridSeriesObservation>
  </wfs:member>
</wfs:FeatureCollection>"#,
        now = Utc::now().to_rfc3339(),
        positions = positions,
        values = values
    )
}

pub fn empty_collection_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection numberMatched="0" numberReturned="0"></wfs:FeatureCollection>"#
        .to_string()
}

/// Points every 10 minutes ending `end_minutes_ago` minutes before now
pub fn recent_points(temps: &[f64], end_minutes_ago: i64) -> Vec<(DateTime<Utc>, Option<f64>)> {
    let now = Utc::now();
    let count = temps.len() as i64;
    temps
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let minutes_ago = end_minutes_ago + (count - 1 - i as i64) * 10;
            (now - Duration::minutes(minutes_ago), Some(*t))
        })
        .collect()
}

pub fn fetcher_for(server: &mockito::ServerGuard) -> FmiFetcher {
    FmiFetcher::new(
        format!("{}/wfs", server.url()),
        "vantaa".to_string(),
        StdDuration::from_secs(5),
    )
    .expect("Failed to build fetcher")
}
