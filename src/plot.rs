use chrono::{DateTime, Duration, Utc};
use chrono_tz::Europe::Helsinki;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::coord::types::RangedDateTime;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use std::sync::OnceLock;
use tracing::{debug, instrument};

use crate::models::Reading;

pub const DEFAULT_WIDTH: u32 = 1200;
pub const DEFAULT_HEIGHT: u32 = 750;

pub const SERIES_LABEL: &str = "Helsinki-Vantaa, EFHK";

const FONT_FAMILY: &str = "sans-serif";
// DejaVu Sans, see assets/DejaVuSans-LICENSE
static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const Y_PADDING: f64 = 2.0;
const GRID_STEP: f64 = 5.0;
const DASH_COUNT: i32 = 60;
const X_LABELS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("No readings to plot")]
    EmptyData,
    #[error("Embedded font could not be loaded")]
    Font,
    #[error("Failed to draw plot: {0}")]
    Drawing(String),
    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

fn drawing_error<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Drawing(e.to_string())
}

/// Register the bundled font with plotters once per process
fn ensure_font() -> Result<(), PlotError> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_DATA).is_ok());
    if ok {
        Ok(())
    } else {
        Err(PlotError::Font)
    }
}

/// Tick label on the time axis, in Helsinki time
fn time_label(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Helsinki)
        .format("%H:%M %d.%m.")
        .to_string()
}

/// Renders temperature series as PNG line charts.
///
/// The chart has a title, a Helsinki-time x axis, a °C y axis with a light
/// grid every 5°C, the series in red, a dashed threshold line and a legend.
/// Text uses a bundled font, so no system fonts are needed.
#[derive(Debug, Clone, Copy)]
pub struct PlotRenderer {
    width: u32,
    height: u32,
}

impl PlotRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[instrument(skip(self, readings), fields(points = readings.len()))]
    pub fn render(
        &self,
        readings: &[Reading],
        threshold: f64,
        title: &str,
    ) -> Result<Vec<u8>, PlotError> {
        if readings.is_empty() {
            return Err(PlotError::EmptyData);
        }
        ensure_font()?;

        let points: Vec<(DateTime<Utc>, f64)> = readings
            .iter()
            .map(|r| (r.timestamp, r.temperature))
            .collect();
        let (x_min, x_max) = Self::x_range(&points);
        let (y_min, y_max) = Self::y_range(&points, threshold);

        let title_size = f64::from((self.height / 20).max(12));
        let label_size = f64::from((self.height / 45).max(10));

        let mut buffer = vec![0u8; self.buffer_len()];
        {
            let root =
                BitMapBackend::with_buffer(&mut buffer, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(drawing_error)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(title, (FONT_FAMILY, title_size).into_font())
                .margin(self.height / 40 + 5)
                .x_label_area_size((label_size * 3.5) as u32)
                .y_label_area_size((label_size * 4.0) as u32)
                .build_cartesian_2d(RangedDateTime::from(x_min..x_max), y_min..y_max)
                .map_err(drawing_error)?;

            chart
                .configure_mesh()
                .disable_mesh()
                .x_labels(X_LABELS)
                .x_label_formatter(&time_label)
                .y_label_formatter(&|y: &f64| format!("{:.0}", y))
                .x_desc("Aika")
                .y_desc("Lämpötila °C")
                .label_style((FONT_FAMILY, label_size).into_font())
                .axis_desc_style((FONT_FAMILY, label_size).into_font())
                .draw()
                .map_err(drawing_error)?;

            let first_grid = (y_min / GRID_STEP).ceil() as i64;
            let last_grid = (y_max / GRID_STEP).floor() as i64;
            chart
                .draw_series((first_grid..=last_grid).map(|step| {
                    let y = step as f64 * GRID_STEP;
                    PathElement::new(vec![(x_min, y), (x_max, y)], BLACK.mix(0.15))
                }))
                .map_err(drawing_error)?;

            let dash = (x_max - x_min) / (DASH_COUNT * 2);
            chart
                .draw_series((0..DASH_COUNT).map(|i| {
                    let start = x_min + dash * (i * 2);
                    PathElement::new(
                        vec![(start, threshold), (start + dash, threshold)],
                        BLACK.stroke_width(2),
                    )
                }))
                .map_err(drawing_error)?
                .label(format!("Pääpäivä ({:.0}°C)", threshold))
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(2)));

            let series = if points.len() == 1 {
                chart
                    .draw_series(points.iter().map(|p| Circle::new(*p, 6, RED.filled())))
                    .map_err(drawing_error)?
            } else {
                chart
                    .draw_series(LineSeries::new(points.iter().copied(), RED.stroke_width(3)))
                    .map_err(drawing_error)?
            };
            series
                .label(SERIES_LABEL)
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(3)));

            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperLeft)
                .label_font((FONT_FAMILY, label_size).into_font())
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(drawing_error)?;

            root.present().map_err(drawing_error)?;
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(&buffer, self.width, self.height, ColorType::Rgb8)?;
        debug!("Rendered {} points into {} byte PNG", readings.len(), png.len());

        Ok(png)
    }

    /// RGB byte count of the canvas, computed in `usize` so large sizes do not wrap
    fn buffer_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn x_range(points: &[(DateTime<Utc>, f64)]) -> (DateTime<Utc>, DateTime<Utc>) {
        let min = points.iter().map(|(t, _)| *t).min();
        let max = points.iter().map(|(t, _)| *t).max();
        match (min, max) {
            (Some(min), Some(max)) if max > min => (min, max),
            // A single timestamp still needs a non-degenerate axis
            (Some(t), _) | (_, Some(t)) => (t - Duration::minutes(30), t + Duration::minutes(30)),
            (None, None) => {
                let now = Utc::now();
                (now - Duration::minutes(30), now + Duration::minutes(30))
            }
        }
    }

    fn y_range(points: &[(DateTime<Utc>, f64)], threshold: f64) -> (f64, f64) {
        let (min, max) = points
            .iter()
            .fold((threshold, threshold), |(min, max), (_, y)| (min.min(*y), max.max(*y)));
        (min - Y_PADDING, max + Y_PADDING)
    }
}

impl Default for PlotRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, h, m, 0).unwrap()
    }

    fn day_series() -> Vec<Reading> {
        let start = at(0, 0);
        (0..144)
            .map(|i| {
                let temp = 14.0 + 8.0 * ((i as f64) / 144.0 * std::f64::consts::PI).sin();
                Reading::new(start + Duration::minutes(10 * i), temp)
            })
            .collect()
    }

    #[test]
    fn test_render_empty_is_error() {
        let result = PlotRenderer::default().render(&[], 20.0, "Edellinen 24h");
        assert!(matches!(result, Err(PlotError::EmptyData)));
    }

    #[test]
    fn test_render_single_reading() {
        let reading = Reading::new(at(12, 0), 18.2);
        let png = PlotRenderer::default()
            .render(&[reading], 20.0, "Edellinen 1h")
            .unwrap();

        assert!(!png.is_empty());
        assert_eq!(&png[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_render_series() {
        let png = PlotRenderer::new(640, 400)
            .render(&day_series(), 20.0, "Edellinen 24h")
            .unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_render_draws_title_text() {
        let renderer = PlotRenderer::new(480, 300);
        let readings = day_series();

        let history = renderer.render(&readings, 20.0, "Edellinen 24h").unwrap();
        let again = renderer.render(&readings, 20.0, "Edellinen 24h").unwrap();
        let forecast = renderer.render(&readings, 20.0, "48h Ennuste").unwrap();

        // Rendering is deterministic, so a differing title must show up as pixels
        assert_eq!(history, again);
        assert_ne!(history, forecast);
    }

    #[test]
    fn test_embedded_font_registers() {
        assert!(ensure_font().is_ok());
        assert!(ensure_font().is_ok());
    }

    #[test]
    fn test_time_label_uses_helsinki_time() {
        assert_eq!(time_label(&at(13, 0)), "16:00 10.06.");
        assert_eq!(time_label(&at(22, 30)), "01:30 11.06.");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_buffer_len_does_not_wrap_in_u32() {
        assert_eq!(PlotRenderer::new(640, 400).buffer_len(), 768_000);
        // 4.8e9 bytes is past u32::MAX
        assert_eq!(PlotRenderer::new(40_000, 40_000).buffer_len(), 4_800_000_000);
    }

    #[test]
    fn test_y_range_includes_threshold() {
        let (min, max) = PlotRenderer::y_range(&[(at(0, 0), -5.0), (at(1, 0), -1.0)], 20.0);
        assert_eq!(min, -7.0);
        assert_eq!(max, 22.0);
    }

    #[test]
    fn test_x_range_single_point_is_padded() {
        assert_eq!(
            PlotRenderer::x_range(&[(at(12, 0), 3.0)]),
            (at(11, 30), at(12, 30))
        );
        assert_eq!(
            PlotRenderer::x_range(&[(at(12, 0), 3.0), (at(14, 30), 4.0)]),
            (at(12, 0), at(14, 30))
        );
    }
}
