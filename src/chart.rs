//! PNG line charts of an hourly series
//!
//! Drawing happens into an in-memory RGB buffer; nothing touches the disk.

use std::io::Cursor;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use image::{ImageFormat, RgbImage};
use plotters::coord::types::RangedDateTime;
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};

use crate::ServiceError;
use crate::config::ChartConfig;
use crate::models::WeatherResponse;

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
static FONT_REGISTERED: OnceLock<bool> = OnceLock::new();

/// Registers the bundled font with plotters once per process.
///
/// Returns `false` if the font could not be parsed.
pub fn register_chart_font() -> bool {
    *FONT_REGISTERED.get_or_init(|| {
        match register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!("Bundled chart font is not a valid font file");
                false
            }
        }
    })
}

fn render_error<E: std::fmt::Display>(err: E) -> ServiceError {
    ServiceError::render(err.to_string())
}

/// Human readable label and unit for a provider variable name
fn series_label(variable: &str) -> (String, String) {
    match variable {
        "temperature_2m" => ("Temperature (2m)".into(), "Temperature (°C)".into()),
        "relative_humidity_2m" => ("Relative humidity (2m)".into(), "Humidity (%)".into()),
        "precipitation" => ("Precipitation".into(), "Precipitation (mm)".into()),
        "wind_speed_10m" => ("Wind speed (10m)".into(), "Wind speed (km/h)".into()),
        other => (other.to_string(), other.to_string()),
    }
}

/// Draws the hourly series of `weather` and returns the encoded PNG.
///
/// CPU bound, run it on a blocking thread.
pub fn render_png(
    weather: &WeatherResponse,
    options: &ChartConfig,
) -> Result<Vec<u8>, ServiceError> {
    let points: Vec<(DateTime<Utc>, f64)> = weather.hourly_data.points().collect();
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err(ServiceError::NoData);
    };

    let x_start = first.0;
    let x_end = if last.0 > x_start {
        last.0
    } else {
        x_start + Duration::hours(1)
    };

    let (min_value, max_value) = points.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(min, max), (_, value)| (min.min(*value), max.max(*value)),
    );
    let padding = if (max_value - min_value).abs() > 1e-6 {
        (max_value - min_value) * 0.1
    } else {
        1.0
    };

    let (series_name, axis_name) = series_label(weather.hourly_data.variable());
    let caption = format!(
        "{series_name} over time at ({}, {})",
        weather.latitude, weather.longitude
    );

    if !register_chart_font() {
        return Err(ServiceError::render("Chart font unavailable"));
    }

    let (width, height) = (options.width, options.height);
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(16)
            .caption(caption, (FONT_FAMILY, 24))
            .x_label_area_size(48)
            .y_label_area_size(64)
            .build_cartesian_2d(
                RangedDateTime::from(x_start..x_end),
                (min_value - padding)..(max_value + padding),
            )
            .map_err(render_error)?;

        let format_time = |dt: &DateTime<Utc>| dt.format("%m-%d %H:%M").to_string();
        chart
            .configure_mesh()
            .light_line_style(BLACK.mix(0.15))
            .x_desc("Time")
            .y_desc(axis_name)
            .x_label_formatter(&format_time)
            .label_style((FONT_FAMILY, 14))
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(LineSeries::new(points, &BLUE))
            .map_err(render_error)?
            .label(series_name)
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font((FONT_FAMILY, 14))
            .draw()
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
    }

    let image = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| ServiceError::render("Chart buffer does not match image size"))?;
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(render_error)?;
    Ok(png.into_inner())
}
