use std::time::{SystemTime, UNIX_EPOCH};

use ratatui::style::Color;

use crate::csv_ingest::SensorReading;

/// One plotted line: a sensor's values in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub sensor: String,
    pub data: Vec<f64>,
    pub color: Color,
}

impl Series {
    /// `(row index, value)` pairs for the chart widget.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64, *v))
            .collect()
    }
}

/// Chart-ready data: shared x labels (raw timestamps) and one series per sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
}

impl ChartSeries {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Min and max over every data point, widened when flat.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let (lo, hi) = self
            .series
            .iter()
            .flat_map(|s| s.data.iter().copied())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(mn, mx), v| {
                (mn.min(v), mx.max(v))
            });
        if lo > hi {
            return None;
        }
        if lo == hi {
            return Some((lo - 1.0, hi + 1.0));
        }
        Some((lo, hi))
    }
}

/// Build one series per selected sensor. Missing or non-numeric values plot as `0`.
pub fn build_series(rows: &[SensorReading], selected: &[String]) -> ChartSeries {
    if rows.is_empty() || selected.is_empty() {
        return ChartSeries::default();
    }

    let labels = rows.iter().map(|row| row.timestamp.clone()).collect();
    let base_hue = random_hue();
    let series = selected
        .iter()
        .enumerate()
        .map(|(i, sensor)| Series {
            sensor: sensor.clone(),
            data: rows
                .iter()
                .map(|row| row.value(sensor).and_then(parse_numeric).unwrap_or(0.0))
                .collect(),
            // golden angle keeps neighbouring series apart
            color: hsl_color(base_hue + 137.508 * i as f64, 0.7, 0.5),
        })
        .collect();

    ChartSeries { labels, series }
}

/// Parse the longest numeric prefix of `text`, ignoring leading whitespace.
///
/// `"12.5abc"` gives `12.5`; `"abc"` and `""` give `None`. Non-finite values are `None`.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

fn random_hue() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 360_000) / 1000.0
}

fn hsl_color(hue: f64, saturation: f64, lightness: f64) -> Color {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u8 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Color::Rgb(channel(r), channel(g), channel(b))
}
