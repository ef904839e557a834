use crate::error::CacheError;
use crate::file_cache::FileCache;
use crate::series::{self, ChartSeries};

/// Transient view state: the active file, the checked sensors and the series derived
/// from them. Rebuilt whenever the file or the sensor set changes.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    file: Option<String>,
    sensors: Vec<String>,
    series: ChartSeries,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the active file. Checked sensors the new file lacks are dropped.
    ///
    /// If `name` is not cached the whole selection is cleared and the error returned.
    pub fn select_file(&mut self, cache: &FileCache, name: &str) -> Result<(), CacheError> {
        let parsed = match cache.get(name) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };
        self.file = Some(name.to_string());
        self.sensors.retain(|s| parsed.has_sensor(s));
        self.series = series::build_series(&parsed.rows, &self.sensors);
        Ok(())
    }

    /// Check or uncheck a sensor of the active file. Returns whether it is now checked.
    pub fn toggle_sensor(&mut self, cache: &FileCache, sensor: &str) -> Result<bool, CacheError> {
        let Some(file) = self.file.clone() else {
            return Ok(false);
        };
        let parsed = match cache.get(&file) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };
        if !parsed.has_sensor(sensor) {
            return Ok(false);
        }

        let checked = if let Some(pos) = self.sensors.iter().position(|s| s == sensor) {
            self.sensors.remove(pos);
            false
        } else {
            self.sensors.push(sensor.to_string());
            true
        };
        self.series = series::build_series(&parsed.rows, &self.sensors);
        Ok(checked)
    }

    pub fn clear(&mut self) {
        self.file = None;
        self.sensors.clear();
        self.series = ChartSeries::default();
    }

    pub fn selected_file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn selected_sensors(&self) -> &[String] {
        &self.sensors
    }

    pub fn is_selected(&self, sensor: &str) -> bool {
        self.sensors.iter().any(|s| s == sensor)
    }

    pub fn series(&self) -> &ChartSeries {
        &self.series
    }

    /// Sensor names of the active file, in header order.
    pub fn sensor_list<'a>(&self, cache: &'a FileCache) -> &'a [String] {
        self.file
            .as_deref()
            .and_then(|f| cache.get(f).ok())
            .map(|p| p.sensor_list.as_slice())
            .unwrap_or(&[])
    }
}
