use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One CSV data row: the raw timestamp text plus one raw value per sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: String,
    /// `None` when the row was shorter than the header.
    pub values: BTreeMap<String, Option<String>>,
}

impl SensorReading {
    pub fn value(&self, sensor: &str) -> Option<&str> {
        self.values.get(sensor).and_then(|v| v.as_deref())
    }
}

/// Sensor names from the header (timestamp column excluded) and the rows in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub sensor_list: Vec<String>,
    pub rows: Vec<SensorReading>,
}

impl ParsedFile {
    pub fn has_sensor(&self, sensor: &str) -> bool {
        self.sensor_list.iter().any(|s| s == sensor)
    }
}

/// Parse CSV text whose first record is a header and whose first column is the timestamp.
///
/// Values are kept as raw strings. Records the reader cannot decode are dropped.
pub fn parse(raw: &str) -> Result<ParsedFile, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut records = reader.records();
    let header = loop {
        match records.next() {
            Some(Ok(record)) => break record,
            Some(Err(e)) => log::debug!("Skipping unreadable header candidate: {e}"),
            None => return Err(ParseError::NoDataRows),
        }
    };

    // sensor name -> header column; the first column with a given name wins
    let mut columns: Vec<(String, usize)> = Vec::new();
    for (col, name) in header.iter().enumerate().skip(1) {
        if name.is_empty() {
            log::debug!("Skipping unnamed header column {col}");
        } else if columns.iter().any(|(seen, _)| seen == name) {
            log::debug!("Skipping repeated header column {col} ({name})");
        } else {
            columns.push((name.to_string(), col));
        }
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in records {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                skipped += 1;
                log::debug!("Dropping unparsable CSV row: {e}");
                continue;
            }
        };
        let timestamp = record.get(0).unwrap_or_default().to_string();
        let values = columns
            .iter()
            .map(|(sensor, col)| (sensor.clone(), record.get(*col).map(str::to_string)))
            .collect();
        rows.push(SensorReading { timestamp, values });
    }

    if rows.is_empty() {
        return Err(ParseError::NoDataRows);
    }
    let sensor_list: Vec<String> = columns.into_iter().map(|(sensor, _)| sensor).collect();
    log::debug!(
        "Parsed {} rows across {} sensors ({} dropped)",
        rows.len(),
        sensor_list.len(),
        skipped
    );
    Ok(ParsedFile { sensor_list, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Device Time,Temp,Humidity\n2020-01-01,20.5,55\n2020-01-02,21.0,60";

    fn reading(ts: &str, pairs: &[(&str, Option<&str>)]) -> SensorReading {
        SensorReading {
            timestamp: ts.to_string(),
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
        }
    }

    #[test]
    fn parses_header_and_rows() {
        let parsed = parse(SAMPLE).unwrap();
        assert_eq!(parsed.sensor_list, vec!["Temp", "Humidity"]);
        assert_eq!(
            parsed.rows,
            vec![
                reading("2020-01-01", &[("Temp", Some("20.5")), ("Humidity", Some("55"))]),
                reading("2020-01-02", &[("Temp", Some("21.0")), ("Humidity", Some("60"))]),
            ]
        );
    }

    #[test]
    fn keeps_values_as_raw_strings() {
        let parsed = parse("t,a\n1,007.50\n").unwrap();
        assert_eq!(parsed.rows[0].value("a"), Some("007.50"));
    }

    #[test]
    fn short_rows_map_missing_sensors_to_none() {
        let parsed = parse("t,a,b,c\n1,10\n2,20,30,40\n").unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].value("a"), Some("10"));
        assert_eq!(parsed.rows[0].values.get("b"), Some(&None));
        assert_eq!(parsed.rows[0].values.get("c"), Some(&None));
        assert_eq!(parsed.rows[0].values.len(), parsed.sensor_list.len());
    }

    #[test]
    fn extra_columns_are_ignored() {
        let parsed = parse("t,a\n1,10,99,100\n").unwrap();
        assert_eq!(parsed.rows[0].values.len(), 1);
        assert_eq!(parsed.rows[0].value("a"), Some("10"));
    }

    #[test]
    fn header_only_is_an_error() {
        assert_eq!(parse("t,a,b\n"), Err(ParseError::NoDataRows));
        assert_eq!(parse(""), Err(ParseError::NoDataRows));
    }

    #[test]
    fn repeated_sensor_name_keeps_first_column() {
        let parsed = parse("t,a,a\n1,2,3\n").unwrap();
        assert_eq!(parsed.sensor_list, vec!["a"]);
        assert_eq!(parsed.rows[0].values.len(), 1);
        assert_eq!(parsed.rows[0].value("a"), Some("2"));
    }

    #[test]
    fn trailing_separators_in_header_are_skipped() {
        let parsed = parse("t,a,,\n1,2,3,4\n").unwrap();
        assert_eq!(parsed.sensor_list, vec!["a"]);
        assert_eq!(parsed.rows[0].values.len(), 1);
        assert_eq!(parsed.rows[0].value("a"), Some("2"));
    }

    #[test]
    fn unnamed_column_between_sensors_keeps_later_columns_aligned() {
        let parsed = parse("t,a,,b\n1,10,x,30\n2,11\n").unwrap();
        assert_eq!(parsed.sensor_list, vec!["a", "b"]);
        assert_eq!(parsed.rows[0].value("b"), Some("30"));
        assert_eq!(parsed.rows[1].values.get("b"), Some(&None));
    }

    #[test]
    fn handles_crlf_and_quoted_fields() {
        let parsed = parse("time,\"Temp, C\"\r\n\"2020-01-01 10:00\",\"1,5\"\r\n").unwrap();
        assert_eq!(parsed.sensor_list, vec!["Temp, C"]);
        assert_eq!(parsed.rows[0].timestamp, "2020-01-01 10:00");
        assert_eq!(parsed.rows[0].value("Temp, C"), Some("1,5"));
    }

    #[test]
    fn blank_lines_do_not_produce_rows() {
        let parsed = parse("t,a\n1,2\n\n3,4\n\n").unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].timestamp, "3");
    }
}
