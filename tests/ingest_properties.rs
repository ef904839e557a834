use std::collections::BTreeSet;

use chrono::Utc;
use proptest::prelude::*;
use sensor_chart::store::MemoryStore;
use sensor_chart::{CachePolicy, FileCache, Upload, build_series, csv_ingest};

fn sensor_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[A-Za-z][A-Za-z0-9_]{0,8}", 1..6)
        .prop_map(|set: BTreeSet<String>| set.into_iter().collect())
}

fn csv_text(sensors: &[String], rows: &[Vec<String>]) -> String {
    let mut text = format!("Device Time,{}\n", sensors.join(","));
    for (i, row) in rows.iter().enumerate() {
        text.push_str(&format!("2020-01-{:02}", i % 28 + 1));
        for value in row {
            text.push(',');
            text.push_str(value);
        }
        text.push('\n');
    }
    text
}

fn table() -> impl Strategy<Value = (Vec<String>, Vec<Vec<String>>)> {
    sensor_names().prop_flat_map(|sensors| {
        let width = sensors.len();
        let rows = prop::collection::vec(
            prop::collection::vec("[0-9a-z.]{0,6}", width..=width),
            1..20,
        );
        (Just(sensors), rows)
    })
}

proptest! {
    #[test]
    fn test_header_and_row_count((sensors, rows) in table()) {
        let parsed = csv_ingest::parse(&csv_text(&sensors, &rows)).unwrap();
        prop_assert_eq!(&parsed.sensor_list, &sensors);
        prop_assert_eq!(parsed.rows.len(), rows.len());
        for reading in &parsed.rows {
            prop_assert_eq!(reading.values.len(), sensors.len());
        }
    }

    #[test]
    fn test_put_get_roundtrip((sensors, rows) in table()) {
        let upload = Upload::from_text("p.csv", &csv_text(&sensors, &rows), Utc::now()).unwrap();
        let expected = upload.parsed.clone();
        let mut cache = FileCache::load(Box::new(MemoryStore::new()), CachePolicy::default());
        cache.put(upload, |_| true).unwrap();
        prop_assert_eq!(cache.get("p.csv").unwrap(), &expected);

        let reloaded = FileCache::load(cache.into_store(), CachePolicy::default());
        prop_assert_eq!(reloaded.get("p.csv").unwrap(), &expected);
    }

    #[test]
    fn test_series_shape((sensors, rows) in table()) {
        let parsed = csv_ingest::parse(&csv_text(&sensors, &rows)).unwrap();
        let chart = build_series(&parsed.rows, &sensors);
        prop_assert_eq!(chart.series.len(), sensors.len());
        prop_assert_eq!(chart.labels.len(), rows.len());
        for series in &chart.series {
            prop_assert_eq!(series.data.len(), rows.len());
            prop_assert!(series.data.iter().all(|v| v.is_finite()));
        }
    }
}
