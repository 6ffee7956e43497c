//! ==============================================================================
//! aggregate.rs - rebuild nested readings from a flat join result
//! ==============================================================================
//!
//! purpose:
//!     storage answers with one row per (reading x datum) pair, or a single
//!     null-padded row for a reading that has no data. this module folds that
//!     flat, ordered stream back into `Reading { data: Vec<Datum> }` values.
//!
//! rules:
//!     - rows of one reading are contiguous (the query orders them that way)
//!     - a new reading starts when the row timestamp differs from the
//!       timestamp of the reading being assembled (see `starts_new_reading`)
//!     - a datum is attached only when the row carries a datum id
//!     - the reading in progress is flushed once the input is exhausted
//!
//! relationships:
//!     - used by: storage.rs (readings_for_device, export_all)
//!     - uses: domain.rs (FlatRow, Reading, Datum)
//!
//! ==============================================================================

use crate::domain::{FlatRow, Reading};

/// group boundary test between the reading in progress and the next row.
///
/// only the timestamp string is compared. two distinct readings that share a
/// timestamp string end up merged into one group.
pub fn starts_new_reading(current_timestamp: &str, row_timestamp: &str) -> bool {
    current_timestamp != row_timestamp
}

/// fold an ordered row stream into readings.
///
/// the first row error aborts the pass and is returned as is; the cursor
/// behind `rows` is released by its owner either way.
pub fn aggregate<I, E>(rows: I) -> Result<Vec<Reading>, E>
where
    I: IntoIterator<Item = Result<FlatRow, E>>,
{
    let mut readings = Vec::new();
    let mut current: Option<Reading> = None;

    for row in rows {
        let row = row?;

        let current_timestamp = current.as_ref().map_or("", |r| r.timestamp.as_str());
        if starts_new_reading(current_timestamp, &row.timestamp) {
            // a group whose timestamp came back empty is never emitted
            if let Some(done) = current.take().filter(|r| !r.timestamp.is_empty()) {
                readings.push(done);
            }
            current = Some(Reading {
                device: row.device.clone(),
                timestamp: row.timestamp.clone(),
                id: row.reading_id,
                data: Vec::new(),
            });
        }

        if let (Some(reading), Some(datum)) = (current.as_mut(), row.datum()) {
            reading.data.push(datum);
        }
    }

    // last group is never closed by a boundary row
    if let Some(done) = current.filter(|r| !r.timestamp.is_empty()) {
        readings.push(done);
    }

    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn row(id: i64, dev: &str, ts: &str, datum: Option<i64>, var: &str, val: &str) -> FlatRow {
        FlatRow {
            reading_id: id,
            device: dev.to_string(),
            timestamp: ts.to_string(),
            datum_id: datum,
            variable: var.to_string(),
            value: val.to_string(),
        }
    }

    fn run(rows: Vec<FlatRow>) -> Vec<Reading> {
        aggregate(rows.into_iter().map(Ok::<_, Infallible>)).unwrap()
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(run(vec![]).is_empty());
    }

    #[test]
    fn reading_without_data_keeps_empty_datos() {
        let out = run(vec![row(1, "A", "t1", None, "", "")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].device, "A");
        assert_eq!(out[0].timestamp, "t1");
        assert_eq!(out[0].id, 1);
        assert!(out[0].data.is_empty());
    }

    #[test]
    fn data_points_keep_input_order() {
        let out = run(vec![
            row(1, "A", "t1", Some(5), "temp", "20"),
            row(1, "A", "t1", Some(6), "hum", "55"),
        ]);
        assert_eq!(out.len(), 1);
        let pairs: Vec<_> = out[0]
            .data
            .iter()
            .map(|d| (d.id, d.variable.as_str(), d.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![(5, "temp", "20"), (6, "hum", "55")]);
    }

    #[test]
    fn last_group_is_flushed() {
        let out = run(vec![
            row(1, "A", "t1", Some(5), "temp", "20"),
            row(2, "A", "t2", None, "", ""),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].data.len(), 1);
        assert_eq!(out[1].id, 2);
        assert_eq!(out[1].timestamp, "t2");
        assert!(out[1].data.is_empty());
    }

    #[test]
    fn readings_keep_first_row_order() {
        let out = run(vec![
            row(3, "B", "t3", Some(9), "co2", "400"),
            row(1, "A", "t1", None, "", ""),
            row(2, "A", "t2", Some(7), "temp", "19"),
            row(2, "A", "t2", Some(8), "hum", "60"),
        ]);
        let ids: Vec<_> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        let counts: Vec<_> = out.iter().map(|r| r.data.len()).collect();
        assert_eq!(counts, vec![1, 0, 2]);
    }

    #[test]
    fn shared_timestamp_merges_distinct_readings() {
        // two readings, same second: the boundary test cannot tell them apart
        let out = run(vec![
            row(1, "A", "t1", Some(5), "temp", "20"),
            row(2, "B", "t1", Some(6), "temp", "21"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
        assert_eq!(out[0].device, "A");
        assert_eq!(out[0].data.len(), 2);
        assert!(!starts_new_reading("t1", "t1"));
        assert!(starts_new_reading("", "t1"));
    }

    #[test]
    fn group_and_datum_counts_match_input() {
        let rows = vec![
            row(1, "A", "t1", Some(1), "a", "1"),
            row(1, "A", "t1", None, "", ""),
            row(2, "A", "t2", Some(2), "b", "2"),
            row(3, "A", "t3", None, "", ""),
            row(4, "A", "t4", Some(3), "c", "3"),
            row(4, "A", "t4", Some(4), "d", "4"),
            row(4, "A", "t4", Some(5), "e", "5"),
        ];
        let out = run(rows.clone());

        let mut groups = 0;
        let mut last = "";
        for r in &rows {
            if r.timestamp != last {
                groups += 1;
                last = &r.timestamp;
            }
        }
        assert_eq!(out.len(), groups);

        for reading in &out {
            let expected = rows
                .iter()
                .filter(|r| r.timestamp == reading.timestamp && r.datum_id.is_some())
                .count();
            assert_eq!(reading.data.len(), expected);
        }
    }

    #[test]
    fn empty_timestamp_group_is_dropped_mid_stream() {
        let out = run(vec![
            row(1, "A", "t1", None, "", ""),
            row(2, "A", "", Some(9), "temp", "20"),
            row(3, "A", "t2", None, "", ""),
        ]);
        let ids: Vec<_> = out.iter().map(|r| (r.id, r.timestamp.as_str())).collect();
        assert_eq!(ids, vec![(1, "t1"), (3, "t2")]);
        assert!(out.iter().all(|r| r.data.is_empty()));

        let out = run(vec![
            row(1, "A", "t1", None, "", ""),
            row(2, "A", "", Some(9), "temp", "20"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
    }

    #[test]
    fn row_error_aborts_the_pass() {
        let rows: Vec<Result<FlatRow, &str>> = vec![
            Ok(row(1, "A", "t1", None, "", "")),
            Err("cursor broke"),
            Ok(row(2, "A", "t2", None, "", "")),
        ];
        assert_eq!(aggregate(rows), Err("cursor broke"));
    }
}
