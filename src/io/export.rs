//! CSV export for exchanged co-simulation values.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::telemetry::ExchangeRecord;

/// Column header of the exchange trace.
const HEADER: &str = "tick,phase,time_s,channel,variable,direction,value";

/// Exports exchange records to a CSV file at the given path.
///
/// # Arguments
///
/// * `records` - Exchanged values in the order they were recorded
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(records: &[ExchangeRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(records, buf)
}

/// Writes exchange records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[ExchangeRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(','))?;

    for r in records {
        wtr.write_record(&[
            r.tick.to_string(),
            r.phase.label().to_string(),
            format!("{:.1}", r.time_s),
            r.channel.clone(),
            r.variable.clone(),
            r.direction.label().to_string(),
            format!("{:.6}", r.value),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostPhase;
    use crate::telemetry::Direction;

    fn make_record(tick: usize) -> ExchangeRecord {
        ExchangeRecord {
            tick,
            phase: HostPhase::Warmup,
            time_s: tick as f64 * 600.0,
            channel: "room/a, b".into(),
            variable: "TRoo".into(),
            direction: Direction::ToExternal,
            value: 20.25,
        }
    }

    #[test]
    fn header_matches_columns() {
        let mut buf = Vec::new();
        write_csv(&[make_record(1)], &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let first_line = output.as_deref().unwrap_or("").lines().next().unwrap_or("");
        assert_eq!(first_line, HEADER);
    }

    #[test]
    fn fields_with_commas_stay_one_column() {
        let records: Vec<ExchangeRecord> = (1..=3).map(make_record).collect();
        let mut buf = Vec::new();
        write_csv(&records, &mut buf).ok();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let mut rows = 0;
        for record in rdr.records() {
            let rec = record.ok();
            assert_eq!(rec.as_ref().map(csv::StringRecord::len), Some(7));
            assert_eq!(rec.as_ref().map(|r| r[3].to_string()), Some("room/a, b".to_string()));
            let value: Option<f64> = rec.as_ref().and_then(|r| r[6].parse().ok());
            assert_eq!(value, Some(20.25));
            rows += 1;
        }
        assert_eq!(rows, 3);
    }

    #[test]
    fn deterministic_output() {
        let records: Vec<ExchangeRecord> = (0..5).map(make_record).collect();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_csv(&records, &mut buf1).ok();
        write_csv(&records, &mut buf2).ok();
        assert_eq!(buf1, buf2);
    }
}
