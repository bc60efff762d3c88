use crate::core::timeseries::TimeSeries;
use crate::types::CalvingResult;
use std::io::Write;
use std::path::Path;

/// CSV export of a time-series table
pub struct TableWriter;

impl TableWriter {
    /// Column names: dates followed by one column per distance
    pub fn header(table: &TimeSeries) -> Vec<String> {
        let mut header = vec![
            "start_date".to_string(),
            "end_date".to_string(),
            "mid_date".to_string(),
        ];
        header.extend(table.distances.iter().map(|d| format!("{}m", d)));
        header
    }

    /// Write the table to any writer
    pub fn write<W: Write>(table: &TimeSeries, writer: W) -> CalvingResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(Self::header(table))?;

        for record in &table.records {
            let mut row = vec![
                record.start.format("%Y-%m-%d").to_string(),
                record.end.format("%Y-%m-%d").to_string(),
                record.midpoint.format("%Y-%m-%dT%H:%M:%S").to_string(),
            ];
            row.extend(record.values.iter().map(|v| v.to_string()));
            csv_writer.write_record(&row)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Write the table to a CSV file
    pub fn write_csv<P: AsRef<Path>>(table: &TimeSeries, path: P) -> CalvingResult<()> {
        log::info!("Writing {} records to {}", table.len(), path.as_ref().display());
        let file = std::fs::File::create(path.as_ref())?;
        Self::write(table, file)
    }
}
