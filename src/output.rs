use crate::ancestry::JoinedTable;
use crate::groups::{group_label, DifferenceRecord, GroupedFrequency, SampleFrequency};
use crate::matrix::AlleleCountMatrix;
use crate::process::{AnalysisReport, ExonError};

use csv::{ReaderBuilder, WriterBuilder};
use log::info;
use ndarray::Array2;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const MATRIX_FILE: &str = "exon_matrix.csv";
pub const MATRIX_POP_FILE: &str = "exons_matrix_pop.csv";
pub const FREQUENCY_FILE: &str = "exons_frequencies.csv";
pub const GROUPED_FILE: &str = "grouped_frequencies.csv";
pub const DIFFERENCE_FILE: &str = "differences.csv";

/// Undefined values are persisted as this literal.
pub const UNDEFINED: &str = "NaN";

fn create_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>, ExonError> {
    let file = File::create(path)?;
    Ok(WriterBuilder::new().from_writer(BufWriter::new(file)))
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_else(|| UNDEFINED.to_string())
}

fn parse_optional(raw: &str) -> Result<Option<f64>, ExonError> {
    if raw == UNDEFINED || raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| ExonError::Parse(format!("Invalid frequency '{}'", raw)))
}

/// Rows are the union of every region's samples in first-seen order; a cell
/// is blank where the sample was absent from that region's records.
struct WideRows<'a> {
    samples: Vec<&'a str>,
    cells: Vec<Vec<String>>,
}

fn widen<'a, I>(blocks: I) -> WideRows<'a>
where
    I: IntoIterator<Item = (&'a [String], &'a Array2<u8>)>,
{
    let mut samples: Vec<&'a str> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut cells: Vec<Vec<String>> = Vec::new();
    let mut width = 0;

    for (names, counts) in blocks {
        for (row, name) in names.iter().enumerate() {
            let slot = *index.entry(name.as_str()).or_insert_with(|| {
                samples.push(name.as_str());
                cells.push(vec![String::new(); width]);
                samples.len() - 1
            });
            cells[slot].extend(counts.row(row).iter().map(|c| c.to_string()));
        }
        width += counts.ncols();
        for line in cells.iter_mut() {
            line.resize(width, String::new());
        }
    }
    WideRows { samples, cells }
}

/// Writes the raw allele-count matrices side by side, one column per
/// `Exon<n>_<position>`.
pub fn write_count_matrix(matrices: &[AlleleCountMatrix], path: &Path) -> Result<(), ExonError> {
    let mut writer = create_writer(path)?;
    let mut header = vec!["Sample".to_string()];
    header.extend(matrices.iter().flat_map(|m| m.column_labels()));
    writer.write_record(&header)?;

    let wide = widen(matrices.iter().map(|m| (m.samples().names(), m.counts())));
    for (sample, line) in wide.samples.iter().zip(&wide.cells) {
        writer.write_field(sample)?;
        writer.write_record(line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Joined matrices side by side followed by the sample's Population,
/// Super_population and Group labels.
pub fn write_joined_matrix(tables: &[JoinedTable], path: &Path) -> Result<(), ExonError> {
    let mut writer = create_writer(path)?;
    let mut header = vec!["Sample".to_string()];
    header.extend(tables.iter().flat_map(|t| {
        let region = t.region();
        t.positions().iter().map(move |p| format!("{}_{}", region, p))
    }));
    header.extend(["Population", "Super_population", "Group"].map(String::from));
    writer.write_record(&header)?;

    let mut labels: HashMap<&str, [String; 3]> = HashMap::new();
    for table in tables {
        for (i, sample) in table.samples().iter().enumerate() {
            labels.entry(sample.as_str()).or_insert_with(|| {
                [
                    table.population()[i].clone(),
                    table.super_population()[i].clone(),
                    table.groups_of(i).map(group_label).unwrap_or_default(),
                ]
            });
        }
    }

    let wide = widen(tables.iter().map(|t| (t.samples(), t.counts())));
    for (sample, line) in wide.samples.iter().zip(&wide.cells) {
        writer.write_field(sample)?;
        for cell in line {
            writer.write_field(cell)?;
        }
        let [population, super_population, group] = labels.get(sample).cloned().unwrap_or_default();
        writer.write_record([population, super_population, group])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_sample_frequencies(frequencies: &[SampleFrequency], path: &Path) -> Result<(), ExonError> {
    let mut writer = create_writer(path)?;
    writer.write_record(["Sample", "Allele_frequency", "Group"])?;
    for f in frequencies {
        writer.write_record([f.sample.clone(), format_optional(f.frequency), f.group_label()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_grouped_frequencies(grouped: &[GroupedFrequency], path: &Path) -> Result<(), ExonError> {
    let mut writer = create_writer(path)?;
    writer.write_record(["Region", "Group", "Samples", "Positions", "Alt_alleles", "Frequency"])?;
    for g in grouped {
        writer.write_record([
            g.region.label(),
            g.group.clone(),
            g.samples.to_string(),
            g.positions.to_string(),
            g.alt_alleles.to_string(),
            format_optional(g.frequency),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_differences(differences: &[DifferenceRecord], path: &Path) -> Result<(), ExonError> {
    let mut writer = create_writer(path)?;
    writer.write_record(["Region", "High", "Low", "Difference", "Percent_difference"])?;
    for d in differences {
        writer.write_record([
            d.region.label(),
            format!("{:.6}", d.high),
            format!("{:.6}", d.low),
            format!("{:.6}", d.difference),
            format!("{:.6}", d.percent_difference),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes every CSV of a run into `dir` and returns the paths written.
pub fn write_outputs(report: &AnalysisReport, dir: &Path) -> Result<Vec<PathBuf>, ExonError> {
    std::fs::create_dir_all(dir)?;
    let paths: Vec<PathBuf> = [MATRIX_FILE, MATRIX_POP_FILE, FREQUENCY_FILE, GROUPED_FILE, DIFFERENCE_FILE]
        .iter()
        .map(|name| dir.join(name))
        .collect();

    write_count_matrix(&report.matrices, &paths[0])?;
    write_joined_matrix(&report.joined, &paths[1])?;
    write_sample_frequencies(&report.sample_frequencies, &paths[2])?;
    write_grouped_frequencies(&report.grouped, &paths[3])?;
    write_differences(&report.differences, &paths[4])?;

    for path in &paths {
        info!("Wrote {}", path.display());
    }
    Ok(paths)
}

/// Re-loads a per-sample frequency table. `Group` is split back on `+`.
pub fn read_sample_frequencies(path: &Path) -> Result<Vec<SampleFrequency>, ExonError> {
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let mut frequencies = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() != 3 {
            return Err(ExonError::Parse(format!(
                "{}: expected 3 columns, found {}",
                path.display(),
                record.len()
            )));
        }
        frequencies.push(SampleFrequency {
            sample: record[0].to_string(),
            frequency: parse_optional(&record[1])?,
            groups: record[2]
                .split('+')
                .filter(|g| !g.is_empty())
                .map(String::from)
                .collect(),
        });
    }
    Ok(frequencies)
}

/// A re-loaded count matrix: column labels and one row of counts per sample,
/// `None` for blank cells.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Option<u8>>)>,
}

/// Re-loads `exon_matrix.csv`. Only the `Exon<n>_<position>` columns are
/// kept, so the joined file can be read as well.
pub fn read_count_matrix(path: &Path) -> Result<StoredMatrix, ExonError> {
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let headers = reader.headers()?.clone();
    let count_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, h)| h.starts_with("Exon"))
        .map(|(i, _)| i)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let counts = count_cols
            .iter()
            .map(|&col| match record.get(col).unwrap_or("") {
                "" => Ok(None),
                raw => raw
                    .parse::<u8>()
                    .map(Some)
                    .map_err(|_| ExonError::Parse(format!("Invalid allele count '{}'", raw))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((record.get(0).unwrap_or("").to_string(), counts));
    }

    Ok(StoredMatrix {
        columns: count_cols.iter().map(|&i| headers[i].to_string()).collect(),
        rows,
    })
}
