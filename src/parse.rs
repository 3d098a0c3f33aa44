use crate::ancestry::{Ancestry, AncestryLookup};
use crate::process::{ExonError, OneBasedPosition, Region, RegionTableConfig, VariantCall, ZeroBasedHalfOpen};

use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Anything that can stream the variant records overlapping a region.
pub trait VariantSource {
    /// Records on `chrom` overlapping the 0-based half-open `interval`, in source order.
    fn fetch(&mut self, chrom: &str, interval: ZeroBasedHalfOpen) -> Result<Vec<VariantCall>, ExonError>;
}

impl<S: VariantSource + ?Sized> VariantSource for &mut S {
    fn fetch(&mut self, chrom: &str, interval: ZeroBasedHalfOpen) -> Result<Vec<VariantCall>, ExonError> {
        (**self).fetch(chrom, interval)
    }
}

/// Reads the region (exon) boundary table.
///
/// Rows are counted after the header; `skip` rows are passed over and the
/// next `take` rows become regions labelled from `skip` upward.
pub fn parse_region_table(config: &RegionTableConfig) -> Result<Vec<Region>, ExonError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&config.path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ExonError::Parse(format!("Region table has no '{}' column", name)))
    };
    let start_col = column("Start_Position")?;
    let end_col = column("End_Position")?;

    let mut regions = Vec::with_capacity(config.take);
    for (row, result) in reader.records().enumerate().skip(config.skip).take(config.take) {
        let record = result?;
        let field = |col: usize, name: &str| -> Result<i64, ExonError> {
            let raw = record.get(col).unwrap_or("");
            raw.parse().map_err(|_| {
                ExonError::Parse(format!(
                    "Invalid {} '{}' on region table row {}",
                    name,
                    raw,
                    row + 1
                ))
            })
        };
        let start = field(start_col, "Start_Position")?;
        let end = field(end_col, "End_Position")?;
        regions.push(Region::new(row, start, end)?);
    }

    if regions.len() < config.take {
        warn!(
            "Region table {} has {} usable rows after skipping {}, expected {}",
            config.path.display(),
            regions.len(),
            config.skip,
            config.take
        );
    }
    Ok(regions)
}

/// Reads the tab separated sample panel: sample, population, super-population.
/// Extra columns are ignored; a repeated sample keeps its last entry.
pub fn parse_ancestry_panel(path: &Path) -> Result<AncestryLookup, ExonError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut entries = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() < 3 {
            return Err(ExonError::Parse(format!(
                "Panel line {} has {} columns, expected at least 3",
                line_num + 1,
                record.len()
            )));
        }
        entries.push((
            record[0].to_string(),
            Ancestry {
                population: record[1].to_string(),
                super_population: record[2].to_string(),
            },
        ));
    }
    Ok(AncestryLookup::from_entries(entries))
}

pub fn open_vcf_reader(path: &Path) -> Result<Box<dyn BufRead + Send>, ExonError> {
    let file = File::open(path)?;

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        let decoder = MultiGzDecoder::new(file);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

// Function to validate VCF header
pub fn validate_vcf_header(header: &str) -> Result<(), ExonError> {
    let fields: Vec<&str> = header.split('\t').collect();
    let required_fields = ["#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT"];

    if fields.len() < required_fields.len() || fields[..required_fields.len()] != required_fields[..] {
        return Err(ExonError::Parse("Invalid VCF header format".to_string()));
    }
    Ok(())
}

/// Chromosome name without a leading "chr".
pub fn normalize_chromosome(chrom: &str) -> &str {
    chrom.trim().trim_start_matches("chr")
}

/// Allele indices of one GT value. `.` is a missing allele and a bare `.` a
/// missing diploid call.
pub fn parse_genotype(gt: &str) -> Result<Vec<Option<u8>>, ExonError> {
    if gt == "." {
        return Ok(vec![None, None]);
    }
    gt.split(|c| c == '|' || c == '/')
        .map(|allele| match allele {
            "." => Ok(None),
            _ => allele
                .parse::<u8>()
                .map(Some)
                .map_err(|_| ExonError::MalformedRecord(format!("Invalid genotype '{}'", gt))),
        })
        .collect()
}

/// A plain or gzip-compressed VCF file read region by region.
///
/// The header is read once when the source is opened. Every fetch streams
/// the body and stops at the first record past the region on the requested
/// chromosome, so bodies must be coordinate-sorted.
pub struct VcfSource {
    path: PathBuf,
    samples: Arc<[String]>,
}

impl VcfSource {
    pub fn open(path: &Path) -> Result<Self, ExonError> {
        let reader = open_vcf_reader(path)?;
        for line in reader.lines() {
            let line = line?;
            if line.starts_with("##") {
                continue;
            }
            if line.starts_with("#CHROM") {
                validate_vcf_header(&line)?;
                let samples: Vec<String> = line.split('\t').skip(9).map(String::from).collect();
                debug!("{}: {} samples in header", path.display(), samples.len());
                return Ok(VcfSource {
                    path: path.to_path_buf(),
                    samples: samples.into(),
                });
            }
            break;
        }
        Err(ExonError::Parse(format!(
            "No #CHROM header line found in {}",
            path.display()
        )))
    }

    pub fn sample_names(&self) -> &[String] {
        &self.samples
    }
}

impl VariantSource for VcfSource {
    fn fetch(&mut self, chrom: &str, interval: ZeroBasedHalfOpen) -> Result<Vec<VariantCall>, ExonError> {
        let wanted = normalize_chromosome(chrom);
        let reader = open_vcf_reader(&self.path)?;
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            match parse_variant_line(&line, wanted, interval, &self.samples)? {
                LineMatch::Inside(call) => records.push(call),
                LineMatch::Outside => {}
                LineMatch::PastRegion => break,
            }
        }
        Ok(records)
    }
}

#[derive(Debug)]
pub enum LineMatch {
    Inside(VariantCall),
    Outside,
    PastRegion,
}

/// Classifies one VCF body line against the requested chromosome and interval.
pub fn parse_variant_line(
    line: &str,
    chrom: &str,
    interval: ZeroBasedHalfOpen,
    samples: &Arc<[String]>,
) -> Result<LineMatch, ExonError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 9 {
        return Err(ExonError::Parse(format!(
            "Invalid VCF line format: expected at least 9 fields, found {}",
            fields.len()
        )));
    }

    if normalize_chromosome(fields[0]) != chrom {
        return Ok(LineMatch::Outside);
    }

    let position = OneBasedPosition::new(
        fields[1]
            .parse()
            .map_err(|_| ExonError::Parse(format!("Invalid position '{}'", fields[1])))?,
    )?;
    let span = ZeroBasedHalfOpen::from_record(position, fields[3].len());
    if span.start >= interval.end {
        return Ok(LineMatch::PastRegion);
    }
    if span.intersect(&interval).is_none() {
        return Ok(LineMatch::Outside);
    }

    let gt_index = fields[8]
        .split(':')
        .position(|key| key == "GT")
        .ok_or_else(|| ExonError::Parse(format!("GT field not found in FORMAT at position {}", position.get())))?;

    let genotypes = fields[9..]
        .iter()
        .map(|sample_field| {
            let gt = sample_field.split(':').nth(gt_index).unwrap_or(".");
            parse_genotype(gt)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LineMatch::Inside(VariantCall {
        position: position.get(),
        samples: Arc::clone(samples),
        genotypes,
    }))
}
