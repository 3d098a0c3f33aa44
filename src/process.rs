use crate::ancestry::{join_ancestry, AncestryLookup, JoinedTable};
use crate::groups::{
    aggregate_groups, difference, group_means, per_sample_frequencies, sample_frequencies_in_region,
    DifferenceRecord, GroupMean, GroupRules, GroupedFrequency, SampleFrequency,
};
use crate::matrix::{build_matrix, AlleleCountMatrix};
use crate::parse::{parse_ancestry_panel, parse_region_table, VariantSource};
use crate::progress::create_region_bar;
use crate::stats::{compare_region, ks_normality_test, ComparisonOutcome, NormalityTest};

use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

// Define command-line arguments using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// VCF file (.vcf or .vcf.gz) holding the gene's variant calls
    #[arg(long = "vcf")]
    pub vcf: String,

    /// Chromosome the regions live on
    #[arg(long = "chr", default_value = "17")]
    pub chr: String,

    /// Region (exon) boundary table with Start_Position and End_Position columns
    #[arg(long = "regions")]
    pub regions: String,

    /// Delimiter of the region table
    #[arg(long = "region_delimiter", default_value = ";")]
    pub region_delimiter: char,

    /// Number of region table rows to skip before the first used row
    #[arg(long = "region_skip", default_value = "3")]
    pub region_skip: usize,

    /// Number of region table rows to use after the skipped ones
    #[arg(long = "region_take", default_value = "20")]
    pub region_take: usize,

    /// Sample panel: tab separated sample, population, super-population (no header)
    #[arg(long = "panel")]
    pub panel: String,

    /// Super-populations forming the High group
    #[arg(long = "high", value_delimiter = ',', default_value = "EUR,EAS")]
    pub high: Vec<String>,

    /// Super-populations forming the Low group
    #[arg(long = "low", value_delimiter = ',', default_value = "AFR,AMR")]
    pub low: Vec<String>,

    /// Directory receiving the CSV outputs
    #[arg(short, long = "output_dir", default_value = ".")]
    pub output_dir: String,

    /// Project the stacked genotype matrix onto two principal components
    #[arg(long = "pca", help = "Perform PCA on the stacked exon matrix")]
    pub enable_pca: bool,

    /// Output file for PCA results, relative to the output directory
    #[arg(long = "pca_output", default_value = "exon_pca.tsv")]
    pub pca_output: String,

    /// How High and Low are compared within each region
    #[arg(long = "comparison", value_enum, default_value_t = ComparisonMode::Pooled)]
    pub comparison: ComparisonMode,

    /// Worker threads for matrix construction
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log_level", default_value = "info")]
    pub log_level: String,
}

/// Input to the per-region rank-sum test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ComparisonMode {
    /// One pooled frequency per group per region. With a single value on
    /// each side the test can never reach significance.
    Pooled,
    /// Per-sample frequencies of each group's members within the region.
    PerSample,
}

// Custom error types
#[derive(Debug, thiserror::Error)]
pub enum ExonError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
    #[error("Fetching {region} failed: {cause}")]
    FetchFailure { region: String, cause: String },
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Insufficient rank for reduction: {0}")]
    InsufficientRankForReduction(String),
    #[error("Invalid group definition: {0}")]
    InvalidGroups(String),
}

/// A 1-based VCF position. Guaranteed >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneBasedPosition(i64);

impl OneBasedPosition {
    /// Creates a new 1-based position, returning an error if `val < 1`.
    pub fn new(val: i64) -> Result<Self, ExonError> {
        if val < 1 {
            Err(ExonError::Parse(format!("Invalid 1-based pos: {}", val)))
        } else {
            Ok(Self(val))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Converts to zero-based i64. This is where we do `-1`.
    pub fn zero_based(self) -> i64 {
        self.0 - 1
    }
}

/// ZeroBasedHalfOpen represents a half-open interval [start..end).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroBasedHalfOpen {
    pub start: i64,
    pub end: i64,
}

impl ZeroBasedHalfOpen {
    /// Takes a start (inclusive) and end (exclusive) as-is, assuming they are already 0-based.
    pub fn from_0based_half_open(start: i64, end: i64) -> Self {
        ZeroBasedHalfOpen { start, end }
    }

    /// The span covered by a record whose reference allele starts at `pos`.
    pub fn from_record(pos: OneBasedPosition, ref_len: usize) -> Self {
        let start = pos.zero_based();
        ZeroBasedHalfOpen {
            start,
            end: start + ref_len.max(1) as i64,
        }
    }

    /// Returns Some(overlap) if this interval intersects with `other`, or None if no overlap.
    pub fn intersect(&self, other: &ZeroBasedHalfOpen) -> Option<ZeroBasedHalfOpen> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(ZeroBasedHalfOpen { start, end })
        } else {
            None
        }
    }
}

/// One exon of the gene: its ordinal label and the interval fetched for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Region {
    pub ordinal: usize,
    pub start: i64,
    pub end: i64,
}

impl Region {
    pub fn new(ordinal: usize, start: i64, end: i64) -> Result<Self, ExonError> {
        if start > end {
            return Err(ExonError::InvalidRegion(format!(
                "Exon{}: start {} is greater than end {}",
                ordinal, start, end
            )));
        }
        Ok(Region { ordinal, start, end })
    }

    pub fn interval(&self) -> ZeroBasedHalfOpen {
        ZeroBasedHalfOpen::from_0based_half_open(self.start, self.end)
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exon{}", self.ordinal)
    }
}

/// A single fetched record: its 1-based position plus the allele indices of
/// every sample in the record's manifest. `None` marks a missing allele.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantCall {
    pub position: i64,
    pub samples: Arc<[String]>,
    pub genotypes: Vec<Vec<Option<u8>>>,
}

/// Where the region table lives and which of its rows are used.
#[derive(Debug, Clone)]
pub struct RegionTableConfig {
    pub path: PathBuf,
    pub delimiter: u8,
    pub skip: usize,
    pub take: usize,
}

/// Everything the pipeline reads, passed in at construction time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub vcf_path: PathBuf,
    pub chromosome: String,
    pub region_table: RegionTableConfig,
    pub panel_path: PathBuf,
    pub groups: GroupRules,
    pub comparison: ComparisonMode,
    pub output_dir: PathBuf,
    pub pca_output: Option<PathBuf>,
}

impl TryFrom<&Args> for PipelineConfig {
    type Error = ExonError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        if !args.region_delimiter.is_ascii() {
            return Err(ExonError::Parse(format!(
                "Region delimiter '{}' must be a single ASCII character",
                args.region_delimiter
            )));
        }
        let output_dir = PathBuf::from(&args.output_dir);
        Ok(PipelineConfig {
            vcf_path: PathBuf::from(&args.vcf),
            chromosome: args.chr.clone(),
            region_table: RegionTableConfig {
                path: PathBuf::from(&args.regions),
                delimiter: args.region_delimiter as u8,
                skip: args.region_skip,
                take: args.region_take,
            },
            panel_path: PathBuf::from(&args.panel),
            groups: GroupRules::high_low(&args.high, &args.low)?,
            comparison: args.comparison,
            pca_output: args.enable_pca.then(|| output_dir.join(&args.pca_output)),
            output_dir,
        })
    }
}

/// The result of one pipeline stage for one region.
#[derive(Debug)]
pub struct RegionOutcome<T> {
    pub region: Region,
    pub result: Result<T, ExonError>,
}

/// Everything derived from one run, in region order.
#[derive(Debug)]
pub struct AnalysisReport {
    pub regions: Vec<Region>,
    pub failures: Vec<(Region, String)>,
    pub matrices: Vec<AlleleCountMatrix>,
    pub joined: Vec<JoinedTable>,
    pub grouped: Vec<GroupedFrequency>,
    pub differences: Vec<DifferenceRecord>,
    pub sample_frequencies: Vec<SampleFrequency>,
    pub group_means: Vec<GroupMean>,
    pub normality: Result<NormalityTest, ExonError>,
    pub comparisons: Vec<ComparisonOutcome>,
}

/// Fetches every region from `source`, which is dropped once the last region
/// has been read. A failing region yields a `FetchFailure` outcome and the
/// remaining regions are still fetched.
pub fn fetch_regions<S: VariantSource>(
    mut source: S,
    chromosome: &str,
    regions: &[Region],
) -> Vec<RegionOutcome<Vec<VariantCall>>> {
    let bar = create_region_bar(regions.len() as u64, "Fetching regions");
    let outcomes = regions.iter().fold(Vec::with_capacity(regions.len()), |mut acc, region| {
        bar.set_message(format!("Fetching {}", region));
        let result = source
            .fetch(chromosome, region.interval())
            .map_err(|e| ExonError::FetchFailure {
                region: region.label(),
                cause: e.to_string(),
            });
        bar.inc(1);
        acc.push(RegionOutcome { region: *region, result });
        acc
    });
    bar.finish_and_clear();
    drop(source);
    outcomes
}

/// Turns fetched records into one matrix per region. Fetch failures become
/// empty matrices; shape failures are kept as failed outcomes.
pub fn build_region_matrices(
    fetched: Vec<RegionOutcome<Vec<VariantCall>>>,
) -> Vec<RegionOutcome<AlleleCountMatrix>> {
    let mut built: Vec<RegionOutcome<AlleleCountMatrix>> = fetched
        .into_par_iter()
        .map(|outcome| {
            let region = outcome.region;
            let result = match outcome.result {
                Ok(records) => build_matrix(region, &records),
                Err(e) => {
                    warn!("{}: {}; continuing with an empty result", region, e);
                    Ok(AlleleCountMatrix::empty(region))
                }
            };
            RegionOutcome { region, result }
        })
        .collect();
    built.sort_by_key(|outcome| outcome.region.ordinal);
    built
}

/// Runs every analysis step over already-loaded reference data.
pub fn analyze_regions<S: VariantSource>(
    source: S,
    chromosome: &str,
    regions: &[Region],
    lookup: &AncestryLookup,
    rules: &GroupRules,
    comparison: ComparisonMode,
) -> AnalysisReport {
    let fetched = fetch_regions(source, chromosome, regions);
    let mut failures = Vec::new();
    for outcome in &fetched {
        if let Err(e) = &outcome.result {
            failures.push((outcome.region, e.to_string()));
        }
    }

    let mut matrices = Vec::new();
    for outcome in build_region_matrices(fetched) {
        match outcome.result {
            Ok(matrix) => matrices.push(matrix),
            Err(e) => {
                warn!("{}: {}; region skipped", outcome.region, e);
                failures.push((outcome.region, e.to_string()));
            }
        }
    }

    let joined: Vec<JoinedTable> = matrices
        .iter()
        .map(|matrix| {
            let mut table = join_ancestry(matrix, lookup);
            if table.n_samples() == 0 {
                warn!("{}: no samples left after the ancestry join", matrix.region());
            }
            table.assign_groups(rules);
            table
        })
        .collect();

    let grouped: Vec<GroupedFrequency> = joined
        .iter()
        .flat_map(|table| aggregate_groups(table, rules))
        .collect();

    let (high_rule, low_rule) = rules.primary();
    let mut differences = Vec::new();
    let mut comparisons = Vec::new();
    for table in &joined {
        let region = table.region();
        let pick = |label: &str| {
            grouped
                .iter()
                .find(|g| g.region == region && g.group == label)
        };
        let (high, low) = (pick(high_rule.label()), pick(low_rule.label()));
        if let (Some(high), Some(low)) = (high, low) {
            if let Some(record) = difference(high, low) {
                differences.push(record);
            }
        }

        let (high_values, low_values) = match comparison {
            ComparisonMode::Pooled => (
                high.and_then(|g| g.frequency).into_iter().collect::<Vec<_>>(),
                low.and_then(|g| g.frequency).into_iter().collect::<Vec<_>>(),
            ),
            ComparisonMode::PerSample => (
                sample_frequencies_in_region(table, high_rule),
                sample_frequencies_in_region(table, low_rule),
            ),
        };
        let outcome = compare_region(
            region,
            high_rule.label(),
            &high_values,
            low_rule.label(),
            &low_values,
        );
        if let ComparisonOutcome::Skipped { region, reason } = &outcome {
            info!("{}: comparison skipped: {}", region, reason);
        }
        comparisons.push(outcome);
    }

    let defined: Vec<f64> = grouped.iter().filter_map(|g| g.frequency).collect();
    let normality = ks_normality_test(&defined);
    if let Err(e) = &normality {
        warn!("Normality check not run: {}", e);
    }

    let sample_frequencies = per_sample_frequencies(&joined, rules);
    let group_means = group_means(&sample_frequencies, rules);
    debug!(
        "Analysis finished: {} regions, {} failures, {} grouped frequencies",
        regions.len(),
        failures.len(),
        grouped.len()
    );

    AnalysisReport {
        regions: regions.to_vec(),
        failures,
        matrices,
        joined,
        grouped,
        differences,
        sample_frequencies,
        group_means,
        normality,
        comparisons,
    }
}

/// Loads the reference tables named by `config` and analyzes every region.
pub fn run_pipeline<S: VariantSource>(
    config: &PipelineConfig,
    source: S,
) -> Result<AnalysisReport, ExonError> {
    let regions = parse_region_table(&config.region_table)?;
    info!(
        "Loaded {} regions from {}",
        regions.len(),
        config.region_table.path.display()
    );
    let lookup = parse_ancestry_panel(&config.panel_path)?;
    info!(
        "Loaded ancestry for {} samples from {}",
        lookup.len(),
        config.panel_path.display()
    );
    Ok(analyze_regions(
        source,
        &config.chromosome,
        &regions,
        &lookup,
        &config.groups,
        config.comparison,
    ))
}
