use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use log::{info, LevelFilter};
use rayon::ThreadPoolBuilder;
use std::str::FromStr;

use exonfreq::output::write_outputs;
use exonfreq::parse::VcfSource;
use exonfreq::pca::run_structure_analysis;
use exonfreq::process::{run_pipeline, Args, PipelineConfig};
use exonfreq::progress::print_report;

fn main() -> Result<()> {
    let args = Args::parse();

    let level = LevelFilter::from_str(&args.log_level)
        .with_context(|| format!("Unknown log level '{}'", args.log_level))?;
    Builder::new().filter_level(level).init();

    ThreadPoolBuilder::new()
        .num_threads(args.threads.max(1))
        .build_global()
        .context("Failed to configure the worker pool")?;

    let config = PipelineConfig::try_from(&args).context("Invalid arguments")?;
    info!("VCF: {}", config.vcf_path.display());
    info!("Chromosome: {}", config.chromosome);
    info!("Output directory: {}", config.output_dir.display());

    println!("{}", "Starting exon allele-frequency analysis...".green());

    let source = VcfSource::open(&config.vcf_path)
        .with_context(|| format!("Failed to open {}", config.vcf_path.display()))?;
    info!("{} samples in VCF header", source.sample_names().len());

    let report = run_pipeline(&config, source).context("Pipeline failed")?;
    write_outputs(&report, &config.output_dir).context("Failed to write outputs")?;
    print_report(&report);

    if let Some(pca_path) = &config.pca_output {
        run_structure_analysis(&report.joined, pca_path).context("Structure analysis failed")?;
    }

    println!("{}", "Analysis complete.".green());
    Ok(())
}
