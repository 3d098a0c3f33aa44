use crate::groups::{group_label, DifferenceRecord, GroupMean, GroupedFrequency};
use crate::process::{AnalysisReport, ExonError, Region};
use crate::stats::{ComparisonOutcome, NormalityTest};

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use prettytable::{row, Table};
use std::time::Duration;

/// A titled list of key/value lines printed as a boxed table.
#[derive(Debug, Clone)]
pub struct StatusBox {
    pub title: String,
    pub stats: Vec<(String, String)>,
}

pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.bold.green} {msg} {elapsed_precise}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// One tick per region.
pub fn create_region_bar(len: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░");
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar
}

pub fn display_status_box(status: StatusBox) {
    let mut table = Table::new();
    for (key, value) in &status.stats {
        table.add_row(row![key, r->value]);
    }
    println!("\n{}", status.title.cyan().bold());
    table.printstd();
}

fn format_frequency(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6}", v),
        None => "NaN".to_string(),
    }
}

pub fn display_grouped_frequencies(grouped: &[GroupedFrequency]) {
    let mut table = Table::new();
    table.add_row(row![b => "Region", "Group", "Samples", "Positions", "Alt alleles", "Frequency"]);
    for g in grouped {
        table.add_row(row![
            g.region,
            g.group,
            r->g.samples,
            r->g.positions,
            r->g.alt_alleles,
            r->format_frequency(g.frequency)
        ]);
    }
    println!("\n{}", "Grouped Allele Frequencies:".green().bold());
    table.printstd();
}

pub fn display_differences(differences: &[DifferenceRecord]) {
    if differences.is_empty() {
        println!("\n{}", "No region has both group frequencies defined.".yellow());
        return;
    }
    let mut table = Table::new();
    table.add_row(row![b => "Region", "High", "Low", "Difference", "% Difference"]);
    for d in differences {
        table.add_row(row![
            d.region,
            r->format!("{:.6}", d.high),
            r->format!("{:.6}", d.low),
            r->format!("{:.6}", d.difference),
            r->format!("{:.2}%", d.percent_difference)
        ]);
    }
    println!("\n{}", "High vs Low Differences:".green().bold());
    table.printstd();
}

pub fn display_normality(normality: &Result<NormalityTest, ExonError>) {
    println!("\n{}", "Normality (Kolmogorov-Smirnov):".blue().bold());
    match normality {
        Ok(test) => {
            println!(
                "D={:.4}, p-value={:.4}, n={}, mean={:.6}, sd={:.6}",
                test.statistic, test.p_value, test.n, test.mean, test.std_dev
            );
            if test.is_normal() {
                println!("{}", test.message().green());
            } else {
                println!("{}", test.message().yellow());
            }
        }
        Err(e) => println!("{}", format!("Not tested: {}", e).yellow()),
    }
}

pub fn display_comparisons(comparisons: &[ComparisonOutcome]) {
    println!("\n{}", "Mann-Whitney U per region:".blue().bold());
    for outcome in comparisons {
        match outcome {
            ComparisonOutcome::Tested(c) => {
                let line = format!(
                    "{} U-stat={:.3}, p-value={:.4}",
                    c.message(),
                    c.result.u_statistic,
                    c.result.p_value
                );
                if c.is_significant() {
                    println!("{}", line.red());
                } else {
                    println!("{}", line);
                }
            }
            ComparisonOutcome::Skipped { region, reason } => {
                println!("{}", format!("{}: skipped ({})", region, reason).yellow());
            }
        }
    }
}

pub fn display_group_means(means: &[GroupMean]) {
    let mut table = Table::new();
    table.add_row(row![b => "Group", "Samples", "Mean frequency"]);
    for m in means {
        table.add_row(row![m.group, r->m.samples, r->format_frequency(m.mean)]);
    }
    println!("\n{}", "Per-sample Frequency Means:".green().bold());
    table.printstd();
}

pub fn display_failures(failures: &[(Region, String)]) {
    if failures.is_empty() {
        return;
    }
    println!("\n{}", "Regions with problems:".yellow().bold());
    for (region, cause) in failures {
        println!("{}", format!("{}: {}", region, cause).yellow());
    }
}

/// Prints every table and test result of a finished run.
pub fn print_report(report: &AnalysisReport) {
    let assigned = report
        .sample_frequencies
        .iter()
        .filter(|f| !group_label(&f.groups).is_empty())
        .count();
    display_status_box(StatusBox {
        title: "Run Summary".to_string(),
        stats: vec![
            ("Regions".to_string(), report.regions.len().to_string()),
            ("Matrices built".to_string(), report.matrices.len().to_string()),
            ("Failed or skipped".to_string(), report.failures.len().to_string()),
            (
                "Annotated samples".to_string(),
                report.sample_frequencies.len().to_string(),
            ),
            ("Samples in a group".to_string(), assigned.to_string()),
        ],
    });
    display_grouped_frequencies(&report.grouped);
    display_differences(&report.differences);
    display_normality(&report.normality);
    display_comparisons(&report.comparisons);
    display_group_means(&report.group_means);
    display_failures(&report.failures);
}
