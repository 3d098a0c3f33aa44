use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::ancestry::JoinedTable;
use crate::process::ExonError;
use crate::progress::{create_spinner, display_status_box, StatusBox};
use log::info;

/// All regions' allele counts side by side for the samples present in every region.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedMatrix {
    pub samples: Vec<String>,
    pub population: Vec<String>,
    pub super_population: Vec<String>,
    pub columns: Vec<String>,
    pub data: Array2<f64>,
}

/// Structure to hold PCA results
#[derive(Debug, Clone, PartialEq)]
pub struct PcaResult {
    pub samples: Vec<String>,
    pub population: Vec<String>,
    pub super_population: Vec<String>,
    /// One row per sample, columns PC1 and PC2.
    pub scores: Array2<f64>,
    pub explained_variance_ratio: [f64; 2],
}

/// Stacks the joined tables column-wise in region order.
///
/// Regions without positions contribute nothing. Among the rest, a sample is
/// kept only if every region has it, so rows are the inner join across regions
/// in the order of the first contributing region.
pub fn stack_regions(tables: &[JoinedTable]) -> StackedMatrix {
    let contributing: Vec<&JoinedTable> = tables.iter().filter(|t| t.n_positions() > 0).collect();
    let first = match contributing.first() {
        Some(first) => *first,
        None => {
            return StackedMatrix {
                samples: Vec::new(),
                population: Vec::new(),
                super_population: Vec::new(),
                columns: Vec::new(),
                data: Array2::zeros((0, 0)),
            }
        }
    };

    let row_maps: Vec<HashMap<&str, usize>> = contributing
        .iter()
        .map(|t| t.samples().iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect())
        .collect();

    let kept: Vec<usize> = (0..first.n_samples())
        .filter(|&i| {
            let name = first.samples()[i].as_str();
            row_maps.iter().all(|m| m.contains_key(name))
        })
        .collect();

    let columns: Vec<String> = contributing
        .iter()
        .flat_map(|t| {
            let region = t.region();
            t.positions().iter().map(move |p| format!("{}_{}", region, p))
        })
        .collect();

    let mut data = Array2::<f64>::zeros((kept.len(), columns.len()));
    for (out_row, &first_row) in kept.iter().enumerate() {
        let name = first.samples()[first_row].as_str();
        let mut col = 0;
        for (table, rows) in contributing.iter().zip(&row_maps) {
            let row = table.row(rows[name]);
            for &count in row.iter() {
                data[[out_row, col]] = count as f64;
                col += 1;
            }
        }
    }

    StackedMatrix {
        samples: kept.iter().map(|&i| first.samples()[i].clone()).collect(),
        population: kept.iter().map(|&i| first.population()[i].clone()).collect(),
        super_population: kept.iter().map(|&i| first.super_population()[i].clone()).collect(),
        columns,
        data,
    }
}

/// Projects the stacked matrix onto its two leading principal axes.
///
/// Columns are centered but not scaled. Each axis's loading vector is signed
/// so that its largest-magnitude entry is positive.
///
/// # Errors
/// `InsufficientRankForReduction` when fewer than 2 samples or 2 columns
/// remain, or when the matrix has no variance at all.
pub fn compute_structure_pca(stacked: &StackedMatrix) -> Result<PcaResult, ExonError> {
    let (n_samples, n_features) = stacked.data.dim();
    if n_samples < 2 || n_features < 2 {
        return Err(ExonError::InsufficientRankForReduction(format!(
            "PCA needs at least 2 samples and 2 columns, found {} samples x {} columns",
            n_samples, n_features
        )));
    }

    let spinner = create_spinner("Computing PCA");

    let mean = stacked
        .data
        .mean_axis(Axis(0))
        .ok_or_else(|| ExonError::InsufficientRankForReduction("empty matrix".to_string()))?;
    let centered = &stacked.data - &mean;
    let dof = (n_samples - 1) as f64;
    let total_variance = centered.iter().map(|x| x * x).sum::<f64>() / dof;
    if total_variance <= f64::EPSILON {
        spinner.finish_and_clear();
        return Err(ExonError::InsufficientRankForReduction(
            "every column is constant across samples".to_string(),
        ));
    }

    // Eigen-decompose whichever of X'X and XX' is smaller.
    let loadings: Vec<(f64, Array1<f64>)> = if n_features <= n_samples {
        let covariance = centered.t().dot(&centered) / dof;
        sorted_eigenpairs(&covariance, 2)
    } else {
        let gram = centered.dot(&centered.t()) / dof;
        sorted_eigenpairs(&gram, 2)
            .into_iter()
            .map(|(value, u)| {
                let v = centered.t().dot(&u);
                let norm = v.dot(&v).sqrt();
                if norm > 0.0 {
                    (value, v / norm)
                } else {
                    (value, Array1::zeros(n_features))
                }
            })
            .collect()
    };

    let mut scores = Array2::<f64>::zeros((n_samples, 2));
    let mut explained_variance_ratio = [0.0; 2];
    for (axis, (value, loading)) in loadings.into_iter().enumerate() {
        let loading = orient(loading);
        scores.column_mut(axis).assign(&centered.dot(&loading));
        explained_variance_ratio[axis] = (value / total_variance).clamp(0.0, 1.0);
    }

    spinner.finish_and_clear();

    display_status_box(StatusBox {
        title: "PCA Summary".to_string(),
        stats: vec![
            ("Samples".to_string(), n_samples.to_string()),
            ("Columns".to_string(), n_features.to_string()),
            (
                "PC1 variance".to_string(),
                format!("{:.2}%", explained_variance_ratio[0] * 100.0),
            ),
            (
                "PC2 variance".to_string(),
                format!("{:.2}%", explained_variance_ratio[1] * 100.0),
            ),
        ],
    });

    Ok(PcaResult {
        samples: stacked.samples.clone(),
        population: stacked.population.clone(),
        super_population: stacked.super_population.clone(),
        scores,
        explained_variance_ratio,
    })
}

/// Leading `k` eigenpairs of a symmetric matrix, largest eigenvalue first.
fn sorted_eigenpairs(matrix: &Array2<f64>, k: usize) -> Vec<(f64, Array1<f64>)> {
    let dim = matrix.nrows();
    let symmetric = DMatrix::from_fn(dim, dim, |i, j| matrix[[i, j]]);
    let eigen = SymmetricEigen::new(symmetric);

    // SymmetricEigen leaves eigenvalues unsorted
    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    order
        .into_iter()
        .take(k)
        .map(|idx| {
            let vector = Array1::from_iter(eigen.eigenvectors.column(idx).iter().copied());
            (eigen.eigenvalues[idx].max(0.0), vector)
        })
        .collect()
}

/// Flips `v` so that its largest-magnitude entry is positive.
fn orient(v: Array1<f64>) -> Array1<f64> {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        -v
    } else {
        v
    }
}

/// Writes PCA results to a TSV file
pub fn write_pca_results_to_file(result: &PcaResult, output_file: &Path) -> Result<(), ExonError> {
    let spinner = create_spinner(&format!("Writing PCA results to {}", output_file.display()));

    let file = File::create(output_file)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "Sample\tPopulation\tSuper_population\tPC1\tPC2")?;
    for (idx, sample) in result.samples.iter().enumerate() {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.6}\t{:.6}",
            sample,
            result.population[idx],
            result.super_population[idx],
            result.scores[[idx, 0]],
            result.scores[[idx, 1]]
        )?;
    }
    writer.flush()?;

    spinner.finish_and_clear();
    info!("PCA results written to {}", output_file.display());
    Ok(())
}

/// Stacks every region, runs the projection and writes the scores.
pub fn run_structure_analysis(tables: &[JoinedTable], output_path: &Path) -> Result<PcaResult, ExonError> {
    let stacked = stack_regions(tables);
    info!(
        "Stacked {} regions into {} samples x {} columns",
        tables.len(),
        stacked.samples.len(),
        stacked.columns.len()
    );
    let result = compute_structure_pca(&stacked)?;
    info!(
        "PC1 explains {:.2}% of variance",
        result.explained_variance_ratio[0] * 100.0
    );
    info!(
        "PC2 explains {:.2}% of variance",
        result.explained_variance_ratio[1] * 100.0
    );
    write_pca_results_to_file(&result, output_path)?;
    Ok(result)
}
