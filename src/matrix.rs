use crate::process::{ExonError, Region, VariantCall};

use log::debug;
use ndarray::{Array2, ArrayView1, Axis};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered, duplicate-free set of sample ids, fixed once per region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleIndex {
    names: Vec<String>,
    rows: HashMap<String, usize>,
}

impl SampleIndex {
    pub fn from_manifest(manifest: &[String]) -> Result<Self, ExonError> {
        let mut rows = HashMap::with_capacity(manifest.len());
        for (i, name) in manifest.iter().enumerate() {
            if rows.insert(name.clone(), i).is_some() {
                return Err(ExonError::ShapeMismatch(format!(
                    "sample '{}' appears more than once in the record manifest",
                    name
                )));
            }
        }
        Ok(SampleIndex {
            names: manifest.to_vec(),
            rows,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn row(&self, name: &str) -> Option<usize> {
        self.rows.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// True when `manifest` lists exactly these samples in this order.
    pub fn matches(&self, manifest: &[String]) -> bool {
        self.names.as_slice() == manifest
    }
}

/// Alternate-allele counts for one region: rows are samples, columns are
/// record positions in fetch order. Every cell is 0, 1 or 2.
#[derive(Debug, Clone, PartialEq)]
pub struct AlleleCountMatrix {
    region: Region,
    samples: SampleIndex,
    positions: Vec<i64>,
    counts: Array2<u8>,
}

impl AlleleCountMatrix {
    /// The zero-by-zero matrix of a region without records.
    pub fn empty(region: Region) -> Self {
        AlleleCountMatrix {
            region,
            samples: SampleIndex::default(),
            positions: Vec::new(),
            counts: Array2::zeros((0, 0)),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn samples(&self) -> &SampleIndex {
        &self.samples
    }

    pub fn positions(&self) -> &[i64] {
        &self.positions
    }

    pub fn counts(&self) -> &Array2<u8> {
        &self.counts
    }

    pub fn n_samples(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_positions(&self) -> usize {
        self.counts.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn sample_row(&self, name: &str) -> Option<ArrayView1<'_, u8>> {
        self.samples.row(name).map(|i| self.counts.row(i))
    }

    /// Column headers in the `Exon<n>_<position>` form used by the CSV outputs.
    pub fn column_labels(&self) -> Vec<String> {
        self.positions
            .iter()
            .map(|pos| format!("{}_{}", self.region, pos))
            .collect()
    }

    pub fn total_alt_alleles(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn alt_alleles_per_sample(&self) -> Vec<u64> {
        self.counts
            .axis_iter(Axis(0))
            .map(|row| row.iter().map(|&c| c as u64).sum())
            .collect()
    }
}

/// Number of non-reference alleles in one call. Missing alleles count as reference.
pub fn alt_allele_count(alleles: &[Option<u8>]) -> u8 {
    alleles
        .iter()
        .filter(|allele| matches!(allele, Some(a) if *a > 0))
        .count() as u8
}

/// Builds the allele-count matrix of `region` from its fetched records.
///
/// The first record's sample manifest fixes the row order. A later record
/// listing a different manifest is a `ShapeMismatch`; a record whose calls are
/// not one diploid pair per sample is a `MalformedRecord`. No records gives
/// the empty matrix.
pub fn build_matrix(region: Region, records: &[VariantCall]) -> Result<AlleleCountMatrix, ExonError> {
    let first = match records.first() {
        Some(first) => first,
        None => {
            debug!("{}: no records, empty matrix", region);
            return Ok(AlleleCountMatrix::empty(region));
        }
    };

    let samples = SampleIndex::from_manifest(&first.samples)?;
    let mut counts = Array2::<u8>::zeros((samples.len(), records.len()));
    let mut positions = Vec::with_capacity(records.len());

    for (col, record) in records.iter().enumerate() {
        if !Arc::ptr_eq(&record.samples, &first.samples) && !samples.matches(&record.samples)
        {
            return Err(ExonError::ShapeMismatch(format!(
                "{}: record at position {} lists {} samples that differ from the {} samples of the first record",
                region,
                record.position,
                record.samples.len(),
                samples.len()
            )));
        }
        if record.genotypes.len() != samples.len() {
            return Err(ExonError::MalformedRecord(format!(
                "{}: record at position {} has {} genotype calls for {} samples",
                region,
                record.position,
                record.genotypes.len(),
                samples.len()
            )));
        }
        for (row, alleles) in record.genotypes.iter().enumerate() {
            if alleles.len() != 2 {
                return Err(ExonError::MalformedRecord(format!(
                    "{}: sample '{}' at position {} has {} allele indices, expected 2",
                    region,
                    samples.names()[row],
                    record.position,
                    alleles.len()
                )));
            }
            counts[[row, col]] = alt_allele_count(alleles);
        }
        positions.push(record.position);
    }

    debug!(
        "{}: built {} x {} allele-count matrix",
        region,
        samples.len(),
        positions.len()
    );

    Ok(AlleleCountMatrix {
        region,
        samples,
        positions,
        counts,
    })
}
