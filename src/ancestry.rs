use crate::groups::GroupRules;
use crate::matrix::AlleleCountMatrix;
use crate::process::Region;

use log::debug;
use ndarray::{Array2, ArrayView1, Axis};
use std::collections::HashMap;

/// Population labels of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestry {
    pub population: String,
    pub super_population: String,
}

/// Read-only sample id -> ancestry mapping loaded from the sample panel.
#[derive(Debug, Clone, Default)]
pub struct AncestryLookup {
    entries: HashMap<String, Ancestry>,
}

impl AncestryLookup {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Ancestry)>,
        S: Into<String>,
    {
        AncestryLookup {
            entries: entries.into_iter().map(|(id, a)| (id.into(), a)).collect(),
        }
    }

    pub fn get(&self, sample: &str) -> Option<&Ancestry> {
        self.entries.get(sample)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A region's allele counts restricted to annotated samples, with the
/// population and super-population columns trailing the position columns.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTable {
    region: Region,
    samples: Vec<String>,
    positions: Vec<i64>,
    counts: Array2<u8>,
    population: Vec<String>,
    super_population: Vec<String>,
    groups: Option<Vec<Vec<String>>>,
}

/// Inner join of the matrix rows against `lookup`. Rows keep the matrix
/// order; samples without an ancestry entry are dropped.
pub fn join_ancestry(matrix: &AlleleCountMatrix, lookup: &AncestryLookup) -> JoinedTable {
    let mut kept_rows = Vec::new();
    let mut samples = Vec::new();
    let mut population = Vec::new();
    let mut super_population = Vec::new();

    for (row, name) in matrix.samples().names().iter().enumerate() {
        if let Some(ancestry) = lookup.get(name) {
            kept_rows.push(row);
            samples.push(name.clone());
            population.push(ancestry.population.clone());
            super_population.push(ancestry.super_population.clone());
        }
    }

    let dropped = matrix.n_samples() - kept_rows.len();
    if dropped > 0 {
        debug!(
            "{}: {} of {} samples have no ancestry annotation and were dropped",
            matrix.region(),
            dropped,
            matrix.n_samples()
        );
    }

    let counts = if kept_rows.is_empty() || matrix.is_empty() {
        Array2::zeros((kept_rows.len(), matrix.n_positions()))
    } else {
        matrix.counts().select(Axis(0), &kept_rows)
    };

    JoinedTable {
        region: matrix.region(),
        samples,
        positions: matrix.positions().to_vec(),
        counts,
        population,
        super_population,
        groups: None,
    }
}

impl JoinedTable {
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn positions(&self) -> &[i64] {
        &self.positions
    }

    pub fn counts(&self) -> &Array2<u8> {
        &self.counts
    }

    pub fn population(&self) -> &[String] {
        &self.population
    }

    pub fn super_population(&self) -> &[String] {
        &self.super_population
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn n_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, u8> {
        self.counts.row(i)
    }

    /// Rows whose super-population satisfies `predicate`.
    pub fn rows_where<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&str) -> bool,
    {
        self.super_population
            .iter()
            .enumerate()
            .filter(|(_, sp)| predicate(sp))
            .map(|(i, _)| i)
            .collect()
    }

    /// Appends the group label column: every rule a sample matches.
    pub fn assign_groups(&mut self, rules: &GroupRules) {
        let groups = self
            .super_population
            .iter()
            .map(|sp| rules.labels_for(sp).into_iter().map(String::from).collect())
            .collect();
        self.groups = Some(groups);
    }

    /// Group labels of row `i`, or `None` before `assign_groups`.
    pub fn groups_of(&self, i: usize) -> Option<&[String]> {
        self.groups.as_ref().map(|g| g[i].as_slice())
    }

    pub fn has_groups(&self) -> bool {
        self.groups.is_some()
    }

    /// Position columns in fetch order, then Population, Super_population and,
    /// once assigned, Group.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.positions.iter().map(|p| p.to_string()).collect();
        names.push("Population".to_string());
        names.push("Super_population".to_string());
        if self.groups.is_some() {
            names.push("Group".to_string());
        }
        names
    }
}
