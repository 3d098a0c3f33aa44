use crate::ancestry::JoinedTable;
use crate::process::{ExonError, Region};

use itertools::Itertools;
use log::warn;
use std::collections::{BTreeSet, HashMap};

pub const HIGH_LABEL: &str = "High";
pub const LOW_LABEL: &str = "Low";

/// Lower bound on the Low frequency in the percent-difference denominator.
/// Low frequencies near zero inflate the percentage; this is a known
/// approximation.
pub const PERCENT_DIFFERENCE_FLOOR: f64 = 1e-6;

/// A named group defined by membership of the super-population label in a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRule {
    label: String,
    members: BTreeSet<String>,
}

impl GroupRule {
    pub fn new<I, S>(label: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        GroupRule {
            label: label.into(),
            members: members
                .into_iter()
                .map(|m| m.as_ref().trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn matches(&self, super_population: &str) -> bool {
        self.members.contains(super_population)
    }
}

/// Ordered group rules. The first two are the primary pair compared by the
/// statistics. Rules need not be disjoint nor exhaustive: a sample matching no
/// rule belongs to no group, and a sample matching several rules is counted
/// in each of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRules {
    rules: Vec<GroupRule>,
}

impl GroupRules {
    pub fn new(rules: Vec<GroupRule>) -> Result<Self, ExonError> {
        if rules.len() < 2 {
            return Err(ExonError::InvalidGroups(format!(
                "at least two groups are required, found {}",
                rules.len()
            )));
        }
        if let Some(rule) = rules.iter().find(|r| r.members.is_empty()) {
            return Err(ExonError::InvalidGroups(format!(
                "group '{}' has no super-populations",
                rule.label
            )));
        }
        if let Some(label) = rules.iter().map(|r| &r.label).duplicates().next() {
            return Err(ExonError::InvalidGroups(format!(
                "group label '{}' is used twice",
                label
            )));
        }
        for (a, b) in rules.iter().tuple_combinations() {
            let shared: Vec<&String> = a.members.intersection(&b.members).collect();
            if !shared.is_empty() {
                warn!(
                    "Groups '{}' and '{}' share {}; those samples count in both",
                    a.label,
                    b.label,
                    shared.iter().join(", ")
                );
            }
        }
        Ok(GroupRules { rules })
    }

    /// The usual High/Low pair.
    pub fn high_low<S: AsRef<str>>(high: &[S], low: &[S]) -> Result<Self, ExonError> {
        GroupRules::new(vec![
            GroupRule::new(HIGH_LABEL, high),
            GroupRule::new(LOW_LABEL, low),
        ])
    }

    pub fn rules(&self) -> &[GroupRule] {
        &self.rules
    }

    pub fn primary(&self) -> (&GroupRule, &GroupRule) {
        (&self.rules[0], &self.rules[1])
    }

    /// Labels of every rule matching `super_population`, in rule order.
    pub fn labels_for(&self, super_population: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.matches(super_population))
            .map(|r| r.label())
            .collect()
    }
}

impl Default for GroupRules {
    fn default() -> Self {
        GroupRules {
            rules: vec![
                GroupRule::new(HIGH_LABEL, ["EUR", "EAS"]),
                GroupRule::new(LOW_LABEL, ["AFR", "AMR"]),
            ],
        }
    }
}

/// Joins group labels for the single Group column; empty when there are none.
pub fn group_label(groups: &[String]) -> String {
    groups.join("+")
}

/// Pooled alternate-allele frequency of one group in one region.
/// `frequency` is `None` when the group has no samples or the region no positions.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedFrequency {
    pub region: Region,
    pub group: String,
    pub samples: usize,
    pub positions: usize,
    pub alt_alleles: u64,
    pub frequency: Option<f64>,
}

pub fn pooled_frequency(table: &JoinedTable, rule: &GroupRule) -> GroupedFrequency {
    let rows = table.rows_where(|sp| rule.matches(sp));
    let alt_alleles: u64 = rows
        .iter()
        .map(|&i| table.row(i).iter().map(|&c| c as u64).sum::<u64>())
        .sum();
    let total_alleles = 2 * rows.len() * table.n_positions();
    let frequency = if total_alleles > 0 {
        Some(alt_alleles as f64 / total_alleles as f64)
    } else {
        None
    };
    GroupedFrequency {
        region: table.region(),
        group: rule.label().to_string(),
        samples: rows.len(),
        positions: table.n_positions(),
        alt_alleles,
        frequency,
    }
}

/// One pooled frequency per rule for the table's region.
pub fn aggregate_groups(table: &JoinedTable, rules: &GroupRules) -> Vec<GroupedFrequency> {
    rules
        .rules()
        .iter()
        .map(|rule| pooled_frequency(table, rule))
        .collect()
}

/// Signed and percent difference between the two primary groups of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceRecord {
    pub region: Region,
    pub high: f64,
    pub low: f64,
    pub difference: f64,
    pub percent_difference: f64,
}

/// Defined only when both frequencies are defined.
pub fn difference(high: &GroupedFrequency, low: &GroupedFrequency) -> Option<DifferenceRecord> {
    let (h, l) = (high.frequency?, low.frequency?);
    let diff = h - l;
    Some(DifferenceRecord {
        region: high.region,
        high: h,
        low: l,
        difference: diff,
        percent_difference: diff / l.max(PERCENT_DIFFERENCE_FLOOR) * 100.0,
    })
}

/// Frequency of each member of `rule` within one region. Empty when the
/// region has no positions.
pub fn sample_frequencies_in_region(table: &JoinedTable, rule: &GroupRule) -> Vec<f64> {
    if table.n_positions() == 0 {
        return Vec::new();
    }
    let total_alleles = (2 * table.n_positions()) as f64;
    table
        .rows_where(|sp| rule.matches(sp))
        .into_iter()
        .map(|i| table.row(i).iter().map(|&c| c as f64).sum::<f64>() / total_alleles)
        .collect()
}

/// A sample's alternate-allele frequency across all regions.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrequency {
    pub sample: String,
    pub frequency: Option<f64>,
    pub groups: Vec<String>,
}

impl SampleFrequency {
    pub fn group_label(&self) -> String {
        group_label(&self.groups)
    }
}

/// Per-sample frequency over every region's positions. The denominator is two
/// alleles per position across all regions; no positions at all leaves every
/// frequency undefined. Samples appear in first-seen order.
pub fn per_sample_frequencies(tables: &[JoinedTable], rules: &GroupRules) -> Vec<SampleFrequency> {
    let total_positions: usize = tables.iter().map(|t| t.n_positions()).sum();
    let mut order: Vec<SampleFrequency> = Vec::new();
    let mut alt: Vec<u64> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for table in tables {
        for (i, sample) in table.samples().iter().enumerate() {
            let slot = *index.entry(sample.clone()).or_insert_with(|| {
                order.push(SampleFrequency {
                    sample: sample.clone(),
                    frequency: None,
                    groups: rules
                        .labels_for(&table.super_population()[i])
                        .into_iter()
                        .map(String::from)
                        .collect(),
                });
                alt.push(0);
                order.len() - 1
            });
            alt[slot] += table.row(i).iter().map(|&c| c as u64).sum::<u64>();
        }
    }

    if total_positions > 0 {
        let denominator = (2 * total_positions) as f64;
        for (entry, &count) in order.iter_mut().zip(&alt) {
            entry.frequency = Some(count as f64 / denominator);
        }
    }
    order
}

/// Mean per-sample frequency of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMean {
    pub group: String,
    pub samples: usize,
    pub mean: Option<f64>,
}

pub fn group_means(frequencies: &[SampleFrequency], rules: &GroupRules) -> Vec<GroupMean> {
    rules
        .rules()
        .iter()
        .map(|rule| {
            let values: Vec<f64> = frequencies
                .iter()
                .filter(|f| f.groups.iter().any(|g| g == rule.label()))
                .filter_map(|f| f.frequency)
                .collect();
            let mean = if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            };
            GroupMean {
                group: rule.label().to_string(),
                samples: values.len(),
                mean,
            }
        })
        .collect()
}
