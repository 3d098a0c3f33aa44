mod ancestry_tests;
mod output_tests;
mod stats_tests;

use crate::ancestry::{Ancestry, AncestryLookup};
use crate::process::VariantCall;
use std::sync::Arc;

pub(crate) fn manifest(names: &[&str]) -> Arc<[String]> {
    names.iter().map(|s| s.to_string()).collect::<Vec<_>>().into()
}

/// A record whose calls are given as allele pairs.
pub(crate) fn call(position: i64, samples: &Arc<[String]>, pairs: &[(Option<u8>, Option<u8>)]) -> VariantCall {
    VariantCall {
        position,
        samples: Arc::clone(samples),
        genotypes: pairs.iter().map(|&(a, b)| vec![a, b]).collect(),
    }
}

pub(crate) fn lookup(entries: &[(&str, &str, &str)]) -> AncestryLookup {
    AncestryLookup::from_entries(entries.iter().map(|&(sample, pop, super_pop)| {
        (
            sample,
            Ancestry {
                population: pop.to_string(),
                super_population: super_pop.to_string(),
            },
        )
    }))
}

pub(crate) const REF: (Option<u8>, Option<u8>) = (Some(0), Some(0));
pub(crate) const HET: (Option<u8>, Option<u8>) = (Some(0), Some(1));
pub(crate) const ALT: (Option<u8>, Option<u8>) = (Some(1), Some(1));
pub(crate) const MISSING: (Option<u8>, Option<u8>) = (None, None);
