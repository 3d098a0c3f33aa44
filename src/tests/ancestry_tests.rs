#[cfg(test)]
mod ancestry_tests {
    use crate::ancestry::*;
    use crate::groups::GroupRules;
    use crate::matrix::{build_matrix, AlleleCountMatrix};
    use crate::process::Region;
    use crate::tests::{call, lookup, manifest, ALT, HET, REF};

    fn matrix() -> AlleleCountMatrix {
        let samples = manifest(&["S1", "S2", "S3"]);
        let records = vec![
            call(100, &samples, &[REF, ALT, HET]),
            call(200, &samples, &[HET, REF, ALT]),
        ];
        build_matrix(Region::new(4, 0, 500).unwrap(), &records).unwrap()
    }

    #[test]
    fn test_inner_join_drops_unannotated_samples() {
        let panel = lookup(&[("S3", "YRI", "AFR"), ("S1", "CEU", "EUR"), ("NA0", "JPT", "EAS")]);
        let table = join_ancestry(&matrix(), &panel);

        assert_eq!(table.samples(), &["S1".to_string(), "S3".to_string()]);
        assert_eq!(table.population(), &["CEU".to_string(), "YRI".to_string()]);
        assert_eq!(table.super_population(), &["EUR".to_string(), "AFR".to_string()]);
        assert_eq!(table.row(0).to_vec(), vec![0, 1]);
        assert_eq!(table.row(1).to_vec(), vec![1, 2]);
        assert_eq!(table.positions(), &[100, 200]);
    }

    #[test]
    fn test_no_annotated_samples_gives_empty_table() {
        let table = join_ancestry(&matrix(), &lookup(&[("X", "CEU", "EUR")]));
        assert_eq!(table.n_samples(), 0);
        assert_eq!(table.n_positions(), 2);
        assert_eq!(table.counts().dim(), (0, 2));
    }

    #[test]
    fn test_empty_matrix_joins_to_empty_table() {
        let empty = AlleleCountMatrix::empty(Region::new(5, 10, 20).unwrap());
        let table = join_ancestry(&empty, &lookup(&[("S1", "CEU", "EUR")]));
        assert_eq!(table.n_samples(), 0);
        assert_eq!(table.n_positions(), 0);
    }

    #[test]
    fn test_group_column_lists_every_matching_rule() {
        let panel = lookup(&[("S1", "CEU", "EUR"), ("S2", "PEL", "AMR"), ("S3", "GIH", "SAS")]);
        let mut table = join_ancestry(&matrix(), &panel);
        assert!(!table.has_groups());
        assert_eq!(table.column_names(), vec!["100", "200", "Population", "Super_population"]);

        let rules = GroupRules::high_low(&["EUR", "AMR"], &["AMR", "AFR"]).unwrap();
        table.assign_groups(&rules);

        assert_eq!(table.groups_of(0).unwrap(), &["High".to_string()]);
        assert_eq!(table.groups_of(1).unwrap(), &["High".to_string(), "Low".to_string()]);
        assert!(table.groups_of(2).unwrap().is_empty());
        assert_eq!(table.column_names().last().map(String::as_str), Some("Group"));
    }
}
