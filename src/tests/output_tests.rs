#[cfg(test)]
mod output_tests {
    use crate::ancestry::join_ancestry;
    use crate::groups::{GroupRules, SampleFrequency};
    use crate::matrix::build_matrix;
    use crate::output::*;
    use crate::process::Region;
    use crate::tests::{call, lookup, manifest, ALT, HET, REF};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sample_frequencies_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(FREQUENCY_FILE);
        let frequencies = vec![
            SampleFrequency {
                sample: "HG00096".to_string(),
                frequency: Some(1.0 / 3.0),
                groups: vec!["High".to_string()],
            },
            SampleFrequency {
                sample: "NA18486".to_string(),
                frequency: None,
                groups: vec!["High".to_string(), "Low".to_string()],
            },
            SampleFrequency {
                sample: "HG01879".to_string(),
                frequency: Some(0.0),
                groups: vec![],
            },
        ];
        write_sample_frequencies(&frequencies, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Sample,Allele_frequency,Group");
        assert_eq!(lines[1], "HG00096,0.333333,High");
        assert_eq!(lines[2], "NA18486,NaN,High+Low");
        assert_eq!(lines[3], "HG01879,0.000000,");

        let reloaded = read_sample_frequencies(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded[0].frequency, Some(0.333333));
        assert_eq!(reloaded[1].frequency, None);
        assert_eq!(reloaded[1].groups, frequencies[1].groups);
        assert!(reloaded[2].groups.is_empty());

        // Writing the reloaded table again reproduces the file byte for byte
        let again = dir.path().join("again.csv");
        write_sample_frequencies(&reloaded, &again).unwrap();
        assert_eq!(fs::read_to_string(&again).unwrap(), text);
    }

    #[test]
    fn test_count_matrix_union_of_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MATRIX_FILE);
        let first = manifest(&["S1", "S2"]);
        let second = manifest(&["S2", "S3"]);
        let a = build_matrix(
            Region::new(3, 0, 1000).unwrap(),
            &[call(100, &first, &[REF, ALT]), call(200, &first, &[HET, REF])],
        )
        .unwrap();
        let b = build_matrix(Region::new(4, 1000, 2000).unwrap(), &[call(1500, &second, &[HET, ALT])]).unwrap();
        write_count_matrix(&[a, b], &path).unwrap();

        let stored = read_count_matrix(&path).unwrap();
        assert_eq!(stored.columns, vec!["Exon3_100", "Exon3_200", "Exon4_1500"]);
        assert_eq!(
            stored.rows,
            vec![
                ("S1".to_string(), vec![Some(0), Some(1), None]),
                ("S2".to_string(), vec![Some(2), Some(0), Some(1)]),
                ("S3".to_string(), vec![None, None, Some(2)]),
            ]
        );
    }

    #[test]
    fn test_joined_matrix_has_labels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MATRIX_POP_FILE);
        let samples = manifest(&["S1", "S2", "S3"]);
        let matrix = build_matrix(
            Region::new(3, 0, 1000).unwrap(),
            &[call(100, &samples, &[REF, ALT, HET])],
        )
        .unwrap();
        let mut table = join_ancestry(
            &matrix,
            &lookup(&[("S1", "GBR", "EUR"), ("S3", "GIH", "SAS")]),
        );
        table.assign_groups(&GroupRules::default());
        write_joined_matrix(&[table], &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Sample,Exon3_100,Population,Super_population,Group");
        assert_eq!(lines[1], "S1,0,GBR,EUR,High");
        assert_eq!(lines[2], "S3,1,GIH,SAS,");
        assert_eq!(lines.len(), 3);

        let stored = read_count_matrix(&path).unwrap();
        assert_eq!(stored.columns, vec!["Exon3_100"]);
        assert_eq!(stored.rows[1], ("S3".to_string(), vec![Some(1)]));
    }
}
