use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn write_inputs(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut vcf = String::from(
        "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tHG1\tHG2\tNA1\tNA2\tHG3\n",
    );
    let calls = [
        (101, ["0|0", "0|1", "1|1", "1|1", "0|0"]),
        (150, ["0|1", "0|0", "1|0", "1|1", "0|1"]),
        (1101, ["0|0", "0|0", "0|1", "1|1", "1|1"]),
        (1190, ["1|1", "0|0", "0|0", "0|1", "0|0"]),
        (2150, ["0|1", "1|1", "0|0", "0|0", "1|0"]),
    ];
    for (pos, gts) in calls.iter() {
        vcf.push_str(&format!("17\t{}\t.\tA\tG\t.\tPASS\t.\tGT\t{}\n", pos, gts.join("\t")));
    }
    fs::write(dir.join("gene.vcf"), vcf)?;

    fs::write(
        dir.join("exons.csv"),
        "Exon;Start_Position;End_Position\nE1;0;10\nE2;10;20\nE3;100;200\nE4;1100;1200\nE5;2100;2200\n",
    )?;
    fs::write(
        dir.join("panel.tsv"),
        "HG1\tGBR\tEUR\nHG2\tCHB\tEAS\nNA1\tYRI\tAFR\nNA2\tPEL\tAMR\nHG3\tCEU\tEUR\n",
    )?;
    Ok(())
}

#[test]
fn test_full_run_writes_every_output() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_inputs(dir.path())?;
    let out = dir.path().join("results");

    let mut cmd = Command::cargo_bin("exonfreq")?;
    cmd.arg("--vcf")
        .arg(dir.path().join("gene.vcf"))
        .arg("--regions")
        .arg(dir.path().join("exons.csv"))
        .arg("--region_skip")
        .arg("2")
        .arg("--panel")
        .arg(dir.path().join("panel.tsv"))
        .arg("--output_dir")
        .arg(&out)
        .arg("--pca")
        .arg("--threads")
        .arg("2");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Exon2: No significant difference between High and Low groups."))
        .stdout(predicate::str::contains("Analysis complete."));

    for name in [
        "exon_matrix.csv",
        "exons_matrix_pop.csv",
        "exons_frequencies.csv",
        "grouped_frequencies.csv",
        "differences.csv",
        "exon_pca.tsv",
    ] {
        assert!(out.join(name).exists(), "{} was not written", name);
    }

    let frequencies = fs::read_to_string(out.join("exons_frequencies.csv"))?;
    let mut lines = frequencies.lines();
    assert_eq!(lines.next(), Some("Sample,Allele_frequency,Group"));
    assert_eq!(lines.next(), Some("HG1,0.400000,High"));

    let matrix = fs::read_to_string(out.join("exon_matrix.csv"))?;
    assert!(matrix.starts_with("Sample,Exon2_101,Exon2_150,Exon3_1101,Exon3_1190,Exon4_2150\n"));
    Ok(())
}

#[test]
fn test_missing_panel_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_inputs(dir.path())?;

    let mut cmd = Command::cargo_bin("exonfreq")?;
    cmd.arg("--vcf")
        .arg(dir.path().join("gene.vcf"))
        .arg("--regions")
        .arg(dir.path().join("exons.csv"))
        .arg("--panel")
        .arg(dir.path().join("absent.tsv"))
        .arg("--output_dir")
        .arg(dir.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Pipeline failed"));
    Ok(())
}

#[test]
fn test_rejects_unknown_comparison_mode() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("exonfreq")?;
    cmd.args(["--vcf", "a.vcf", "--regions", "b.csv", "--panel", "c.tsv", "--comparison", "paired"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
    Ok(())
}
