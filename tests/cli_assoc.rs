use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn command_assoc() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let records = temp.path().join("hosts.tsv");

    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd
        .arg("assoc")
        .arg("tests/assoc/norm")
        .arg("--bins")
        .arg("tests/assoc/bins.tsv")
        .arg("--tiers")
        .arg("tests/assoc/tiers.tsv")
        .arg("--records")
        .arg(&records)
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;

    // m1-m2 is skipped, m2 is an MGE despite its host bin
    assert_eq!(
        stdout,
        "#tier\tmge_contigs\tcontacts\tattributed\n\
         High-quality\t2\t3\t2\n\
         Medium-quality\t1\t0\t0\n"
    );

    let records = fs::read_to_string(&records)?;
    assert_eq!(
        records,
        "#mge\ttier\thost_bin\tweight\n\
         m1\tHigh-quality\tbinA\t4.0000\n\
         m3\tHigh-quality\tbinB\t2.5000\n"
    );

    Ok(())
}

#[test]
fn command_assoc_consensus_bins() -> anyhow::Result<()> {
    // the four-column consensus output is accepted as host bins
    let temp = TempDir::new()?;
    let bins = temp.path().join("consensus.tsv");
    fs::write(
        &bins,
        "#contig\tbin\tagreement\tresolution\nhA1\tbinA\t3\tmajority\nhA2\tbinA\t2\tmajority\nhB1\t-\t0\tunassigned\n",
    )?;

    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd
        .arg("assoc")
        .arg("tests/assoc/norm")
        .arg("--bins")
        .arg(&bins)
        .arg("--tiers")
        .arg("tests/assoc/tiers.tsv")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("High-quality\t2\t2\t2\n"));

    Ok(())
}

#[test]
fn command_assoc_bad_tiers() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let tiers = temp.path().join("tiers.tsv");
    fs::write(&tiers, "m1\n")?;

    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("assoc")
        .arg("tests/assoc/norm")
        .arg("--bins")
        .arg("tests/assoc/bins.tsv")
        .arg("--tiers")
        .arg(&tiers);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("tier line without two columns"));

    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn command_assoc_write_error() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("assoc")
        .arg("tests/assoc/norm")
        .arg("--bins")
        .arg("tests/assoc/bins.tsv")
        .arg("--tiers")
        .arg("tests/assoc/tiers.tsv")
        .arg("-o")
        .arg("/dev/full");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No space left"));

    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("assoc")
        .arg("tests/assoc/norm")
        .arg("--bins")
        .arg("tests/assoc/bins.tsv")
        .arg("--tiers")
        .arg("tests/assoc/tiers.tsv")
        .arg("--records")
        .arg("/dev/full");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No space left"));

    Ok(())
}
