use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn contact_cmd(outdir: &std::path::Path, min_signal: &str) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("contact")
        .arg("tests/hic/reads.sam")
        .arg("--fasta")
        .arg("tests/hic/asm.fa")
        .arg("--min-len")
        .arg("25")
        .arg("--min-match")
        .arg("10")
        .arg("--min-signal")
        .arg(min_signal)
        .arg("-o")
        .arg(outdir);
    Ok(cmd)
}

#[test]
fn command_contact() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let outdir = temp.path().join("raw");
    let stats = temp.path().join("extract.tsv");

    let mut cmd = contact_cmd(&outdir, "1")?;
    cmd.arg("--stats").arg(&stats).arg("--parallel").arg("2");
    cmd.assert().success();

    let contigs = fs::read_to_string(outdir.join("contigs.tsv"))?;
    assert_eq!(
        contigs,
        fs::read_to_string("tests/hic/raw/contigs.tsv")?,
        "contig table"
    );
    let contacts = fs::read_to_string(outdir.join("contacts.tsv"))?;
    assert_eq!(
        contacts,
        fs::read_to_string("tests/hic/raw/contacts.tsv")?,
        "contacts"
    );

    let stats = fs::read_to_string(&stats)?;
    assert!(stats.contains("pairs\t10\n"));
    assert!(stats.contains("qualifying\t4\n"));
    assert!(stats.contains("intra\t1\n"));
    assert!(stats.contains("unmapped\t1\n"));
    assert!(stats.contains("duplicate\t1\n"));
    assert!(stats.contains("low_mapq\t1\n"));
    assert!(stats.contains("short_match\t1\n"));
    assert!(stats.contains("short_contig\t1\n"));
    assert!(stats.contains("contigs_total\t5\n"));
    assert!(stats.contains("contigs_eligible\t4\n"));
    assert!(stats.contains("contigs_retained\t3\n"));
    assert!(stats.contains("enrichment_ratio\t0.2500\n"));

    Ok(())
}

#[test]
fn command_contact_min_signal() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let outdir = temp.path().join("raw");

    let mut cmd = contact_cmd(&outdir, "3")?;
    cmd.assert().success();

    let contigs = fs::read_to_string(outdir.join("contigs.tsv"))?;
    assert_eq!(contigs.lines().count(), 3);
    assert!(contigs.contains("0\tctgA\t60\t3\t3\tNA\n"));
    assert!(contigs.contains("1\tctgB\t50\t2\t3\tNA\n"));

    let contacts = fs::read_to_string(outdir.join("contacts.tsv"))?;
    assert_eq!(contacts, "#i\tj\tweight\n0\t1\t2\n");

    // overwrite an existing artifact
    let mut cmd = contact_cmd(&outdir, "1")?;
    cmd.assert().success();
    let contigs = fs::read_to_string(outdir.join("contigs.tsv"))?;
    assert_eq!(contigs.lines().count(), 4);

    Ok(())
}

#[test]
fn command_contact_unknown_enzyme() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let outdir = temp.path().join("raw");

    let mut cmd = contact_cmd(&outdir, "1")?;
    cmd.arg("--enzyme").arg("Sau3AI,EcoFoo");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown restriction enzyme `EcoFoo`"));
    assert!(!outdir.exists());

    Ok(())
}

#[test]
fn command_stat() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd.arg("stat").arg("tests/assoc/norm").output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert!(stdout.contains("contigs\t6\n"));
    assert!(stdout.contains("contacts\t5\n"));
    assert!(stdout.contains("total_weight\t24.5000\n"));
    assert!(stdout.contains("signal\t48\n"));
    assert!(stdout.contains("size\t16500\n"));
    assert!(stdout.contains("n50\t4000\n"));
    assert!(stdout.contains("l50\t2\n"));

    Ok(())
}

#[test]
fn command_stat_corrupt() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    fs::copy("tests/hic/raw/contigs.tsv", temp.path().join("contigs.tsv"))?;
    fs::write(temp.path().join("contacts.tsv"), "0\t1\t2\n0\t7\t1\n")?;

    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("stat").arg(temp.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid contact artifact"));

    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn command_contact_stats_write_error() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let mut cmd = contact_cmd(&temp.path().join("raw"), "1")?;
    cmd.arg("--stats").arg("/dev/full");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No space left"));

    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("stat").arg("tests/assoc/norm").arg("-o").arg("/dev/full");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No space left"));

    Ok(())
}
