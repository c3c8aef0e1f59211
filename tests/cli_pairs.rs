use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn command_invalid() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("foobar");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("recognized"));

    Ok(())
}

#[test]
fn command_pairs() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd.arg("pairs").arg("tests/hic/reads.sam").output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(stdout.lines().count(), 16);
    assert!(stdout.contains("total\t10\n"));
    assert!(stdout.contains("informative\t7\n"));
    assert!(stdout.contains("chimeric\t8\n"));
    assert!(stdout.contains("intra\t1\n"));
    assert!(stdout.contains("inter\t8\n"));
    assert!(stdout.contains("informative_ratio\t0.7000\n"));
    assert!(stdout.contains("long_range_ratio\t4.0000\n"));
    assert!(stdout.contains("ratio_3d\t8.0000\n"));

    // r5 is the only pair with a template length
    assert!(stdout.contains("insert_sizes\t1\n"));
    assert!(stdout.contains("pi_chimeric\t0.0000\n"));
    assert!(stdout.contains("insert_cutoff\t100.00\n"));
    assert!(stdout.contains("mixture_long_range_ratio\t0.8889\n"));

    Ok(())
}

#[test]
fn command_pairs_outfile() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let out = temp.path().join("pairs.tsv");

    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("pairs")
        .arg("tests/hic/reads.sam")
        .arg("--top-k")
        .arg("1")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    // ctgA is the longest contig and carries r5
    let content = fs::read_to_string(&out)?;
    assert!(content.starts_with("total\t10\n"));
    assert!(content.contains("insert_sizes\t1\n"));
    assert!(content.ends_with("\n"));
    assert_eq!(content.lines().count(), 16);

    Ok(())
}

#[test]
fn command_pairs_distance() -> anyhow::Result<()> {
    // r5 has its ends 35 bp apart on ctgA
    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd
        .arg("pairs")
        .arg("tests/hic/reads.sam")
        .arg("--distance")
        .arg("30")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("informative\t8\n"));

    Ok(())
}

#[test]
fn command_pairs_stdin_gz() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let gz = temp.path().join("reads.sam.gz");
    {
        let file = fs::File::create(&gz)?;
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &fs::read("tests/hic/reads.sam")?)?;
        encoder.finish()?;
    }

    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd.arg("pairs").arg(&gz).output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("total\t10\n"));

    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd
        .arg("pairs")
        .arg("stdin")
        .write_stdin(fs::read("tests/hic/reads.sam")?)
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("chimeric\t8\n"));

    Ok(())
}

#[test]
fn command_pairs_empty() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("hicbin")?;
    let output = cmd
        .arg("pairs")
        .arg("stdin")
        .write_stdin("@HD\tVN:1.6\n")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("total\t0\n"));
    assert!(stdout.contains("informative_ratio\t0.0000\n"));
    assert!(stdout.contains("ratio_3d\t0.0000\n"));

    Ok(())
}

#[test]
fn command_pairs_unsorted() -> anyhow::Result<()> {
    let sam = "@SQ\tSN:ctgA\tLN:60\n@SQ\tSN:ctgB\tLN:50\n\
r1\t65\tctgA\t1\t60\t20M\t*\t0\t0\t*\t*\n\
r2\t65\tctgA\t1\t60\t20M\t*\t0\t0\t*\t*\n\
r1\t129\tctgB\t1\t60\t20M\t*\t0\t0\t*\t*\n\
r2\t129\tctgB\t1\t60\t20M\t*\t0\t0\t*\t*\n";

    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("pairs").arg("stdin").write_stdin(sam);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("not grouped by read name"));

    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn command_pairs_write_error() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("hicbin")?;
    cmd.arg("pairs")
        .arg("tests/hic/reads.sam")
        .arg("-o")
        .arg("/dev/full");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No space left"));

    Ok(())
}

#[test]
fn command_pairs_bam() -> anyhow::Result<()> {
    use noodles::sam::alignment::io::Write as _;
    use noodles::{bam, sam};

    let temp = TempDir::new()?;
    let bam_path = temp.path().join("reads.bam");
    {
        let mut reader = sam::io::Reader::new(std::io::BufReader::new(fs::File::open(
            "tests/hic/reads.sam",
        )?));
        let header = reader.read_header()?;
        let mut writer = bam::io::Writer::new(fs::File::create(&bam_path)?);
        writer.write_header(&header)?;
        for result in reader.record_bufs(&header) {
            let record = result?;
            writer.write_alignment_record(&header, &record)?;
        }
        writer.try_finish()?;
    }

    let mut cmd = Command::cargo_bin("hicbin")?;
    let from_bam = cmd.arg("pairs").arg(&bam_path).output()?;
    assert!(from_bam.status.success());

    let mut cmd = Command::cargo_bin("hicbin")?;
    let from_sam = cmd.arg("pairs").arg("tests/hic/reads.sam").output()?;
    assert_eq!(from_bam.stdout, from_sam.stdout);

    let stdout = String::from_utf8(from_bam.stdout)?;
    assert!(stdout.contains("informative\t7\n"));
    assert!(stdout.contains("insert_sizes\t1\n"));

    Ok(())
}
