//! Alignment records read through noodles.
//!
//! SAM text and BAM are both accepted. The format is sniffed from the first
//! bytes of the stream: BGZF blocks open with the gzip magic, anything else is
//! parsed as SAM text. Only the fields the contact graph needs are kept.

use crate::libs::error::HicError;
use noodles::sam::alignment::record::cigar::op::Kind as CigarKind;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::RecordBuf;
use noodles::{bam, sam};
use std::io::{self, BufRead, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamRecord {
    pub qname: String,
    pub flags: Flags,
    /// `*` when the record has no reference sequence
    pub rname: String,
    /// 1-based leftmost position, 0 when unavailable
    pub pos: u64,
    /// 0 when the mapping quality is missing
    pub mapq: u8,
    /// Aligned bases: the sum of `M`, `=` and `X` operations
    pub match_len: u32,
    pub tlen: i32,
}

impl SamRecord {
    pub fn from_record_buf(record: &RecordBuf, names: &[String]) -> Self {
        let qname = record
            .name()
            .map(|name| name.to_string())
            .unwrap_or_default();
        let rname = record
            .reference_sequence_id()
            .and_then(|id| names.get(id))
            .cloned()
            .unwrap_or_else(|| "*".to_string());
        let match_len = record
            .cigar()
            .as_ref()
            .iter()
            .filter(|op| {
                matches!(
                    op.kind(),
                    CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch
                )
            })
            .map(|op| op.len() as u32)
            .sum();

        Self {
            qname: strip_mate_suffix(&qname).to_string(),
            flags: record.flags(),
            rname,
            pos: record
                .alignment_start()
                .map(|p| usize::from(p) as u64)
                .unwrap_or(0),
            mapq: record.mapping_quality().map(|q| q.get()).unwrap_or(0),
            match_len,
            tlen: record.template_length(),
        }
    }

    pub fn is_paired(&self) -> bool {
        self.flags.is_segmented()
    }

    /// Unmapped by flag, or without a reference sequence
    pub fn is_unmapped(&self) -> bool {
        self.flags.is_unmapped() || self.rname == "*"
    }

    pub fn is_duplicate(&self) -> bool {
        self.flags.is_duplicate()
    }

    pub fn is_primary(&self) -> bool {
        !self.flags.is_secondary() && !self.flags.is_supplementary()
    }

    /// First/last segment bits of the record
    pub fn segment(&self) -> Flags {
        self.flags & (Flags::FIRST_SEGMENT | Flags::LAST_SEGMENT)
    }
}

// Some aligners keep the `/1` and `/2` read suffixes
fn strip_mate_suffix(qname: &str) -> &str {
    qname
        .strip_suffix("/1")
        .or_else(|| qname.strip_suffix("/2"))
        .unwrap_or(qname)
}

trait RecordSource {
    fn read_buf(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize>;
}

impl<R: BufRead> RecordSource for sam::io::Reader<R> {
    fn read_buf(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize> {
        self.read_record_buf(header, record)
    }
}

impl<R: Read> RecordSource for bam::io::Reader<R> {
    fn read_buf(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize> {
        self.read_record_buf(header, record)
    }
}

/// Iterates the alignment records of a SAM or BAM stream.
pub struct SamReader<'a> {
    source: Box<dyn RecordSource + 'a>,
    header: sam::Header,
    names: Vec<String>,
    references: Vec<(String, usize)>,
    record: RecordBuf,
    record_no: usize,
    failed: bool,
}

impl<'a> SamReader<'a> {
    /// Reads the header and prepares the record loop.
    pub fn new<R: BufRead + 'a>(mut reader: R) -> anyhow::Result<Self> {
        let is_bam = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        let (source, header): (Box<dyn RecordSource + 'a>, sam::Header) = if is_bam {
            let mut bam_reader = bam::io::Reader::new(reader);
            let header = bam_reader.read_header()?;
            (Box::new(bam_reader), header)
        } else {
            let mut sam_reader = sam::io::Reader::new(reader);
            let header = sam_reader.read_header()?;
            (Box::new(sam_reader), header)
        };

        let references: Vec<(String, usize)> = header
            .reference_sequences()
            .iter()
            .map(|(name, map)| (name.to_string(), usize::from(map.length())))
            .collect();
        let names = references.iter().map(|(name, _)| name.clone()).collect();
        log::debug!(
            "{} header with {} reference sequences",
            if is_bam { "BAM" } else { "SAM" },
            references.len()
        );

        Ok(Self {
            source,
            header,
            names,
            references,
            record: RecordBuf::default(),
            record_no: 0,
            failed: false,
        })
    }

    /// Reference sequences of the header with their lengths, in header order
    pub fn references(&self) -> &[(String, usize)] {
        &self.references
    }
}

impl Iterator for SamReader<'_> {
    type Item = anyhow::Result<SamRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.source.read_buf(&self.header, &mut self.record) {
            Ok(0) => None,
            Ok(_) => {
                self.record_no += 1;
                Some(Ok(SamRecord::from_record_buf(&self.record, &self.names)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(HicError::Parse(format!(
                    "alignment record {}: {}",
                    self.record_no + 1,
                    e
                ))
                .into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "@HD\tVN:1.6\tSO:queryname\n@SQ\tSN:k141_3\tLN:5000\n@SQ\tSN:ctg\tLN:100\n";

    fn records(body: &str) -> anyhow::Result<Vec<SamRecord>> {
        let text = format!("{}{}", HEADER, body);
        let recs = SamReader::new(text.as_bytes())?.collect();
        recs
    }

    #[test]
    fn parse_full_record() {
        let recs = records("read7/1\t1089\tk141_3\t2301\t42\t5S20M1I10=2X\t=\t2500\t300\t*\t*\n").unwrap();
        let rec = &recs[0];
        assert_eq!(rec.qname, "read7");
        assert_eq!(rec.rname, "k141_3");
        assert_eq!(rec.pos, 2301);
        assert_eq!(rec.mapq, 42);
        assert_eq!(rec.tlen, 300);
        assert!(rec.is_paired());
        assert!(rec.is_duplicate());
        assert!(!rec.is_unmapped());
        assert!(rec.is_primary());
        assert_eq!(rec.segment(), Flags::FIRST_SEGMENT);
        assert_eq!(rec.match_len, 32);
    }

    #[test]
    fn unmapped_and_secondary() {
        let recs = records(
            "r\t133\t*\t0\t0\t*\t*\t0\t0\t*\t*\nr\t321\tctg\t5\t0\t10M\t*\t0\t0\t*\t*\nr\t65\tctg\t5\t255\t10M\t*\t0\t0\t*\t*\n",
        )
        .unwrap();
        assert!(recs[0].is_unmapped());
        assert_eq!(recs[0].match_len, 0);
        assert_eq!(recs[0].pos, 0);
        assert!(!recs[1].is_primary());
        // 255 marks a missing quality
        assert_eq!(recs[2].mapq, 0);
    }

    #[test]
    fn reject_bad_records() {
        assert!(records("r\t65\tctg\t5\n").is_err());
        assert!(records("r\tX\tctg\t5\t60\t10M\t*\t0\t0\t*\t*\n").is_err());
        assert!(records("r\t65\tctg\t5\t300\t10M\t*\t0\t0\t*\t*\n").is_err());
        // contig missing from the header
        assert!(records("r\t65\tnope\t5\t60\t10M\t*\t0\t0\t*\t*\n").is_err());
    }

    #[test]
    fn reader_exposes_header() {
        let text = format!("{}r1\t65\tctg\t1\t60\t10M\t*\t0\t0\t*\t*\n", HEADER);
        let reader = SamReader::new(text.as_bytes()).unwrap();
        assert_eq!(
            reader.references(),
            &[("k141_3".to_string(), 5000), ("ctg".to_string(), 100)]
        );
        let records: Vec<_> = reader.collect::<anyhow::Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].qname, "r1");
    }

    #[test]
    fn reads_bam() {
        use noodles::sam::alignment::io::Write as _;

        let text = format!(
            "{}p1\t65\tk141_3\t100\t60\t50M\tctg\t7\t0\t*\t*\np1\t129\tctg\t7\t60\t50M\tk141_3\t100\t0\t*\t*\n",
            HEADER
        );
        let mut sam_reader = sam::io::Reader::new(text.as_bytes());
        let header = sam_reader.read_header().unwrap();

        let mut bam_writer = bam::io::Writer::new(Vec::new());
        bam_writer.write_header(&header).unwrap();
        for result in sam_reader.record_bufs(&header) {
            let record = result.unwrap();
            bam_writer.write_alignment_record(&header, &record).unwrap();
        }
        let bytes = bam_writer.into_inner().finish().unwrap();
        assert!(bytes.starts_with(&GZIP_MAGIC));

        let reader = SamReader::new(bytes.as_slice()).unwrap();
        assert_eq!(reader.references().len(), 2);
        let records: Vec<_> = reader.collect::<anyhow::Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rname, "k141_3");
        assert_eq!(records[1].rname, "ctg");
        assert_eq!(records[1].pos, 7);
        assert_eq!(records[1].match_len, 50);
    }
}
