use crate::libs::enzyme::RestrictionModel;
use crate::libs::error::HicError;
use fxhash::FxHashMap;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq)]
pub struct Contig {
    pub id: String,
    pub length: u64,
    /// Restriction sites on the forward strand
    pub sites: u32,
    /// Inter-contig contacts seen during extraction
    pub signal: u64,
    pub coverage: Option<f64>,
}

impl Contig {
    pub fn new(id: &str, length: u64) -> Self {
        Self {
            id: id.to_string(),
            length,
            sites: 0,
            signal: 0,
            coverage: None,
        }
    }
}

/// Ordered contigs; the position of a contig is its row and column in the
/// contact matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContigTable {
    contigs: Vec<Contig>,
    index: FxHashMap<String, usize>,
}

impl ContigTable {
    /// Sorts by descending length, ties by id, and indexes the result.
    pub fn canonical(mut contigs: Vec<Contig>) -> Result<Self, HicError> {
        contigs.sort_by(|a, b| b.length.cmp(&a.length).then_with(|| a.id.cmp(&b.id)));
        Self::from_ordered(contigs)
    }

    /// Keeps the given order, e.g. when loading a persisted table.
    pub fn from_ordered(contigs: Vec<Contig>) -> Result<Self, HicError> {
        let mut index = FxHashMap::default();
        for (i, c) in contigs.iter().enumerate() {
            if index.insert(c.id.clone(), i).is_some() {
                return Err(HicError::InvalidInput(format!("duplicated contig id `{}`", c.id)));
            }
        }
        Ok(Self { contigs, index })
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Contig> {
        self.contigs.get(idx)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Contig> {
        self.contigs.iter()
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    pub fn has_coverage(&self) -> bool {
        self.contigs.iter().any(|c| c.coverage.is_some())
    }

    pub fn total_length(&self) -> u64 {
        self.contigs.iter().map(|c| c.length).sum()
    }

    /// N50 and L50 of the contig lengths; `(0, 0)` for an empty table.
    ///
    /// ```
    /// use hicbin::libs::contig::{Contig, ContigTable};
    /// let table = ContigTable::canonical(vec![
    ///     Contig::new("a", 80),
    ///     Contig::new("b", 70),
    ///     Contig::new("c", 50),
    ///     Contig::new("d", 40),
    /// ]).unwrap();
    /// assert_eq!(table.n50(), (70, 2));
    /// ```
    pub fn n50(&self) -> (u64, usize) {
        let mut lengths: Vec<u64> = self.contigs.iter().map(|c| c.length).collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));

        let total: u64 = lengths.iter().sum();
        let mut cumulative = 0;
        for (i, len) in lengths.iter().enumerate() {
            cumulative += len;
            if cumulative * 2 >= total {
                return (*len, i + 1);
            }
        }
        (0, 0)
    }

    /// Streams a coverage table and attaches the values to known contigs.
    ///
    /// Accepts `contig<TAB>coverage` lines, or a MetaBAT depth table with
    /// `contigName` and `totalAvgDepth` columns. `name_pattern` extracts the
    /// contig id from the first column through its first capture group.
    /// Rows of contigs missing from the table are ignored.
    pub fn join_coverage<R: BufRead>(
        &self,
        reader: R,
        name_pattern: Option<&regex::Regex>,
    ) -> anyhow::Result<ContigTable> {
        let mut contigs = self.contigs.clone();
        let mut columns: Option<(usize, usize)> = None;
        let mut seen_data = false;
        let mut joined = 0usize;
        let mut unknown = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if crate::libs::io::is_comment(&line) {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();

            if columns.is_none() && !seen_data {
                if let Some(name_col) = fields.iter().position(|f| *f == "contigName") {
                    let depth_col = fields
                        .iter()
                        .position(|f| *f == "totalAvgDepth")
                        .ok_or_else(|| {
                            HicError::Parse("depth table without a totalAvgDepth column".into())
                        })?;
                    columns = Some((name_col, depth_col));
                    continue;
                }
            }

            let invalid = || HicError::Parse(format!("coverage line {}: {}", line_no + 1, line));
            let (name_col, value_col) = columns.unwrap_or((0, 1));
            if fields.len() <= name_col.max(value_col) {
                return Err(invalid().into());
            }

            let value = match fields[value_col].trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => v,
                // header of a two-column table
                Err(_) if !seen_data && columns.is_none() => {
                    seen_data = true;
                    continue;
                }
                _ => return Err(invalid().into()),
            };
            seen_data = true;

            let raw_name = fields[name_col].split_whitespace().next().unwrap_or("");
            let name = match name_pattern {
                Some(re) => re
                    .captures(raw_name)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str())
                    .unwrap_or(raw_name),
                None => raw_name,
            };

            match self.index_of(name) {
                Some(idx) => {
                    contigs[idx].coverage = Some(value);
                    joined += 1;
                }
                None => unknown += 1,
            }
        }

        if unknown > 0 {
            log::warn!("{} coverage rows refer to contigs outside the table", unknown);
        }
        log::info!("Joined coverage for {} of {} contigs", joined, contigs.len());

        ContigTable::from_ordered(contigs).map_err(Into::into)
    }
}

/// Reads an assembly and counts the restriction sites of every contig.
///
/// Contigs are returned in file order with zero signal.
pub fn read_assembly<R: BufRead>(
    reader: R,
    model: &RestrictionModel,
) -> anyhow::Result<Vec<Contig>> {
    let mut fa_in = noodles_fasta::io::Reader::new(reader);
    let mut contigs = vec![];

    for result in fa_in.records() {
        let record = result?;
        let name = String::from_utf8(record.name().into())?;
        let seq: &[u8] = record.sequence().as_ref();

        let mut contig = Contig::new(&name, seq.len() as u64);
        contig.sites = model.count_sites(seq);
        contigs.push(contig);
    }

    Ok(contigs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ContigTable {
        ContigTable::canonical(vec![
            Contig::new("k141_2", 500),
            Contig::new("k141_1", 900),
            Contig::new("k141_3", 500),
        ])
        .unwrap()
    }

    #[test]
    fn canonical_order() {
        let table = table();
        let ids: Vec<&str> = table.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["k141_1", "k141_2", "k141_3"]);
        assert_eq!(table.index_of("k141_3"), Some(2));
        assert_eq!(table.index_of("k141_9"), None);
        assert_eq!(table.total_length(), 1900);
    }

    #[test]
    fn duplicated_ids() {
        let res = ContigTable::from_ordered(vec![Contig::new("a", 1), Contig::new("a", 2)]);
        assert!(res.is_err());
    }

    #[test]
    fn two_column_coverage() {
        let text = "contig\tcoverage\nk141_1\t12.5\nk141_3\t0\nk141_9\t3\n";
        let joined = table().join_coverage(text.as_bytes(), None).unwrap();
        assert!(joined.has_coverage());
        assert_eq!(joined.get(0).unwrap().coverage, Some(12.5));
        assert_eq!(joined.get(1).unwrap().coverage, None);
        assert_eq!(joined.get(2).unwrap().coverage, Some(0.0));
    }

    #[test]
    fn metabat_depth_table() {
        let text = "\
contigName\tcontigLen\ttotalAvgDepth\tsample.bam\tsample.bam-var
k141_1 flag=1 multi=2.0 len=900\t900\t7.25\t7.25\t1.1
k141_2 flag=1 multi=2.0 len=500\t500\t3\t3\t0.2
";
        let joined = table().join_coverage(text.as_bytes(), None).unwrap();
        assert_eq!(joined.get(0).unwrap().coverage, Some(7.25));
        assert_eq!(joined.get(1).unwrap().coverage, Some(3.0));
    }

    #[test]
    fn coverage_name_pattern() {
        let re = regex::Regex::new(r"^(k\d+_\d+)").unwrap();
        let text = "k141_2_pilon\t4.5\n";
        let joined = table().join_coverage(text.as_bytes(), Some(&re)).unwrap();
        assert_eq!(joined.get(1).unwrap().coverage, Some(4.5));
    }

    #[test]
    fn bad_coverage_value() {
        let text = "k141_1\t1\nk141_2\tabc\n";
        assert!(table().join_coverage(text.as_bytes(), None).is_err());
        let text = "k141_1\t-1\n";
        assert!(table().join_coverage(text.as_bytes(), None).is_err());
    }

    #[test]
    fn sites_from_fasta() {
        let fa = ">c1 desc\nGATCAATT\nGATC\n>c2\nCCCC\n";
        let model = RestrictionModel::from_list("Sau3AI,MluCI").unwrap();
        let contigs = read_assembly(fa.as_bytes(), &model).unwrap();
        assert_eq!(contigs.len(), 2);
        assert_eq!(contigs[0].id, "c1");
        assert_eq!(contigs[0].length, 12);
        assert_eq!(contigs[0].sites, 3);
        assert_eq!(contigs[1].sites, 0);
    }
}
