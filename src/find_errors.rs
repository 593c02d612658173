
use std::borrow::Cow;

use crate::analyze::{analyze_alignment, AnalyzerParams};
use crate::banded_align::BandedAligner;
use crate::correction::{decide_position, CorrectionRecord, ReadCorrections};
use crate::olap_store::Overlap;
use crate::seq_store::SequenceStore;
use crate::string_util::reverse_complement_i;
use crate::vote::VoteTable;

/// Stage-1 parameters, populated from the command line and shared into
/// workers behind `Arc`.
#[derive(Clone, Debug)]
pub struct FindErrorsParameters {
    /// first read id to correct (inclusive)
    pub begin_id: u32,
    /// last read id to correct (inclusive)
    pub end_id: u32,
    /// a run of at least this many exact matches confirms its interior
    pub kmer_len: usize,
    /// confirmed-run flank width that still votes normally
    pub end_exclude_len: usize,
    /// ends with fewer overlaps than this are flagged keep_left/keep_right
    pub degree_threshold: u32,
    /// maximum tolerated alignment error rate
    pub max_error_rate: f64,
    /// reject corrections at sites that look heterozygous
    pub use_haplo: bool,
    pub threads: usize,
    /// batch size bound for the parallel processor, in read bases
    pub batch_bytes: usize,
}

impl Default for FindErrorsParameters {
    fn default() -> Self {
        FindErrorsParameters {
            begin_id: 0,
            end_id: u32::max_value(),
            kmer_len: 9,
            end_exclude_len: 3,
            degree_threshold: 2,
            max_error_rate: 0.06,
            use_haplo: true,
            threads: 1,
            batch_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Progress counters for a stage-1 run.
#[derive(Clone, Copy, Debug, Default)]
pub struct FindErrorsStats {
    pub reads_processed: u64,
    pub overlaps_processed: u64,
    pub alignments_failed: u64,
    pub records_emitted: u64,
}

impl FindErrorsStats {
    /// Folds another worker's counters into this one.
    pub fn absorb(&mut self, other: &FindErrorsStats) {
        self.reads_processed += other.reads_processed;
        self.overlaps_processed += other.overlaps_processed;
        self.alignments_failed += other.alignments_failed;
        self.records_emitted += other.records_emitted;
    }
}

/// Corrects one read: aligns every overlapping partner against it, tallies
/// the votes, and decides the read's correction records. `overlaps` must all
/// carry `a_id == read_id`. Alignments that fail to reach an end are counted
/// and contribute no votes.
/// # Arguments
/// * `seqs` - the read store
/// * `read_id` - the read under correction
/// * `overlaps` - the read's overlap slice, hangs in its coordinates
/// * `aligner` - the calling thread's aligner
/// * `params` - stage tuning
/// * `stats` - counters, updated in place
pub fn process_read(
    seqs: &SequenceStore,
    read_id: u32,
    overlaps: &[Overlap],
    aligner: &mut BandedAligner,
    params: &FindErrorsParameters,
    stats: &mut FindErrorsStats,
) -> ReadCorrections {
    let read = seqs.get_read(read_id);
    let mut votes = VoteTable::new(read.len());
    let analyzer_params = AnalyzerParams {
        kmer_len: params.kmer_len,
        end_exclude_len: params.end_exclude_len,
    };

    let mut left_degree: u32 = 0;
    let mut right_degree: u32 = 0;
    for overlap in overlaps.iter() {
        debug_assert_eq!(overlap.a_id, read_id);
        stats.overlaps_processed += 1;
        if overlap.a_hang <= 0 {
            left_degree += 1;
        }
        if overlap.b_hang >= 0 {
            right_degree += 1;
        }

        //hangs are already in the oriented b coordinates
        let b_full = seqs.get_read(overlap.b_id);
        let b_oriented: Cow<[u8]> = if overlap.flipped {
            Cow::Owned(reverse_complement_i(b_full))
        } else {
            Cow::Borrowed(b_full)
        };
        let a_offset = overlap.a_hang.max(0) as usize;
        let b_offset = (-overlap.a_hang).max(0) as usize;
        if a_offset >= read.len() || b_offset >= b_oriented.len() {
            stats.alignments_failed += 1;
            continue;
        }

        let a_part = &read[a_offset..];
        let b_part = &b_oriented[b_offset..];
        let error_limit = aligner.error_bound(a_part.len().min(b_part.len()));
        let alignment = aligner.prefix_edit_distance(a_part, b_part, error_limit);
        if !alignment.match_to_end {
            stats.alignments_failed += 1;
            continue;
        }
        analyze_alignment(
            &a_part[..alignment.a_end],
            &b_part[..alignment.b_end],
            a_offset,
            &alignment.delta,
            &mut votes,
            &analyzer_params,
        );
    }

    let mut records = Vec::<CorrectionRecord>::new();
    for (pos, &base) in read.iter().enumerate() {
        decide_position(votes.tally(pos), base, pos, params.use_haplo, &mut records);
    }
    stats.records_emitted += records.len() as u64;
    stats.reads_processed += 1;

    ReadCorrections {
        read_id,
        keep_left: left_degree < params.degree_threshold,
        keep_right: right_degree < params.degree_threshold,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::CorrectionRecord;
    use crate::string_util::convert_stoi;

    const TRUTH: &str = "cgatcgattagcatcgatcagctacgatcga";

    fn overlap(a_id: u32, b_id: u32, a_hang: i32, b_hang: i32, flipped: bool) -> Overlap {
        Overlap { a_id, b_id, a_hang, b_hang, flipped, erate: 0 }
    }

    fn setup(read0: Vec<u8>, partners: Vec<Vec<u8>>) -> SequenceStore {
        let mut reads = vec![read0];
        reads.extend(partners);
        SequenceStore::from_reads(reads)
    }

    #[test]
    fn test_unanimous_partners_fix_an_error() {
        let truth = convert_stoi(&TRUTH);
        let mut read0 = truth.clone();
        read0[15] = 0; //'g' -> 'a'
        assert_ne!(truth[15], 0);
        let seqs = setup(read0, vec![truth.clone(), truth.clone(), truth.clone()]);
        let overlaps = vec![
            overlap(0, 1, 0, 0, false),
            overlap(0, 2, 0, 0, false),
            overlap(0, 3, 0, 0, false),
        ];

        let mut aligner = BandedAligner::new(0.06);
        let mut stats = FindErrorsStats::default();
        let corrections = process_read(&seqs, 0, &overlaps, &mut aligner, &FindErrorsParameters::default(), &mut stats);

        assert_eq!(
            corrections.records,
            vec![CorrectionRecord::Subst { pos: 15, base: truth[15] }]
        );
        assert!(!corrections.keep_left);
        assert!(!corrections.keep_right);
        assert_eq!(stats.overlaps_processed, 3);
        assert_eq!(stats.alignments_failed, 0);
    }

    #[test]
    fn test_flipped_partner_contributes() {
        let truth = convert_stoi(&TRUTH);
        let mut read0 = truth.clone();
        read0[15] = 0;
        //partners are stored reverse-complemented
        let rc = reverse_complement_i(&truth);
        let seqs = setup(read0, vec![rc.clone(), rc.clone(), rc]);
        let overlaps = vec![
            overlap(0, 1, 0, 0, true),
            overlap(0, 2, 0, 0, true),
            overlap(0, 3, 0, 0, true),
        ];

        let mut aligner = BandedAligner::new(0.06);
        let mut stats = FindErrorsStats::default();
        let corrections = process_read(&seqs, 0, &overlaps, &mut aligner, &FindErrorsParameters::default(), &mut stats);
        assert_eq!(
            corrections.records,
            vec![CorrectionRecord::Subst { pos: 15, base: truth[15] }]
        );
    }

    #[test]
    fn test_positive_hang_offsets_alignment() {
        let truth = convert_stoi(&TRUTH);
        //partner only covers the tail of read 0 starting at position 6
        let partner = truth[6..].to_vec();
        let seqs = setup(truth.clone(), vec![partner.clone(), partner.clone(), partner]);
        let overlaps = vec![
            overlap(0, 1, 6, 0, false),
            overlap(0, 2, 6, 0, false),
            overlap(0, 3, 6, 0, false),
        ];

        let mut aligner = BandedAligner::new(0.06);
        let mut stats = FindErrorsStats::default();
        let corrections = process_read(&seqs, 0, &overlaps, &mut aligner, &FindErrorsParameters::default(), &mut stats);
        //the read matches its partners, so nothing is corrected
        assert!(corrections.records.is_empty());
        //no overlap reaches the left end
        assert!(corrections.keep_left);
        assert!(!corrections.keep_right);
        assert_eq!(stats.alignments_failed, 0);
    }

    #[test]
    fn test_thin_coverage_sets_keep_flags() {
        let truth = convert_stoi(&TRUTH);
        let seqs = setup(truth.clone(), vec![truth]);
        let overlaps = vec![overlap(0, 1, 0, 0, false)];

        let mut aligner = BandedAligner::new(0.06);
        let mut stats = FindErrorsStats::default();
        let corrections = process_read(&seqs, 0, &overlaps, &mut aligner, &FindErrorsParameters::default(), &mut stats);
        //degree 1 on both ends is below the default threshold of 2
        assert!(corrections.keep_left);
        assert!(corrections.keep_right);
    }

    #[test]
    fn test_split_evidence_leaves_read_alone() {
        let truth = convert_stoi(&TRUTH);
        let mut read0 = truth.clone();
        read0[15] = 0;
        let mut alt = truth.clone();
        alt[15] = 3;
        let seqs = setup(read0, vec![truth.clone(), truth, alt.clone(), alt]);
        let overlaps = vec![
            overlap(0, 1, 0, 0, false),
            overlap(0, 2, 0, 0, false),
            overlap(0, 3, 0, 0, false),
            overlap(0, 4, 0, 0, false),
        ];

        let mut aligner = BandedAligner::new(0.06);
        let mut stats = FindErrorsStats::default();
        let corrections = process_read(&seqs, 0, &overlaps, &mut aligner, &FindErrorsParameters::default(), &mut stats);
        //2 votes each way is not a majority
        assert!(corrections.records.is_empty());
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = FindErrorsStats::default();
        let part = FindErrorsStats {
            reads_processed: 2,
            overlaps_processed: 7,
            alignments_failed: 1,
            records_emitted: 3,
        };
        total.absorb(&part);
        total.absorb(&part);
        assert_eq!(total.reads_processed, 4);
        assert_eq!(total.overlaps_processed, 14);
        assert_eq!(total.records_emitted, 6);
    }
}
