
use std::io;
use std::io::Read;

use crate::banded_align::BandedAligner;
use crate::correction::CorrectionReader;
use crate::error_diff::{compute_errors, ErrorDiffParams};
use crate::olap_store::{quantize_erate, ErateSet, Overlap};
use crate::read_corrector::{correct_read, hang_adjust, make_rev_adjust, Adjust, CorrectedRead};
use crate::seq_store::SequenceStore;
use crate::string_util::reverse_complement_i;

/// Stage-2 parameters.
#[derive(Clone, Debug)]
pub struct RescoreParameters {
    /// first a-read id to rescore (inclusive)
    pub begin_id: u32,
    /// last a-read id to rescore (inclusive)
    pub end_id: u32,
    /// maximum tolerated alignment error rate
    pub max_error_rate: f64,
    pub error_diff: ErrorDiffParams,
}

impl Default for RescoreParameters {
    fn default() -> Self {
        RescoreParameters {
            begin_id: 0,
            end_id: u32::max_value(),
            max_error_rate: 0.06,
            error_diff: ErrorDiffParams::default(),
        }
    }
}

/// Progress counters for a stage-2 run.
#[derive(Clone, Copy, Debug, Default)]
pub struct RescoreStats {
    pub reads_corrected: u64,
    pub overlaps_processed: u64,
    /// overlaps whose stale error rate was kept because re-alignment failed
    pub rescore_failures: u64,
}

/// Materializes the corrected form of every read in the store, replaying the
/// correction stream. Reads the stream does not mention come through
/// unchanged with empty adjustment maps. A stream that disagrees with the
/// store (ids out of order or past its end) is corpus corruption and panics.
/// # Arguments
/// * `seqs` - the read store the corrections were computed against
/// * `reader` - the correction stream
/// * `stats` - counters, updated in place
pub fn correct_reads<R: Read>(
    seqs: &SequenceStore,
    reader: &mut CorrectionReader<R>,
    stats: &mut RescoreStats,
) -> io::Result<Vec<CorrectedRead>> {
    let mut corrected: Vec<CorrectedRead> = Vec::with_capacity(seqs.len());
    let mut next_id: u32 = 0;
    while let Some(group) = reader.next_read()? {
        assert!(
            (group.read_id as usize) < seqs.len(),
            "correction stream names read {} but the store holds {}",
            group.read_id,
            seqs.len()
        );
        assert!(group.read_id >= next_id, "correction stream is out of order");
        while next_id < group.read_id {
            corrected.push(identity_read(seqs.get_read(next_id)));
            next_id += 1;
        }
        corrected.push(correct_read(seqs.get_read(group.read_id), &group));
        if !group.records.is_empty() {
            stats.reads_corrected += 1;
        }
        next_id += 1;
    }
    while (next_id as usize) < seqs.len() {
        corrected.push(identity_read(seqs.get_read(next_id)));
        next_id += 1;
    }
    Ok(corrected)
}

fn identity_read(read: &[u8]) -> CorrectedRead {
    CorrectedRead {
        seq: read.to_vec(),
        adjusts: Vec::<Adjust>::new(),
        orig_len: read.len(),
    }
}

/// Re-aligns every overlap in the configured a-id range against the corrected
/// sequences and returns the recomputed error rates, in overlap-list order.
/// Overlaps whose re-alignment fails keep their stale rate.
/// # Arguments
/// * `corrected` - corrected reads for the whole store, from `correct_reads`
/// * `overlaps` - the overlaps to rescore, hangs in original coordinates
/// * `params` - stage tuning
/// * `stats` - counters, updated in place
pub fn rescore_overlaps(
    corrected: &[CorrectedRead],
    overlaps: &[Overlap],
    params: &RescoreParameters,
    stats: &mut RescoreStats,
) -> ErateSet {
    let mut aligner = BandedAligner::new(params.max_error_rate);
    let mut erates: Vec<u16> = Vec::with_capacity(overlaps.len());

    for overlap in overlaps.iter() {
        stats.overlaps_processed += 1;
        let erate = match rescore_one(corrected, overlap, &mut aligner, params) {
            Some(erate) => erate,
            None => {
                stats.rescore_failures += 1;
                overlap.erate
            }
        };
        erates.push(erate);
    }

    ErateSet {
        first_id: params.begin_id,
        last_id: params.end_id,
        erates,
    }
}

fn rescore_one(
    corrected: &[CorrectedRead],
    overlap: &Overlap,
    aligner: &mut BandedAligner,
    params: &RescoreParameters,
) -> Option<u16> {
    let a = &corrected[overlap.a_id as usize];
    let b = &corrected[overlap.b_id as usize];

    //orient b, reflecting its adjustment map when flipped
    let (b_seq, b_adjusts): (Vec<u8>, Vec<Adjust>) = if overlap.flipped {
        (
            reverse_complement_i(&b.seq),
            make_rev_adjust(&b.adjusts, b.orig_len),
        )
    } else {
        (b.seq.clone(), b.adjusts.clone())
    };

    //map the hang from original into corrected coordinates
    let a_lo = hang_adjust(overlap.a_hang.max(0), &a.adjusts);
    let b_lo = hang_adjust((-overlap.a_hang).max(0), &b_adjusts);
    if a_lo < 0 || b_lo < 0 {
        return None;
    }
    let (mut a_lo, mut b_lo) = (a_lo as usize, b_lo as usize);
    if a_lo >= a.seq.len() || b_lo >= b_seq.len() {
        return None;
    }

    let a_part = &a.seq[a_lo..];
    let b_part = &b_seq[b_lo..];
    let error_limit = aligner.error_bound(a_part.len().min(b_part.len()));
    let alignment = aligner.prefix_edit_distance(a_part, b_part, error_limit);
    if !alignment.match_to_end {
        return None;
    }

    //an indel flush against the boundary is a hang artifact, not an error
    let mut delta = alignment.delta;
    let (a_trim, b_trim) = trim_boundary_indels(&mut delta);
    a_lo += a_trim;
    b_lo += b_trim;
    if alignment.a_end <= a_trim || alignment.b_end <= b_trim {
        return None;
    }
    let a_sub = &a.seq[a_lo..a_lo + (alignment.a_end - a_trim)];
    let b_sub = &b_seq[b_lo..b_lo + (alignment.b_end - b_trim)];

    let (events, length) = compute_errors(a_sub, b_sub, &delta, &params.error_diff);
    if length <= 0.0 {
        return None;
    }
    Some(quantize_erate(events as f64 / length))
}

/// Strips the leading run of boundary indels from a delta, returning how many
/// A and B positions it consumed. A `±1` head entry is an indel with no
/// matches in front of it.
fn trim_boundary_indels(delta: &mut Vec<i32>) -> (usize, usize) {
    let mut a_trim: usize = 0;
    let mut b_trim: usize = 0;
    while let Some(&head) = delta.first() {
        if head == 1 {
            a_trim += 1;
        } else if head == -1 {
            b_trim += 1;
        } else {
            break;
        }
        delta.remove(0);
    }
    (a_trim, b_trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::{CorrectionRecord, CorrectionWriter, ReadCorrections};
    use crate::string_util::convert_stoi;
    use std::io::Cursor;

    const TRUTH: &str = "cgatcgattagcatcgatcagctacgatcgactcgatagc";

    fn stream_of(groups: Vec<ReadCorrections>) -> CorrectionReader<Cursor<Vec<u8>>> {
        let mut writer = CorrectionWriter::new(Vec::<u8>::new()).unwrap();
        for group in groups.iter() {
            writer.write_read(group).unwrap();
        }
        CorrectionReader::new(Cursor::new(writer.finish().unwrap())).unwrap()
    }

    fn group(read_id: u32, records: Vec<CorrectionRecord>) -> ReadCorrections {
        ReadCorrections {
            read_id,
            keep_left: false,
            keep_right: false,
            records,
        }
    }

    #[test]
    fn test_correct_reads_applies_stream() {
        let truth = convert_stoi(&TRUTH);
        let mut read0 = truth.clone();
        read0[20] = if truth[20] == 0 { 1 } else { 0 };
        let seqs = SequenceStore::from_reads(vec![read0, truth.clone(), truth.clone()]);

        let mut reader = stream_of(vec![
            group(0, vec![CorrectionRecord::Subst { pos: 20, base: truth[20] }]),
            group(1, vec![]),
        ]);
        let mut stats = RescoreStats::default();
        let corrected = correct_reads(&seqs, &mut reader, &mut stats).unwrap();

        assert_eq!(corrected.len(), 3);
        assert_eq!(corrected[0].seq, truth);
        assert_eq!(corrected[1].seq, truth);
        //read 2 never appears in the stream and comes through untouched
        assert_eq!(corrected[2].seq, truth);
        assert_eq!(stats.reads_corrected, 1);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_correct_reads_rejects_disorder() {
        //hand-build a stream whose groups go backwards
        let mut writer = CorrectionWriter::new(Vec::<u8>::new()).unwrap();
        writer.write_read(&group(1, vec![])).unwrap();
        let mut bytes = writer.finish().unwrap();
        let mut second = CorrectionWriter::new(Vec::<u8>::new()).unwrap();
        second.write_read(&group(0, vec![])).unwrap();
        bytes.extend_from_slice(&second.finish().unwrap()[8..]);

        let seqs = SequenceStore::from_reads(vec![vec![0; 4], vec![0; 4]]);
        let mut reader = CorrectionReader::new(Cursor::new(bytes)).unwrap();
        let mut stats = RescoreStats::default();
        let _ = correct_reads(&seqs, &mut reader, &mut stats);
    }

    fn corrected_pair(read0: Vec<u8>, read1: Vec<u8>, groups: Vec<ReadCorrections>) -> Vec<CorrectedRead> {
        let seqs = SequenceStore::from_reads(vec![read0, read1]);
        let mut reader = stream_of(groups);
        let mut stats = RescoreStats::default();
        correct_reads(&seqs, &mut reader, &mut stats).unwrap()
    }

    #[test]
    fn test_rescore_drops_rate_after_correction() {
        let truth = convert_stoi(&TRUTH);
        let mut read0 = truth.clone();
        read0[20] = if truth[20] == 0 { 1 } else { 0 };
        let corrected = corrected_pair(
            read0,
            truth.clone(),
            vec![group(0, vec![CorrectionRecord::Subst { pos: 20, base: truth[20] }])],
        );

        let overlaps = vec![Overlap { a_id: 0, b_id: 1, a_hang: 0, b_hang: 0, flipped: false, erate: 500 }];
        let mut stats = RescoreStats::default();
        let erates = rescore_overlaps(&corrected, &overlaps, &RescoreParameters::default(), &mut stats);
        assert_eq!(erates.erates, vec![0]);
        assert_eq!(stats.rescore_failures, 0);
    }

    #[test]
    fn test_rescore_flipped_overlap() {
        let truth = convert_stoi(&TRUTH);
        let rc = crate::string_util::reverse_complement_i(&truth);
        let corrected = corrected_pair(truth, rc, vec![]);

        let overlaps = vec![Overlap { a_id: 0, b_id: 1, a_hang: 0, b_hang: 0, flipped: true, erate: 800 }];
        let mut stats = RescoreStats::default();
        let erates = rescore_overlaps(&corrected, &overlaps, &RescoreParameters::default(), &mut stats);
        assert_eq!(erates.erates, vec![0]);
    }

    #[test]
    fn test_rescore_maps_hang_through_adjusts() {
        let truth = convert_stoi(&TRUTH);
        //read 0 carries an extra base at position 2; the stream deletes it
        let mut read0 = truth.clone();
        read0.insert(2, 3);
        //partner covers truth from position 5; in read 0's original coordinates that hang is 6
        let partner = truth[5..].to_vec();
        let corrected = corrected_pair(
            read0,
            partner,
            vec![group(0, vec![CorrectionRecord::Delete { pos: 2 }])],
        );
        assert_eq!(corrected[0].seq, truth);

        let overlaps = vec![Overlap { a_id: 0, b_id: 1, a_hang: 6, b_hang: 0, flipped: false, erate: 700 }];
        let mut stats = RescoreStats::default();
        let erates = rescore_overlaps(&corrected, &overlaps, &RescoreParameters::default(), &mut stats);
        assert_eq!(erates.erates, vec![0]);
        assert_eq!(stats.rescore_failures, 0);
    }

    #[test]
    fn test_rescore_failure_keeps_stale_rate() {
        let truth = convert_stoi(&TRUTH);
        //the partner shares a short head then disagrees completely
        let mut other = truth.clone();
        for base in other[8..].iter_mut() {
            *base = 3 - *base;
        }
        let corrected = corrected_pair(truth, other, vec![]);

        let overlaps = vec![Overlap { a_id: 0, b_id: 1, a_hang: 0, b_hang: 0, flipped: false, erate: 500 }];
        let mut stats = RescoreStats::default();
        let erates = rescore_overlaps(&corrected, &overlaps, &RescoreParameters::default(), &mut stats);
        assert_eq!(erates.erates, vec![500]);
        assert_eq!(stats.rescore_failures, 1);
    }

    #[test]
    fn test_trim_boundary_indels() {
        let mut delta = vec![1, -1, 5, -3];
        assert_eq!(trim_boundary_indels(&mut delta), (1, 1));
        assert_eq!(delta, vec![5, -3]);

        let mut clean = vec![4, -2];
        assert_eq!(trim_boundary_indels(&mut clean), (0, 0));
        assert_eq!(clean, vec![4, -2]);
    }
}
