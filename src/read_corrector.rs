
use crate::correction::{CorrectionRecord, ReadCorrections};

/// One entry of a read's position-adjustment map. `adjust` is the *cumulative*
/// signed offset in force from original coordinate `pos` onward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Adjust {
    pub pos: u32,
    pub adjust: i32,
}

/// A materialized corrected read together with the map from original
/// coordinates into corrected coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectedRead {
    /// corrected integer-coded sequence
    pub seq: Vec<u8>,
    /// position-sorted cumulative adjustments; empty when no indels applied
    pub adjusts: Vec<Adjust>,
    /// length of the read the corrections were replayed against
    pub orig_len: usize,
}

/// Replays a read's correction records against its original sequence.
/// Records must be position-sorted; insertions at a position apply before the
/// substitution/deletion at that same position (the stream is written that
/// way). Insertions at `pos == len` append after the last base.
/// # Arguments
/// * `read` - the original integer-coded read
/// * `corrections` - the read's record run from the correction stream
pub fn correct_read(read: &[u8], corrections: &ReadCorrections) -> CorrectedRead {
    let mut seq: Vec<u8> = Vec::with_capacity(read.len());
    let mut adjusts: Vec<Adjust> = Vec::<Adjust>::new();
    let mut cum: i32 = 0;
    let mut records = corrections.records.iter().peekable();

    for pos in 0..=read.len() {
        //insertions land before the base at pos
        let mut inserted = false;
        while let Some(CorrectionRecord::Insert { pos: rpos, base }) = records.peek() {
            if *rpos as usize != pos {
                break;
            }
            seq.push(*base);
            cum += 1;
            inserted = true;
            records.next();
        }
        if inserted {
            push_adjust(&mut adjusts, pos as u32, cum);
        }
        if pos == read.len() {
            break;
        }

        match records.peek() {
            Some(CorrectionRecord::Subst { pos: rpos, base }) if *rpos as usize == pos => {
                seq.push(*base);
                records.next();
            }
            Some(CorrectionRecord::Delete { pos: rpos }) if *rpos as usize == pos => {
                cum -= 1;
                push_adjust(&mut adjusts, (pos + 1) as u32, cum);
                records.next();
            }
            Some(CorrectionRecord::NoVote { pos: rpos }) if *rpos as usize == pos => {
                //carried by the stream but changes nothing
                seq.push(read[pos]);
                records.next();
            }
            _ => {
                seq.push(read[pos]);
            }
        }
    }
    assert!(records.next().is_none(), "correction record past the end of the read");

    CorrectedRead {
        seq,
        adjusts,
        orig_len: read.len(),
    }
}

/// collapses same-position entries so the map stays strictly position-sorted
fn push_adjust(adjusts: &mut Vec<Adjust>, pos: u32, cum: i32) {
    match adjusts.last_mut() {
        Some(last) if last.pos == pos => last.adjust = cum,
        _ => adjusts.push(Adjust { pos, adjust: cum }),
    }
}

/// The cumulative offset in force at original coordinate `coord`.
#[inline]
fn adjust_at(adjusts: &[Adjust], coord: i32) -> i32 {
    let mut ret = 0;
    for a in adjusts.iter() {
        if a.pos as i32 > coord {
            break;
        }
        ret = a.adjust;
    }
    ret
}

/// Maps an overlap hang from original coordinates into corrected coordinates.
/// # Arguments
/// * `hang` - the hang in original coordinates
/// * `adjusts` - the read's position-sorted adjustment map
/// # Examples
/// ```rust
/// use obec::read_corrector::{hang_adjust, Adjust};
/// //a deletion at original position 3 shifts everything after it back by one
/// let adjusts = vec![Adjust { pos: 4, adjust: -1 }];
/// assert_eq!(hang_adjust(2, &adjusts), 2);
/// assert_eq!(hang_adjust(6, &adjusts), 5);
/// ```
#[inline]
pub fn hang_adjust(hang: i32, adjusts: &[Adjust]) -> i32 {
    hang + adjust_at(adjusts, hang)
}

/// Reflects an adjustment map for use with the reverse-complemented read: for
/// every hang `h`, `hang_adjust(h, rev) == corrected_len - hang_adjust(orig_len - h, fwd)`.
/// # Arguments
/// * `adjusts` - the forward adjustment map
/// * `orig_len` - the original read length
pub fn make_rev_adjust(adjusts: &[Adjust], orig_len: usize) -> Vec<Adjust> {
    let total = adjusts.last().map_or(0, |a| a.adjust);
    let mut rev: Vec<Adjust> = Vec::with_capacity(adjusts.len());
    for (i, a) in adjusts.iter().enumerate().rev() {
        let prev_cum = if i == 0 { 0 } else { adjusts[i - 1].adjust };
        let value = total - prev_cum;
        let pos = orig_len as u32 - a.pos + 1;
        match rev.last_mut() {
            Some(last) if last.pos == pos => last.adjust = value,
            _ => rev.push(Adjust { pos, adjust: value }),
        }
    }
    rev
}
