
use crate::vote::{VoteKind, VoteTable};

/// Tuning for the vote-casting walk over an alignment.
#[derive(Clone, Copy, Debug)]
pub struct AnalyzerParams {
    /// a run of at least this many exact matches confirms its interior
    pub kmer_len: usize,
    /// bases at each flank of a confirmed run that still get ordinary votes
    pub end_exclude_len: usize,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        AnalyzerParams {
            kmer_len: 9,
            end_exclude_len: 3,
        }
    }
}

/// one edit event observed at an A position
#[derive(Clone, Debug, PartialEq)]
enum Event {
    Subst(u8),
    Delete,
    Insert(Vec<u8>),
}

/// Walks a delta-encoded alignment between `a_part` (the read under
/// correction) and `b_part` (the partner) and casts one vote per event into
/// `votes`. Positions are shifted by `a_offset` into whole-read coordinates.
/// Between events, runs of at least `kmer_len` exact matches mark their
/// interior confirmed/no-insert; the `end_exclude_len` flank bases of such a
/// run, and every base of shorter runs, cast ordinary matching-base votes.
/// # Arguments
/// * `a_part` - the aligned A substring (exactly the consumed span)
/// * `b_part` - the aligned B substring (exactly the consumed span)
/// * `a_offset` - offset of `a_part[0]` within the whole read
/// * `delta` - the alignment's signed run-length indel encoding
/// * `votes` - the whole-read vote table to cast into
/// * `params` - kmer/flank tuning
pub fn analyze_alignment(
    a_part: &[u8],
    b_part: &[u8],
    a_offset: usize,
    delta: &[i32],
    votes: &mut VoteTable,
    params: &AnalyzerParams,
) {
    let events = collect_events(a_part, b_part, delta);

    //cast the event votes themselves
    for (pos, event) in events.iter() {
        match event {
            Event::Subst(b) => votes.cast(a_offset + pos, VoteKind::Subst(*b)),
            Event::Delete => votes.cast(a_offset + pos, VoteKind::Delete),
            Event::Insert(bases) => {
                //insertion evidence anchors on the base to its left; an insertion
                //before the very first base has no anchor and is dropped
                if *pos > 0 {
                    votes.append_insert(a_offset + pos - 1, bases);
                }
            }
        }
    }

    //now vote the match runs between events; the alignment ends are boundaries too
    let mut run_start: usize = 0;
    let mut event_iter = events.iter().peekable();
    loop {
        //the run extends to the next event that consumes an A position, or the end
        let (run_end, next_start) = match event_iter.next() {
            Some((pos, Event::Subst(_))) | Some((pos, Event::Delete)) => (*pos, pos + 1),
            Some((pos, Event::Insert(_))) => (*pos, *pos),
            None => (a_part.len(), a_part.len()),
        };
        cast_match_run(a_part, a_offset, run_start, run_end, votes, params);
        if next_start >= a_part.len() && event_iter.peek().is_none() {
            break;
        }
        run_start = next_start;
        if run_end == a_part.len() {
            break;
        }
    }
}

/// Votes one exact-match run spanning A positions `[start, end)`.
fn cast_match_run(
    a_part: &[u8],
    a_offset: usize,
    start: usize,
    end: usize,
    votes: &mut VoteTable,
    params: &AnalyzerParams,
) {
    if end <= start {
        return;
    }
    let run_len = end - start;
    if run_len >= params.kmer_len {
        let excl = params.end_exclude_len;
        //flanks still vote their own base
        for pos in start..(start + excl).min(end) {
            votes.cast(a_offset + pos, VoteKind::Subst(a_part[pos]));
        }
        for pos in end.saturating_sub(excl).max(start + excl)..end {
            votes.cast(a_offset + pos, VoteKind::Subst(a_part[pos]));
        }
        //the interior is confirmed instead of voted
        let ilo = start + excl;
        let ihi = end.saturating_sub(excl);
        for pos in ilo..ihi {
            votes.cast(a_offset + pos, VoteKind::Confirm);
            votes.cast(a_offset + pos, VoteKind::NoInsert);
        }
    } else {
        //short runs cast ordinary matching-base votes everywhere
        for pos in start..end {
            votes.cast(a_offset + pos, VoteKind::Subst(a_part[pos]));
        }
    }
}

/// First pass: turn the delta walk into a flat, position-sorted event list.
/// Consecutive inserted bases at one position merge into a single string.
fn collect_events(a_part: &[u8], b_part: &[u8], delta: &[i32]) -> Vec<(usize, Event)> {
    let mut events: Vec<(usize, Event)> = Vec::<(usize, Event)>::new();
    let mut i: usize = 0;
    let mut j: usize = 0;

    for &k in delta.iter() {
        let steps = (k.abs() - 1) as usize;
        for _ in 0..steps {
            if a_part[i] != b_part[j] {
                events.push((i, Event::Subst(b_part[j])));
            }
            i += 1;
            j += 1;
        }
        if k > 0 {
            events.push((i, Event::Delete));
            i += 1;
        } else {
            //insertion from B lands before A position i
            match events.last_mut() {
                Some((pos, Event::Insert(bases))) if *pos == i => {
                    bases.push(b_part[j]);
                }
                _ => {
                    events.push((i, Event::Insert(vec![b_part[j]])));
                }
            }
            j += 1;
        }
    }

    //trailing aligned run after the last indel
    while i < a_part.len() && j < b_part.len() {
        if a_part[i] != b_part[j] {
            events.push((i, Event::Subst(b_part[j])));
        }
        i += 1;
        j += 1;
    }

    events
}
