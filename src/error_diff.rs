
/// a k-mer repeating this often inside its window marks locally trivial DNA
const REPEAT_THRESHOLD: u16 = 3;

/// trivial-DNA window width, in multiples of the k-mer length
const TRIVIAL_WINDOW_FACTOR: usize = 8;

/// k-mer lengths probed by the trivial-DNA test
const TRIVIAL_KMER_RANGE: std::ops::RangeInclusive<usize> = 2..=5;

/// Tuning for error counting over a finished alignment.
#[derive(Clone, Copy, Debug)]
pub struct ErrorDiffParams {
    /// events this close to either alignment end are not counted
    pub ignore_flank: usize,
    /// skip events sitting in locally repetitive sequence
    pub filter_trivial: bool,
}

impl Default for ErrorDiffParams {
    fn default() -> Self {
        ErrorDiffParams {
            ignore_flank: 5,
            filter_trivial: true,
        }
    }
}

/// Counts the error events of a delta-encoded alignment between `a_part` and
/// `b_part`, skipping events inside the `ignore_flank` columns at each end
/// and, when enabled, events sitting in trivial DNA. Returns the surviving
/// event count and the alignment length (mean of the two consumed lengths).
/// # Arguments
/// * `a_part` - the aligned A substring (exactly the consumed span)
/// * `b_part` - the aligned B substring (exactly the consumed span)
/// * `delta` - the alignment's signed run-length indel encoding
/// * `params` - flank/filter tuning
pub fn compute_errors(
    a_part: &[u8],
    b_part: &[u8],
    delta: &[i32],
    params: &ErrorDiffParams,
) -> (u32, f64) {
    let insert_ct = delta.iter().filter(|&&k| k < 0).count();
    let total_cols = a_part.len() + insert_ct;
    let flank_hi = total_cols.saturating_sub(params.ignore_flank);

    let mut events: u32 = 0;
    let mut count = |col: usize, a_pos: usize| {
        if col < params.ignore_flank || col >= flank_hi {
            return;
        }
        if params.filter_trivial && is_trivial_dna(a_part, a_pos) {
            return;
        }
        events += 1;
    };

    let mut i: usize = 0;
    let mut j: usize = 0;
    let mut col: usize = 0;
    for &k in delta.iter() {
        for _ in 0..(k.abs() - 1) as usize {
            if a_part[i] != b_part[j] {
                count(col, i);
            }
            i += 1;
            j += 1;
            col += 1;
        }
        //the indel column itself is an event
        count(col, i.min(a_part.len() - 1));
        if k > 0 {
            i += 1;
        } else {
            j += 1;
        }
        col += 1;
    }
    while i < a_part.len() && j < b_part.len() {
        if a_part[i] != b_part[j] {
            count(col, i);
        }
        i += 1;
        j += 1;
        col += 1;
    }

    let length = (a_part.len() as f64 + b_part.len() as f64) / 2.0;
    (events, length)
}

/// Whether the sequence around `center` is locally repetitive: some k-mer
/// (k in 2..=5) occurs at least `REPEAT_THRESHOLD` times inside a window of
/// `TRIVIAL_WINDOW_FACTOR * k` bases centered there.
fn is_trivial_dna(seq: &[u8], center: usize) -> bool {
    for k in TRIVIAL_KMER_RANGE {
        let window = TRIVIAL_WINDOW_FACTOR * k;
        let lo = center.saturating_sub(window / 2);
        let hi = (lo + window).min(seq.len());
        if hi < lo + k {
            continue;
        }
        //4^5 slots covers every probed k
        let mut counts = [0u16; 1024];
        for start in lo..=hi - k {
            let mut code: usize = 0;
            for offset in 0..k {
                code = code * 4 + seq[start + offset] as usize;
            }
            counts[code] += 1;
            if counts[code] >= REPEAT_THRESHOLD {
                return true;
            }
        }
    }
    false
}
