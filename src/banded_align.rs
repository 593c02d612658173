
use std::cmp::min;

/// weight of one matched base when scoring a partial alignment endpoint
pub const BRANCH_PT_MATCH_VALUE: f64 = 0.272;

/// probability bound used when deriving the per-error-count match floor
const EDIT_DIST_PROB_BOUND: f64 = 1e-4;

/// z-score at which the normal approximation accepts a row length
const NORMAL_DISTRIB_THOLD: f64 = 3.62;

/// sentinel for cells outside the active band; must survive a +1 without wrapping
const BAND_SENTINEL: i32 = i32::MIN / 2;

/// The result of a banded prefix alignment between two integer-coded sequences.
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    /// The number of edit events (substitution, insertion, deletion) in the alignment
    pub errors: usize,
    /// One past the last A position consumed by the alignment
    pub a_end: usize,
    /// One past the last B position consumed by the alignment
    pub b_end: usize,
    /// `true` if a full prefix of the shorter sequence was matched within the error budget
    pub match_to_end: bool,
    /// Signed run-length encoding of the indels: `+k` is k-1 matches then a deletion in A,
    /// `-k` is |k|-1 matches then an insertion from B; substitutions are implicit
    pub delta: Vec<i32>,
}

/// Lazily-grown triangular edit array plus traceback bookkeeping.
/// Level `e` covers diagonals `[-e, e]`; a level is only allocated the first
/// time an alignment reaches that many errors and the allocation is reused
/// for every later call. One scratch per thread, never shared.
struct AlignerScratch {
    levels: Vec<Vec<i32>>,
}

impl AlignerScratch {
    fn new() -> AlignerScratch {
        AlignerScratch {
            levels: Vec::<Vec<i32>>::new(),
        }
    }

    /// Makes level `e` available and resets its cells to the out-of-band sentinel.
    fn reset_level(&mut self, e: usize) {
        while self.levels.len() <= e {
            self.levels.push(Vec::<i32>::new());
        }
        let level = &mut self.levels[e];
        level.clear();
        level.resize(2 * e + 1, BAND_SENTINEL);
    }

    #[inline]
    fn get(&self, e: usize, d: i32) -> i32 {
        if d.abs() as usize > e {
            return BAND_SENTINEL;
        }
        self.levels[e][(d + e as i32) as usize]
    }

    #[inline]
    fn set(&mut self, e: usize, d: i32, row: i32) {
        self.levels[e][(d + e as i32) as usize] = row;
    }
}

/// Banded O(nd) edit-distance engine with delta-encoded traceback.
/// Owns its scratch memory and the lazily-extended match-floor table, so each
/// worker thread constructs exactly one of these and reuses it for every
/// alignment it performs.
pub struct BandedAligner {
    max_error_rate: f64,
    /// `edit_match_limit[e]` - the minimum row a diagonal must reach with e errors to survive pruning
    edit_match_limit: Vec<i32>,
    /// iteration state for extending `edit_match_limit`
    bound_start: usize,
    scratch: AlignerScratch,
}

impl BandedAligner {
    /// Creates an aligner for the given maximum tolerated error rate.
    /// # Arguments
    /// * `max_error_rate` - fraction of the alignment length allowed to be edit events, e.g. 0.06
    pub fn new(max_error_rate: f64) -> BandedAligner {
        assert!(max_error_rate > 0.0 && max_error_rate < 0.5, "error rate must be in (0, 0.5)");
        BandedAligner {
            max_error_rate,
            edit_match_limit: Vec::<i32>::new(),
            bound_start: 1,
            scratch: AlignerScratch::new(),
        }
    }

    /// Returns the maximum number of errors allowed for an alignment of `len` bases.
    #[inline]
    pub fn error_bound(&self, len: usize) -> usize {
        (len as f64 * self.max_error_rate + 0.0000000000001) as usize
    }

    /// Extends the match-floor table so levels `0..=e_max` are available.
    fn ensure_match_limits(&mut self, e_max: usize) {
        while self.edit_match_limit.len() <= e_max {
            let e = self.edit_match_limit.len();
            let start = binomial_bound(e + 1, self.max_error_rate, self.bound_start, EDIT_DIST_PROB_BOUND);
            self.bound_start = start;
            self.edit_match_limit.push(start as i32 - 1);
        }
    }

    /// Computes the minimum edit distance matching a prefix of `a` against a prefix of `b`,
    /// or the best partial "branch point" alignment if `error_limit` is exceeded.
    /// # Arguments
    /// * `a` - the first integer-coded sequence (the read under correction)
    /// * `b` - the second integer-coded sequence (the overlapping partner)
    /// * `error_limit` - the maximum number of errors to spend
    pub fn prefix_edit_distance(&mut self, a: &[u8], b: &[u8], error_limit: usize) -> Alignment {
        let m = a.len() as i32;
        let n = b.len() as i32;
        let shorter = min(m, n);

        //short circuit: an exact prefix match of the shorter sequence costs nothing
        if a[..shorter as usize] == b[..shorter as usize] {
            return Alignment {
                errors: 0,
                a_end: shorter as usize,
                b_end: shorter as usize,
                match_to_end: true,
                delta: Vec::<i32>::new(),
            };
        }

        self.ensure_match_limits(error_limit);

        //level 0 is just the longest common prefix
        self.scratch.reset_level(0);
        let mut row: i32 = 0;
        while row < m && row < n && a[row as usize] == b[row as usize] {
            row += 1;
        }
        self.scratch.set(0, 0, row);
        if row == m || row == n {
            //only reachable when the equality check above missed (it cannot), kept for symmetry
            return self.build_alignment(0, 0, row, true);
        }

        //partial-alignment tracking: best (score, e, d) seen anywhere in the band
        let mut best_score: f64 = row as f64 * BRANCH_PT_MATCH_VALUE;
        let mut best_e: usize = 0;
        let mut best_d: i32 = 0;

        let mut left: i32 = 0;
        let mut right: i32 = 0;

        for e in 1..=error_limit {
            self.scratch.reset_level(e);
            let lo = (left - 1).max(-(e as i32));
            let hi = (right + 1).min(e as i32);
            if lo > hi {
                break;
            }

            for d in lo..=hi {
                //three predecessors: substitution, insertion from B, deletion in A
                let sub = self.scratch.get(e - 1, d) + 1;
                let ins = self.scratch.get(e - 1, d - 1);
                let del = self.scratch.get(e - 1, d + 1) + 1;
                let mut r = sub.max(ins).max(del);
                r = r.min(m).min(n - d);

                //slide down the diagonal through the matches
                while r < m && r + d < n && a[r as usize] == b[(r + d) as usize] {
                    r += 1;
                }
                self.scratch.set(e, d, r);

                if r >= 0 && (r == m || r + d == n) {
                    return self.build_alignment(e, d, r, true);
                }
            }

            //prune diagonals that fall below the match-quality floor for this error count
            let lim = self.edit_match_limit[e];
            left = lo;
            right = hi;
            while left <= right && left < 0 && self.scratch.get(e, left) < lim {
                left += 1;
            }
            if left >= 0 {
                while left <= right && self.scratch.get(e, left) + left < lim {
                    left += 1;
                }
            }
            if left > right {
                break;
            }
            while right > 0 && self.scratch.get(e, right) + right < lim {
                right -= 1;
            }
            if right <= 0 {
                while right >= left && self.scratch.get(e, right) < lim {
                    right -= 1;
                }
            }
            if left > right {
                break;
            }

            //track the best branch point among the surviving diagonals
            for d in left..=right {
                let r = self.scratch.get(e, d);
                let score = r as f64 * BRANCH_PT_MATCH_VALUE - e as f64;
                if score > best_score {
                    best_score = score;
                    best_e = e;
                    best_d = d;
                }
            }
        }

        //no full prefix match within budget, return the best partial alignment
        let best_row = self.scratch.get(best_e, best_d);
        self.build_alignment(best_e, best_d, best_row, false)
    }

    /// Builds the final result, tracing the edit array back from `(e, d)` to delta encoding.
    fn build_alignment(&self, e: usize, d: i32, row: i32, match_to_end: bool) -> Alignment {
        Alignment {
            errors: e,
            a_end: row as usize,
            b_end: (row + d) as usize,
            match_to_end,
            delta: self.compute_delta(e, d, row),
        }
    }

    /// Walks the edit array back from `(e, d, row)` and emits the signed run-length delta.
    fn compute_delta(&self, e_final: usize, d_final: i32, row_final: i32) -> Vec<i32> {
        //ops are gathered end-first: (kind, matched bases after the op on its level)
        //kind: 0 = substitution, 1 = insertion from B, 2 = deletion in A
        let mut ops_rev: Vec<(u8, i32)> = Vec::<(u8, i32)>::with_capacity(e_final);
        let mut d = d_final;
        let mut row = row_final;

        for k in (1..=e_final).rev() {
            let sub = self.scratch.get(k - 1, d);
            let ins = self.scratch.get(k - 1, d - 1);
            let del = self.scratch.get(k - 1, d + 1);

            let mut kind: u8 = 0;
            let mut best = sub + 1;
            if ins > best {
                kind = 1;
                best = ins;
            }
            if del + 1 > best {
                kind = 2;
                best = del + 1;
            }

            ops_rev.push((kind, row - best));
            match kind {
                0 => {
                    row = sub;
                }
                1 => {
                    row = ins;
                    d -= 1;
                }
                _ => {
                    row = del;
                    d += 1;
                }
            }
        }

        //row is now the leading match run on level 0
        let mut delta: Vec<i32> = Vec::<i32>::new();
        let mut run: i32 = row;
        for &(kind, after) in ops_rev.iter().rev() {
            match kind {
                //substitutions fold into the surrounding match run
                0 => {
                    run += 1 + after;
                }
                1 => {
                    delta.push(-(run + 1));
                    run = after;
                }
                _ => {
                    delta.push(run + 1);
                    run = after;
                }
            }
        }
        delta
    }
}

/// Returns the smallest `n >= start` such that seeing `e` or more errors in `n`
/// bases is statistically plausible (tail probability at least `limit`) at
/// per-base error probability `p`. Exact binomial summation for short rows,
/// normal approximation beyond.
fn binomial_bound(e: usize, p: f64, start: usize, limit: f64) -> usize {
    let q = 1.0 - p;
    let mut n = start.max(e).max(1);
    loop {
        if n <= 35 {
            //exact tail: P(X >= e) for X ~ Binomial(n, p)
            let mut sum = 0.0;
            for k in e..=n {
                sum += binomial_pmf(n, k, p, q);
            }
            if sum >= limit {
                return n;
            }
        } else {
            let z = (e as f64 - 0.5 - n as f64 * p) / (n as f64 * p * q).sqrt();
            if z <= NORMAL_DISTRIB_THOLD {
                return n;
            }
        }
        n += 1;
    }
}

/// P(X = k) for X ~ Binomial(n, p), computed in log space to dodge overflow.
fn binomial_pmf(n: usize, k: usize, p: f64, q: f64) -> f64 {
    let mut log_coeff = 0.0;
    for i in 0..k {
        log_coeff += ((n - i) as f64).ln() - ((k - i) as f64).ln();
    }
    (log_coeff + k as f64 * p.ln() + (n - k) as f64 * q.ln()).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_util::convert_stoi;

    fn aligner() -> BandedAligner {
        BandedAligner::new(0.06)
    }

    #[test]
    fn test_identity_alignment() {
        let mut al = aligner();
        let a = convert_stoi(&"acgtacgtacgtacgt");
        let result = al.prefix_edit_distance(&a, &a, 4);
        assert_eq!(result.errors, 0);
        assert_eq!(result.a_end, a.len());
        assert_eq!(result.b_end, a.len());
        assert!(result.match_to_end);
        assert!(result.delta.is_empty());
    }

    #[test]
    fn test_prefix_short_circuit() {
        let mut al = aligner();
        let a = convert_stoi(&"acgtacgt");
        let b = convert_stoi(&"acgtacgtcccc");
        let result = al.prefix_edit_distance(&a, &b, 2);
        assert_eq!(result.errors, 0);
        assert_eq!(result.a_end, 8);
        assert_eq!(result.b_end, 8);
        assert!(result.match_to_end);
    }

    #[test]
    fn test_single_substitution() {
        let mut al = aligner();
        let a = convert_stoi(&"acgtacgtacgtacgtacgt");
        let mut b = a.clone();
        b[9] = 3; //'a' -> 't' in the interior
        let result = al.prefix_edit_distance(&a, &b, 4);
        assert_eq!(result.errors, 1);
        assert!(result.match_to_end);
        assert_eq!(result.a_end, a.len());
        assert_eq!(result.b_end, b.len());
        //substitutions are implicit, so the delta stays empty
        assert!(result.delta.is_empty());
    }

    #[test]
    fn test_single_deletion_in_a() {
        let mut al = aligner();
        //a has one extra base at index 5 relative to b
        let a = convert_stoi(&"acgttcacgtacgtacgtaa");
        let b = convert_stoi(&"acgttacgtacgtacgtaa");
        let result = al.prefix_edit_distance(&a, &b, 4);
        assert_eq!(result.errors, 1);
        assert!(result.match_to_end);
        assert_eq!(result.a_end, a.len());
        assert_eq!(result.b_end, b.len());
        assert_eq!(result.delta.len(), 1);
        let d = result.delta[0];
        assert!(d > 0, "expected a deletion in A, got {}", d);
        //the event sits somewhere in the homopolymer-free run up to index 6
        assert!(d as usize <= 7);
    }

    #[test]
    fn test_single_insertion_from_b() {
        let mut al = aligner();
        let a = convert_stoi(&"acgttacgtacgtacgtaa");
        let b = convert_stoi(&"acgttcacgtacgtacgtaa");
        let result = al.prefix_edit_distance(&a, &b, 4);
        assert_eq!(result.errors, 1);
        assert!(result.match_to_end);
        assert_eq!(result.delta.len(), 1);
        assert!(result.delta[0] < 0, "expected an insertion from B, got {}", result.delta[0]);
    }

    #[test]
    fn test_delta_walk_consistency() {
        //replaying the delta against both sequences must land exactly on (a_end, b_end)
        let mut al = aligner();
        let a = convert_stoi(&"cgatcgattagcatcgatcagctacgatcgactcgatagcatcg");
        let b = convert_stoi(&"cgatcgataagcatcgtcagctacgatcgactcgatatgcatcg");
        let result = al.prefix_edit_distance(&a, &b, 8);
        assert!(result.match_to_end);

        let mut i = 0usize;
        let mut j = 0usize;
        for &k in result.delta.iter() {
            let steps = (k.abs() - 1) as usize;
            i += steps;
            j += steps;
            if k > 0 {
                i += 1;
            } else {
                j += 1;
            }
        }
        let tail_a = result.a_end - i;
        let tail_b = result.b_end - j;
        assert_eq!(tail_a, tail_b);
    }

    #[test]
    fn test_budget_exceeded_returns_branch_point() {
        let mut al = aligner();
        //20 matching bases then pure disagreement
        let a = convert_stoi(&"acgtacgtacgtacgtacgtcccccccccccccccc");
        let b = convert_stoi(&"acgtacgtacgtacgtacgtggggggggggggggggg");
        let result = al.prefix_edit_distance(&a, &b, 2);
        assert!(!result.match_to_end);
        //the branch point should sit at or just past the end of the matching run
        assert!(result.a_end >= 20);
        assert!(result.a_end <= 23);
        assert!(result.errors <= 2);
    }

    #[test]
    fn test_error_bound() {
        let al = aligner();
        assert_eq!(al.error_bound(100), 6);
        assert_eq!(al.error_bound(10), 0);
        assert_eq!(al.error_bound(1000), 60);
    }

    #[test]
    fn test_match_limits_monotonic() {
        let mut al = aligner();
        al.ensure_match_limits(20);
        for e in 1..=20 {
            assert!(al.edit_match_limit[e] >= al.edit_match_limit[e - 1]);
        }
        assert!(al.edit_match_limit[0] >= 0);
    }

    #[test]
    fn test_binomial_bound_growth() {
        //more errors require a longer row before they are plausible
        let b1 = binomial_bound(1, 0.06, 1, EDIT_DIST_PROB_BOUND);
        let b2 = binomial_bound(2, 0.06, b1, EDIT_DIST_PROB_BOUND);
        let b3 = binomial_bound(3, 0.06, b2, EDIT_DIST_PROB_BOUND);
        assert!(b1 <= b2 && b2 <= b3);
    }
}
