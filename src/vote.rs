
/// separator byte inside the delimited insertion multiset (never a valid base)
pub const INSERT_DELIM: u8 = 4;

/// hard cap on the insertion evidence buffer per position; evidence past this is dropped
const MAX_INSERT_BUFFER: usize = 2048;

/// One piece of evidence cast by a partner alignment at a single read position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteKind {
    /// the partner shows this base (either a mismatch or an ordinary matching-base vote)
    Subst(u8),
    /// the partner is missing this base
    Delete,
    /// the base sits inside a long exact match
    Confirm,
    /// no insertion follows this position (inside a long exact match)
    NoInsert,
}

/// Per-position tally of correction evidence. All counters saturate and never
/// overflow; written only while analyzing alignments, read once when deciding.
#[derive(Clone, Debug, Default)]
pub struct VoteTally {
    /// partners whose long exact matches confirm this base
    pub confirmed: u16,
    /// partners that confirm the base and also saw no insertion after it
    pub conf_no_insert: u16,
    /// partners missing this base
    pub deletes: u16,
    pub a_subst: u16,
    pub c_subst: u16,
    pub g_subst: u16,
    pub t_subst: u16,
    /// partners whose long exact matches rule out an insertion after this position
    pub no_insert: u16,
    /// number of insertion events observed after this position
    pub insert_ct: u16,
    /// the observed insertion strings, back to back with `INSERT_DELIM` between them
    pub insert_seqs: Vec<u8>,
}

impl VoteTally {
    /// Applies one vote to the tally.
    pub fn cast(&mut self, kind: VoteKind) {
        match kind {
            VoteKind::Subst(0) => self.a_subst = self.a_subst.saturating_add(1),
            VoteKind::Subst(1) => self.c_subst = self.c_subst.saturating_add(1),
            VoteKind::Subst(2) => self.g_subst = self.g_subst.saturating_add(1),
            VoteKind::Subst(3) => self.t_subst = self.t_subst.saturating_add(1),
            VoteKind::Subst(b) => panic!("vote for non-DNA base {}", b),
            VoteKind::Delete => self.deletes = self.deletes.saturating_add(1),
            VoteKind::Confirm => self.confirmed = self.confirmed.saturating_add(1),
            VoteKind::NoInsert => {
                //a no-insert vote only ever rides on a confirmed base
                self.no_insert = self.no_insert.saturating_add(1);
                self.conf_no_insert = self.conf_no_insert.saturating_add(1);
            }
        }
    }

    /// Records one observed insertion event (a full inserted string from one partner).
    pub fn append_insert(&mut self, bases: &[u8]) {
        self.insert_ct = self.insert_ct.saturating_add(1);
        if self.insert_seqs.len() + bases.len() + 1 > MAX_INSERT_BUFFER {
            //evidence buffer is full; the count above still registers the event
            return;
        }
        if !self.insert_seqs.is_empty() {
            self.insert_seqs.push(INSERT_DELIM);
        }
        self.insert_seqs.extend_from_slice(bases);
    }

    /// Iterates the recorded insertion strings.
    pub fn insert_strings(&self) -> impl Iterator<Item = &[u8]> {
        self.insert_seqs
            .split(|&b| b == INSERT_DELIM)
            .filter(|s| !s.is_empty())
    }

    /// Total substitution/deletion evidence at this position.
    pub fn total(&self) -> u32 {
        self.deletes as u32
            + self.a_subst as u32
            + self.c_subst as u32
            + self.g_subst as u32
            + self.t_subst as u32
    }
}

/// Per-read table of `VoteTally` entries, one per base position.
pub struct VoteTable {
    tallies: Vec<VoteTally>,
}

impl VoteTable {
    /// Creates an empty table for a read of `len` bases.
    pub fn new(len: usize) -> VoteTable {
        VoteTable {
            tallies: vec![VoteTally::default(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    #[inline]
    pub fn cast(&mut self, pos: usize, kind: VoteKind) {
        self.tallies[pos].cast(kind);
    }

    #[inline]
    pub fn append_insert(&mut self, pos: usize, bases: &[u8]) {
        self.tallies[pos].append_insert(bases);
    }

    #[inline]
    pub fn tally(&self, pos: usize) -> &VoteTally {
        &self.tallies[pos]
    }

    pub fn tallies(&self) -> impl Iterator<Item = &VoteTally> {
        self.tallies.iter()
    }
}
