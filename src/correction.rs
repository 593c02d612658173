
use std::io;
use std::io::{Read, Write};

use crate::vote::VoteTally;

/// stream file magic
pub const CORRECTION_MAGIC: [u8; 4] = *b"OCOR";
/// stream format version
pub const CORRECTION_VERSION: u32 = 1;

/// two or more kinds independently reaching this count mark a heterozygous site
pub const MIN_HAPLO_OCCURS: u16 = 3;

/// widest position the 26-bit field can carry
const MAX_POS: u32 = (1 << 26) - 1;

/// A single correction decision against one read position.
/// The wire form packs into a little-endian u64 laid out (MSB first) as
/// `keep_left:1, keep_right:1, type:4, pos:26, read_id:32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectionRecord {
    /// opens a read's record run; `keep_left`/`keep_right` flag thin-coverage ends
    Ident { read_id: u32, keep_left: bool, keep_right: bool },
    /// drop the base at `pos`
    Delete { pos: u32 },
    /// replace the base at `pos` with `base` (integer-coded)
    Subst { pos: u32, base: u8 },
    /// insert `base` before the base at `pos`
    Insert { pos: u32, base: u8 },
    /// placeholder kind carried by the wire format but never produced by the decider
    NoVote { pos: u32 },
}

impl CorrectionRecord {
    /// Packs the record into its wire word. `read_id` fills the low field for
    /// every record so a damaged stream stays attributable.
    pub fn encode(&self, read_id: u32) -> u64 {
        let (keep_left, keep_right, type_code, pos): (bool, bool, u64, u32) = match *self {
            CorrectionRecord::Ident { keep_left, keep_right, .. } => (keep_left, keep_right, 0, 0),
            CorrectionRecord::Delete { pos } => (false, false, 1, pos),
            CorrectionRecord::Subst { pos, base } => {
                assert!(base < 4, "substitution with non-DNA base {}", base);
                (false, false, 2 + base as u64, pos)
            }
            CorrectionRecord::Insert { pos, base } => {
                assert!(base < 4, "insertion with non-DNA base {}", base);
                (false, false, 6 + base as u64, pos)
            }
            CorrectionRecord::NoVote { pos } => (false, false, 10, pos),
        };
        assert!(pos <= MAX_POS, "correction position {} exceeds the 26-bit field", pos);

        ((keep_left as u64) << 63)
            | ((keep_right as u64) << 62)
            | (type_code << 58)
            | ((pos as u64) << 32)
            | read_id as u64
    }

    /// Unpacks a wire word; unknown type codes mean corpus corruption.
    pub fn decode(word: u64) -> io::Result<(CorrectionRecord, u32)> {
        let keep_left = (word >> 63) & 1 == 1;
        let keep_right = (word >> 62) & 1 == 1;
        let type_code = ((word >> 58) & 0xF) as u8;
        let pos = ((word >> 32) & MAX_POS as u64) as u32;
        let read_id = word as u32;

        let record = match type_code {
            0 => CorrectionRecord::Ident { read_id, keep_left, keep_right },
            1 => CorrectionRecord::Delete { pos },
            2..=5 => CorrectionRecord::Subst { pos, base: type_code - 2 },
            6..=9 => CorrectionRecord::Insert { pos, base: type_code - 6 },
            10 => CorrectionRecord::NoVote { pos },
            unknown => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown correction record type {}", unknown),
                ));
            }
        };
        Ok((record, read_id))
    }

    /// The position field, where the record has one.
    pub fn pos(&self) -> Option<u32> {
        match *self {
            CorrectionRecord::Ident { .. } => None,
            CorrectionRecord::Delete { pos }
            | CorrectionRecord::Subst { pos, .. }
            | CorrectionRecord::Insert { pos, .. }
            | CorrectionRecord::NoVote { pos } => Some(pos),
        }
    }
}

/// All corrections decided for one read.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadCorrections {
    pub read_id: u32,
    pub keep_left: bool,
    pub keep_right: bool,
    /// position-sorted; positions never decrease (equal only for stacked insertions)
    pub records: Vec<CorrectionRecord>,
}

/// Writes a correction stream: header, then record runs grouped by ascending
/// read id, each opened by one IDENT.
pub struct CorrectionWriter<W: Write> {
    writer: W,
    last_read_id: Option<u32>,
}

impl<W: Write> CorrectionWriter<W> {
    /// Creates the writer and emits the stream header.
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.write_all(&CORRECTION_MAGIC)?;
        writer.write_all(&CORRECTION_VERSION.to_le_bytes())?;
        Ok(CorrectionWriter {
            writer,
            last_read_id: None,
        })
    }

    /// Appends one read's record run to the stream.
    /// Panics if read ids go backwards or record positions decrease; both mean
    /// the producer is broken, not the data.
    pub fn write_read(&mut self, corrections: &ReadCorrections) -> io::Result<()> {
        if let Some(last) = self.last_read_id {
            assert!(corrections.read_id > last, "correction stream read ids must ascend");
        }
        self.last_read_id = Some(corrections.read_id);

        let ident = CorrectionRecord::Ident {
            read_id: corrections.read_id,
            keep_left: corrections.keep_left,
            keep_right: corrections.keep_right,
        };
        self.writer.write_all(&ident.encode(corrections.read_id).to_le_bytes())?;

        let mut last_pos: u32 = 0;
        for record in corrections.records.iter() {
            let pos = record.pos().expect("only one IDENT per read run");
            assert!(pos >= last_pos, "correction record positions must not decrease");
            last_pos = pos;
            self.writer.write_all(&record.encode(corrections.read_id).to_le_bytes())?;
        }
        Ok(())
    }

    /// Flushes and hands the inner writer back.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads a correction stream group by group.
pub struct CorrectionReader<R: Read> {
    reader: R,
    /// decoded record waiting to start the next group
    pending: Option<CorrectionRecord>,
}

impl<R: Read> CorrectionReader<R> {
    /// Opens a stream, validating magic and version.
    pub fn new(mut reader: R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != CORRECTION_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a correction stream"));
        }
        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != CORRECTION_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported correction stream version {}", version),
            ));
        }
        let mut ret = CorrectionReader {
            reader,
            pending: None,
        };
        ret.pending = ret.read_record()?;
        Ok(ret)
    }

    fn read_record(&mut self) -> io::Result<Option<CorrectionRecord>> {
        let mut buf = [0u8; 8];
        let mut filled = 0;
        while filled < 8 {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated correction record"));
            }
            filled += n;
        }
        let (record, _) = CorrectionRecord::decode(u64::from_le_bytes(buf))?;
        Ok(Some(record))
    }

    /// Returns the next read's record run, or `None` at end of stream.
    pub fn next_read(&mut self) -> io::Result<Option<ReadCorrections>> {
        let head = match self.pending.take() {
            Some(record) => record,
            None => return Ok(None),
        };
        let (read_id, keep_left, keep_right) = match head {
            CorrectionRecord::Ident { read_id, keep_left, keep_right } => (read_id, keep_left, keep_right),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("correction stream group does not start with IDENT: {:?}", other),
                ));
            }
        };

        let mut records: Vec<CorrectionRecord> = Vec::<CorrectionRecord>::new();
        loop {
            match self.read_record()? {
                Some(CorrectionRecord::Ident { read_id, keep_left, keep_right }) => {
                    self.pending = Some(CorrectionRecord::Ident { read_id, keep_left, keep_right });
                    break;
                }
                Some(record) => {
                    records.push(record);
                }
                None => {
                    break;
                }
            }
        }

        Ok(Some(ReadCorrections {
            read_id,
            keep_left,
            keep_right,
            records,
        }))
    }
}

/// Decides zero or more corrections for one position from its finalized tally.
/// Substitution/deletion first, then the insertion decision (which lands at
/// `pos + 1` since insertion evidence anchors on the base to its left).
/// # Arguments
/// * `tally` - the finalized vote tally for the position
/// * `original` - the read's original base at the position (integer-coded)
/// * `pos` - the position within the read
/// * `use_haplo` - whether the heterozygous-site rejection is active
/// * `out` - decided records are appended here in position order
pub fn decide_position(
    tally: &VoteTally,
    original: u8,
    pos: usize,
    use_haplo: bool,
    out: &mut Vec<CorrectionRecord>,
) {
    decide_base(tally, original, pos, use_haplo, out);
    decide_insert(tally, pos, use_haplo, out);
}

fn decide_base(
    tally: &VoteTally,
    original: u8,
    pos: usize,
    use_haplo: bool,
    out: &mut Vec<CorrectionRecord>,
) {
    //kinds ordered delete, a, c, g, t; ties resolve to the earliest
    let counts: [u16; 5] = [tally.deletes, tally.a_subst, tally.c_subst, tally.g_subst, tally.t_subst];
    let total: u32 = counts.iter().map(|&c| c as u32).sum();
    if total <= 1 {
        return;
    }

    let mut max_kind: usize = 0;
    for kind in 1..5 {
        if counts[kind] > counts[max_kind] {
            max_kind = kind;
        }
    }
    let max_count = counts[max_kind] as u32;
    if 2 * max_count <= total {
        return;
    }
    if max_kind >= 1 && (max_kind - 1) as u8 == original {
        //the winning vote is the base already there
        return;
    }
    if use_haplo {
        let haplo_ct = counts.iter().filter(|&&c| c >= MIN_HAPLO_OCCURS).count();
        if haplo_ct >= 2 {
            //two strong alleles: a heterozygous site, not an error
            return;
        }
    }
    if tally.confirmed >= 2 {
        return;
    }
    if tally.confirmed == 1 && max_count <= 6 {
        return;
    }

    if max_kind == 0 {
        out.push(CorrectionRecord::Delete { pos: pos as u32 });
    } else {
        out.push(CorrectionRecord::Subst {
            pos: pos as u32,
            base: (max_kind - 1) as u8,
        });
    }
}

fn decide_insert(tally: &VoteTally, pos: usize, use_haplo: bool, out: &mut Vec<CorrectionRecord>) {
    let total = tally.insert_ct as u32;
    if total <= 1 {
        return;
    }

    //tally the distinct observed strings
    let mut distinct: Vec<(&[u8], u32)> = Vec::<(&[u8], u32)>::new();
    for s in tally.insert_strings() {
        match distinct.iter_mut().find(|(d, _)| *d == s) {
            Some((_, ct)) => *ct += 1,
            None => distinct.push((s, 1)),
        }
    }
    if distinct.is_empty() {
        return;
    }

    let (winner, max_count) = distinct
        .iter()
        .max_by_key(|(_, ct)| *ct)
        .map(|&(s, ct)| (s, ct))
        .unwrap();
    if 2 * max_count <= total {
        return;
    }
    if use_haplo {
        let haplo_ct = distinct.iter().filter(|(_, ct)| *ct >= MIN_HAPLO_OCCURS as u32).count();
        if haplo_ct >= 2 {
            return;
        }
    }
    if tally.no_insert >= 2 {
        return;
    }
    if tally.no_insert == 1 && max_count <= 6 {
        return;
    }

    //the insertion lands before the next original position
    for &base in winner.iter() {
        out.push(CorrectionRecord::Insert {
            pos: (pos + 1) as u32,
            base,
        });
    }
}
