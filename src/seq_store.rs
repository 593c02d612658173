
use std::io;
use std::path::Path;

use needletail::parse_fastx_file;

use crate::string_util::encode_bytes;

/// An in-memory, id-indexed store of integer-coded reads. Read ids are the
/// 0-based record indices of the source file. Loaded once, shared immutably.
pub struct SequenceStore {
    reads: Vec<Vec<u8>>,
}

impl SequenceStore {
    /// Loads every record of a FASTA/FASTQ file (plain or gzip).
    /// # Arguments
    /// * `path` - the reads file
    pub fn from_fastx_file<P: AsRef<Path>>(path: P) -> io::Result<SequenceStore> {
        let mut fastx_reader = parse_fastx_file(path.as_ref()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to open reads file {:?}: {:?}", path.as_ref(), e),
            )
        })?;
        let mut reads: Vec<Vec<u8>> = Vec::<Vec<u8>>::new();
        while let Some(raw_record) = fastx_reader.next() {
            let record = raw_record.map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid record at read index {}: {:?}", reads.len(), e),
                )
            })?;
            reads.push(encode_bytes(&record.seq()));
        }
        Ok(SequenceStore { reads })
    }

    /// Wraps already-encoded reads, mainly for tests.
    pub fn from_reads(reads: Vec<Vec<u8>>) -> SequenceStore {
        SequenceStore { reads }
    }

    /// The integer-coded read with id `read_id`.
    #[inline]
    pub fn get_read(&self, read_id: u32) -> &[u8] {
        &self.reads[read_id as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// Total bases across reads `[lo, hi)`, for batch sizing.
    pub fn span_bases(&self, lo: u32, hi: u32) -> usize {
        self.reads[lo as usize..hi as usize]
            .iter()
            .map(|r| r.len())
            .sum()
    }
}
