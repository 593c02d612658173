
use std::io;
use std::io::Write;
use std::sync::{mpsc, Arc};

use log::debug;
use threadpool::ThreadPool;

use crate::banded_align::BandedAligner;
use crate::correction::{CorrectionWriter, ReadCorrections};
use crate::find_errors::{process_read, FindErrorsParameters, FindErrorsStats};
use crate::olap_store::Overlap;
use crate::seq_store::SequenceStore;

/// one contiguous read window plus its slice of the sorted overlap list
struct Batch {
    /// first read id (inclusive)
    lo: u32,
    /// one past the last read id
    hi: u32,
    overlaps: Vec<Overlap>,
}

type WorkerResult = (Vec<ReadCorrections>, FindErrorsStats);

/// Drives stage 1 across a thread pool. The read range is cut into
/// byte-bounded batches; every batch is shared immutably and each worker `j`
/// owns the reads with `a_id % threads == j` outright, so no tally is ever
/// shared. While the pool runs one batch the producer extracts the next.
pub struct ParallelReadProcessor {
    params: Arc<FindErrorsParameters>,
    pool: ThreadPool,
}

impl ParallelReadProcessor {
    pub fn new(params: Arc<FindErrorsParameters>) -> ParallelReadProcessor {
        let pool = ThreadPool::new(params.threads.max(1));
        ParallelReadProcessor { params, pool }
    }

    /// Corrects every read in the configured range and appends the decided
    /// records to `writer` in read order.
    /// # Arguments
    /// * `seqs` - the read store
    /// * `overlaps` - the sorted overlap list covering the read range
    /// * `writer` - the correction stream under construction
    pub fn run<W: Write>(
        &self,
        seqs: &Arc<SequenceStore>,
        overlaps: &[Overlap],
        writer: &mut CorrectionWriter<W>,
    ) -> io::Result<FindErrorsStats> {
        let range_hi = (self.params.end_id as u64 + 1).min(seqs.len() as u64) as u32;
        let threads = self.params.threads.max(1);
        let (tx, rx) = mpsc::channel::<WorkerResult>();

        let mut stats = FindErrorsStats::default();
        let mut olap_cursor: usize = 0;
        let mut next_id = self.params.begin_id;
        let mut running = false;
        if let Some(batch) = self.extract_batch(seqs, overlaps, &mut olap_cursor, &mut next_id, range_hi) {
            self.submit(seqs, &batch, &tx);
            running = true;
        }

        while running {
            //extract the next batch while the pool chews on the current one
            let next_batch = self.extract_batch(seqs, overlaps, &mut olap_cursor, &mut next_id, range_hi);

            let mut decided: Vec<ReadCorrections> = Vec::<ReadCorrections>::new();
            for _ in 0..threads {
                let (corrections, worker_stats) = rx.recv().map_err(|e| {
                    io::Error::new(io::ErrorKind::Other, format!("worker thread lost: {:?}", e))
                })?;
                stats.absorb(&worker_stats);
                decided.extend(corrections);
            }
            decided.sort_by_key(|c| c.read_id);
            for corrections in decided.iter() {
                writer.write_read(corrections)?;
            }

            running = false;
            if let Some(batch) = next_batch {
                self.submit(seqs, &batch, &tx);
                running = true;
            }
        }
        Ok(stats)
    }

    /// Cuts the next batch: a contiguous id window whose total bases stay
    /// under `batch_bytes` (always at least one read), with its overlap slice.
    fn extract_batch(
        &self,
        seqs: &Arc<SequenceStore>,
        overlaps: &[Overlap],
        olap_cursor: &mut usize,
        next_id: &mut u32,
        range_hi: u32,
    ) -> Option<Arc<Batch>> {
        if *next_id >= range_hi {
            return None;
        }
        let lo = *next_id;
        let mut hi = lo;
        let mut bases: usize = 0;
        while hi < range_hi {
            let read_len = seqs.get_read(hi).len();
            if hi > lo && bases + read_len > self.params.batch_bytes {
                break;
            }
            bases += read_len;
            hi += 1;
        }
        *next_id = hi;

        while *olap_cursor < overlaps.len() && overlaps[*olap_cursor].a_id < lo {
            *olap_cursor += 1;
        }
        let start = *olap_cursor;
        while *olap_cursor < overlaps.len() && overlaps[*olap_cursor].a_id < hi {
            *olap_cursor += 1;
        }
        debug!("batch [{}, {}): {} bases, {} overlaps", lo, hi, bases, *olap_cursor - start);

        Some(Arc::new(Batch {
            lo,
            hi,
            overlaps: overlaps[start..*olap_cursor].to_vec(),
        }))
    }

    /// Submits one job per worker index for a batch.
    fn submit(&self, seqs: &Arc<SequenceStore>, batch: &Arc<Batch>, tx: &mpsc::Sender<WorkerResult>) {
        let threads = self.params.threads.max(1);
        for worker_index in 0..threads {
            let seqs = Arc::clone(seqs);
            let batch = Arc::clone(batch);
            let params = Arc::clone(&self.params);
            let tx = tx.clone();
            self.pool.execute(move || {
                let result = run_worker(&seqs, &batch, &params, worker_index, threads);
                tx.send(result).expect("result channel closed early");
            });
        }
    }
}

/// Processes the batch reads owned by one worker index, in ascending order.
fn run_worker(
    seqs: &SequenceStore,
    batch: &Batch,
    params: &FindErrorsParameters,
    worker_index: usize,
    threads: usize,
) -> WorkerResult {
    let mut aligner = BandedAligner::new(params.max_error_rate);
    let mut stats = FindErrorsStats::default();
    let mut decided: Vec<ReadCorrections> = Vec::<ReadCorrections>::new();

    let mut cursor: usize = 0;
    for read_id in batch.lo..batch.hi {
        while cursor < batch.overlaps.len() && batch.overlaps[cursor].a_id < read_id {
            cursor += 1;
        }
        let start = cursor;
        while cursor < batch.overlaps.len() && batch.overlaps[cursor].a_id == read_id {
            cursor += 1;
        }
        if read_id as usize % threads != worker_index {
            continue;
        }
        decided.push(process_read(
            seqs,
            read_id,
            &batch.overlaps[start..cursor],
            &mut aligner,
            params,
            &mut stats,
        ));
    }
    (decided, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::CorrectionReader;
    use crate::string_util::convert_stoi;
    use std::io::Cursor;

    const TRUTH: &str = "cgatcgattagcatcgatcagctacgatcga";

    /// a handful of reads where every odd read carries one error, plus
    /// unanimous overlaps against the clean even reads
    fn build_fixture() -> (Arc<SequenceStore>, Vec<Overlap>) {
        let truth = convert_stoi(&TRUTH);
        let mut reads: Vec<Vec<u8>> = Vec::<Vec<u8>>::new();
        for read_id in 0..6 {
            let mut read = truth.clone();
            if read_id % 2 == 1 {
                read[15] = if truth[15] == 0 { 1 } else { 0 };
            }
            reads.push(read);
        }

        let mut overlaps: Vec<Overlap> = Vec::<Overlap>::new();
        for a_id in 0..6u32 {
            for b_id in [0u32, 2, 4].iter() {
                if *b_id == a_id {
                    continue;
                }
                overlaps.push(Overlap {
                    a_id,
                    b_id: *b_id,
                    a_hang: 0,
                    b_hang: 0,
                    flipped: false,
                    erate: 0,
                });
            }
        }
        (Arc::new(SequenceStore::from_reads(reads)), overlaps)
    }

    fn run_with_threads(threads: usize, batch_bytes: usize) -> Vec<ReadCorrections> {
        let (seqs, overlaps) = build_fixture();
        let params = Arc::new(FindErrorsParameters {
            threads,
            batch_bytes,
            ..Default::default()
        });
        let processor = ParallelReadProcessor::new(params);
        let mut writer = CorrectionWriter::new(Vec::<u8>::new()).unwrap();
        let stats = processor.run(&seqs, &overlaps, &mut writer).unwrap();
        assert_eq!(stats.reads_processed, 6);

        let bytes = writer.finish().unwrap();
        let mut reader = CorrectionReader::new(Cursor::new(bytes)).unwrap();
        let mut all: Vec<ReadCorrections> = Vec::<ReadCorrections>::new();
        while let Some(group) = reader.next_read().unwrap() {
            all.push(group);
        }
        all
    }

    #[test]
    fn test_single_thread_run() {
        let all = run_with_threads(1, usize::max_value());
        assert_eq!(all.len(), 6);
        for (read_id, group) in all.iter().enumerate() {
            assert_eq!(group.read_id, read_id as u32);
            //odd reads carry the planted error, even reads are clean
            assert_eq!(group.records.len(), (read_id % 2 == 1) as usize);
        }
    }

    #[test]
    fn test_multi_thread_matches_single_thread() {
        let serial = run_with_threads(1, usize::max_value());
        let parallel = run_with_threads(3, usize::max_value());
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_tiny_batches_preserve_order() {
        let serial = run_with_threads(1, usize::max_value());
        //one read per batch
        let batched = run_with_threads(2, 1);
        assert_eq!(serial, batched);
    }
}
