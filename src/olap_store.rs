
use std::convert::TryInto;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// overlap store magic
pub const OLAP_MAGIC: [u8; 4] = *b"OOVL";
/// overlap store format version
pub const OLAP_VERSION: u32 = 1;
/// bytes per on-disk overlap record
pub const OLAP_RECORD_LEN: usize = 20;
/// store header length: magic + version + count
const OLAP_HEADER_LEN: u64 = 16;
/// byte offset of the erate field inside a record
const ERATE_FIELD_OFFSET: u64 = 18;

/// error-rate file magic
pub const ERATE_MAGIC: [u8; 4] = *b"OERA";
/// error-rate file format version
pub const ERATE_VERSION: u32 = 1;

/// One pairwise overlap as produced upstream. Hangs are in the a-read's
/// coordinates; `flipped` means the b-read participates reverse-complemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overlap {
    pub a_id: u32,
    pub b_id: u32,
    pub a_hang: i32,
    pub b_hang: i32,
    pub flipped: bool,
    /// quantized error rate, see `quantize_erate`
    pub erate: u16,
}

impl Overlap {
    fn encode(&self) -> [u8; OLAP_RECORD_LEN] {
        let mut buf = [0u8; OLAP_RECORD_LEN];
        buf[0..4].copy_from_slice(&self.a_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.b_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.a_hang.to_le_bytes());
        buf[12..16].copy_from_slice(&self.b_hang.to_le_bytes());
        buf[16] = self.flipped as u8;
        //buf[17] is padding
        buf[18..20].copy_from_slice(&self.erate.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; OLAP_RECORD_LEN]) -> io::Result<Overlap> {
        let flipped = match buf[16] {
            0 => false,
            1 => true,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad overlap orientation byte {}", other),
                ));
            }
        };
        Ok(Overlap {
            a_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            b_id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            a_hang: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            b_hang: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
            flipped,
            erate: u16::from_le_bytes(buf[18..20].try_into().unwrap()),
        })
    }
}

/// Quantizes an error rate to basis points.
/// # Examples
/// ```rust
/// use obec::olap_store::{quantize_erate, erate_value};
/// assert_eq!(quantize_erate(0.0153), 153);
/// assert_eq!(erate_value(153), 0.0153);
/// ```
#[inline]
pub fn quantize_erate(rate: f64) -> u16 {
    let scaled = (rate * 10000.0).round();
    if scaled >= u16::max_value() as f64 {
        u16::max_value()
    } else if scaled <= 0.0 {
        0
    } else {
        scaled as u16
    }
}

/// The error rate a quantized value stands for.
#[inline]
pub fn erate_value(quantized: u16) -> f64 {
    quantized as f64 / 10000.0
}

/// Writes a new overlap store. Records must arrive sorted by `a_id`.
pub struct OverlapStoreWriter {
    writer: BufWriter<File>,
    count: u64,
    last_a_id: u32,
}

impl OverlapStoreWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<OverlapStoreWriter> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&OLAP_MAGIC)?;
        writer.write_all(&OLAP_VERSION.to_le_bytes())?;
        //count is back-patched on finish
        writer.write_all(&0u64.to_le_bytes())?;
        Ok(OverlapStoreWriter {
            writer,
            count: 0,
            last_a_id: 0,
        })
    }

    pub fn write_overlap(&mut self, overlap: &Overlap) -> io::Result<()> {
        assert!(overlap.a_id >= self.last_a_id, "overlap store records must be sorted by a_id");
        self.last_a_id = overlap.a_id;
        self.writer.write_all(&overlap.encode())?;
        self.count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()?;
        let mut file = self.writer.into_inner()?;
        file.seek(SeekFrom::Start(8))?;
        file.write_all(&self.count.to_le_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// A read view over an on-disk overlap store.
pub struct OverlapStore {
    reader: BufReader<File>,
    count: u64,
}

impl OverlapStore {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<OverlapStore> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != OLAP_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an overlap store"));
        }
        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != OLAP_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported overlap store version {}", version),
            ));
        }
        let mut count = [0u8; 8];
        reader.read_exact(&mut count)?;
        Ok(OverlapStore {
            reader,
            count: u64::from_le_bytes(count),
        })
    }

    /// Total records in the store.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    fn read_record(&mut self) -> io::Result<Overlap> {
        let mut buf = [0u8; OLAP_RECORD_LEN];
        self.reader.read_exact(&mut buf)?;
        Overlap::decode(&buf)
    }

    /// Loads the overlaps whose `a_id` falls in `[lo, hi]`, returning the
    /// store index of the first one alongside them. The store is sorted, so
    /// a record past `hi` ends the scan. Sortedness violations surface as
    /// `InvalidData`.
    pub fn load_range(&mut self, lo: u32, hi: u32) -> io::Result<(u64, Vec<Overlap>)> {
        self.reader.seek(SeekFrom::Start(OLAP_HEADER_LEN))?;
        let mut overlaps: Vec<Overlap> = Vec::<Overlap>::new();
        let mut first_index: u64 = 0;
        let mut last_a_id: u32 = 0;
        for index in 0..self.count {
            let overlap = self.read_record()?;
            if overlap.a_id < last_a_id {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "overlap store is not sorted by a_id"));
            }
            last_a_id = overlap.a_id;
            if overlap.a_id > hi {
                break;
            }
            if overlap.a_id < lo {
                continue;
            }
            if overlaps.is_empty() {
                first_index = index;
            }
            overlaps.push(overlap);
        }
        Ok((first_index, overlaps))
    }

    /// Loads the whole store.
    pub fn load_all(&mut self) -> io::Result<Vec<Overlap>> {
        Ok(self.load_range(0, u32::max_value())?.1)
    }
}

/// The recomputed error rates for a contiguous a-id range, in overlap-list
/// order. This is the stage-2 output, applied back onto the store separately.
#[derive(Clone, Debug, PartialEq)]
pub struct ErateSet {
    pub first_id: u32,
    pub last_id: u32,
    pub erates: Vec<u16>,
}

impl ErateSet {
    /// Writes the set in the error-rate file format.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&ERATE_MAGIC)?;
        writer.write_all(&ERATE_VERSION.to_le_bytes())?;
        writer.write_all(&self.first_id.to_le_bytes())?;
        writer.write_all(&self.last_id.to_le_bytes())?;
        writer.write_all(&(self.erates.len() as u64).to_le_bytes())?;
        for &erate in self.erates.iter() {
            writer.write_all(&erate.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()
    }

    /// Reads an error-rate file back.
    pub fn read<R: Read>(mut reader: R) -> io::Result<ErateSet> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ERATE_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an error-rate file"));
        }
        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let version = u32::from_le_bytes(word);
        if version != ERATE_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported error-rate file version {}", version),
            ));
        }
        reader.read_exact(&mut word)?;
        let first_id = u32::from_le_bytes(word);
        reader.read_exact(&mut word)?;
        let last_id = u32::from_le_bytes(word);
        let mut count = [0u8; 8];
        reader.read_exact(&mut count)?;
        let count = u64::from_le_bytes(count);

        let mut erates: Vec<u16> = Vec::with_capacity(count as usize);
        let mut value = [0u8; 2];
        for _ in 0..count {
            reader.read_exact(&mut value)?;
            erates.push(u16::from_le_bytes(value));
        }
        Ok(ErateSet { first_id, last_id, erates })
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<ErateSet> {
        ErateSet::read(BufReader::new(File::open(path)?))
    }
}

/// Rewrites the erate field of the store records covered by `erates`, in
/// place. The store must be the one the rates were computed against; an
/// a-id outside the set's range where a value would land is `InvalidData`.
pub fn apply_erates<P: AsRef<Path>>(store_path: P, erates: &ErateSet) -> io::Result<u64> {
    let (first_index, covered) = {
        let mut store = OverlapStore::open(&store_path)?;
        store.load_range(erates.first_id, erates.last_id)?
    };
    if covered.len() != erates.erates.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "error-rate set carries {} values but the store has {} overlaps in range",
                erates.erates.len(),
                covered.len()
            ),
        ));
    }

    let mut file = OpenOptions::new().read(true).write(true).open(&store_path)?;
    for (i, &erate) in erates.erates.iter().enumerate() {
        let offset = OLAP_HEADER_LEN + (first_index + i as u64) * OLAP_RECORD_LEN as u64 + ERATE_FIELD_OFFSET;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&erate.to_le_bytes())?;
    }
    file.flush()?;
    Ok(erates.erates.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn test_overlaps() -> Vec<Overlap> {
        vec![
            Overlap { a_id: 0, b_id: 5, a_hang: 12, b_hang: -3, flipped: false, erate: 250 },
            Overlap { a_id: 1, b_id: 0, a_hang: -12, b_hang: 3, flipped: false, erate: 250 },
            Overlap { a_id: 1, b_id: 9, a_hang: 40, b_hang: 7, flipped: true, erate: 613 },
            Overlap { a_id: 3, b_id: 2, a_hang: 0, b_hang: 0, flipped: false, erate: 99 },
        ]
    }

    fn write_store(overlaps: &[Overlap]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = OverlapStoreWriter::create(file.path()).unwrap();
        for overlap in overlaps {
            writer.write_overlap(overlap).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn test_store_roundtrip() {
        let overlaps = test_overlaps();
        let file = write_store(&overlaps);
        let mut store = OverlapStore::open(file.path()).unwrap();
        assert_eq!(store.count(), 4);
        assert_eq!(store.load_all().unwrap(), overlaps);
    }

    #[test]
    fn test_load_range() {
        let overlaps = test_overlaps();
        let file = write_store(&overlaps);
        let mut store = OverlapStore::open(file.path()).unwrap();

        let (first_index, in_range) = store.load_range(1, 1).unwrap();
        assert_eq!(first_index, 1);
        assert_eq!(in_range, overlaps[1..3].to_vec());

        let (_, empty) = store.load_range(4, 10).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    #[should_panic(expected = "sorted by a_id")]
    fn test_writer_rejects_unsorted() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = OverlapStoreWriter::create(file.path()).unwrap();
        writer.write_overlap(&Overlap { a_id: 2, b_id: 0, a_hang: 0, b_hang: 0, flipped: false, erate: 0 }).unwrap();
        writer.write_overlap(&Overlap { a_id: 1, b_id: 0, a_hang: 0, b_hang: 0, flipped: false, erate: 0 }).unwrap();
    }

    #[test]
    fn test_quantize_erate() {
        assert_eq!(quantize_erate(0.0), 0);
        assert_eq!(quantize_erate(0.02), 200);
        assert_eq!(quantize_erate(1.0), 10000);
        //way out of range saturates rather than wrapping
        assert_eq!(quantize_erate(10.0), u16::max_value());
        assert!((erate_value(quantize_erate(0.0614)) - 0.0614).abs() < 1e-9);
    }

    #[test]
    fn test_erate_set_roundtrip() {
        let erates = ErateSet { first_id: 5, last_id: 100, erates: vec![1, 2, 65535, 0] };
        let mut buffer: Vec<u8> = Vec::<u8>::new();
        erates.write(&mut buffer).unwrap();
        assert_eq!(ErateSet::read(Cursor::new(buffer)).unwrap(), erates);
    }

    #[test]
    fn test_apply_erates_in_place() {
        let overlaps = test_overlaps();
        let file = write_store(&overlaps);

        let erates = ErateSet { first_id: 1, last_id: 1, erates: vec![111, 222] };
        assert_eq!(apply_erates(file.path(), &erates).unwrap(), 2);

        let mut store = OverlapStore::open(file.path()).unwrap();
        let rewritten = store.load_all().unwrap();
        assert_eq!(rewritten[0].erate, 250);
        assert_eq!(rewritten[1].erate, 111);
        assert_eq!(rewritten[2].erate, 222);
        assert_eq!(rewritten[3].erate, 99);
        //everything else survives untouched
        assert_eq!(rewritten[2].b_id, 9);
        assert!(rewritten[2].flipped);
    }

    #[test]
    fn test_apply_erates_count_mismatch() {
        let file = write_store(&test_overlaps());
        let erates = ErateSet { first_id: 1, last_id: 1, erates: vec![111] };
        assert!(apply_erates(file.path(), &erates).is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"JUNKJUNKJUNKJUNKJUNK").unwrap();
        assert!(OverlapStore::open(file.path()).is_err());
    }
}
