
/// contains ASCII to integer encoding; everything outside acgt/ACGT maps to 0 ('a')
const STRING_TO_INT: [u8; 256] = build_stoi();

/// contains integer to ASCII encoding
const INT_TO_STRING: [u8; 4] = [
    b'a', b'c', b'g', b't'
];

/// for complementing in the integer space
pub const COMPLEMENT_INT: [u8; 4] = [3, 2, 1, 0]; //acgt -> tgca

/// builds up the STRING_TO_INT const for us
const fn build_stoi() -> [u8; 256] {
    let mut ret: [u8; 256] = [0; 256];

    ret['a' as usize] = 0;
    ret['c' as usize] = 1;
    ret['g' as usize] = 2;
    ret['t' as usize] = 3;

    ret['A' as usize] = 0;
    ret['C' as usize] = 1;
    ret['G' as usize] = 2;
    ret['T' as usize] = 3;

    ret
}

/// Helper function that reverse complements an integer vector
/// # Arguments
/// * `seq` - the sequence to reverse complement in integer format
/// # Examples
/// ```rust
/// use obec::string_util::reverse_complement_i;
/// let seq: Vec<u8> = vec![0, 0, 1, 2, 3]; //"aacgt"
/// let rev_comp = reverse_complement_i(&seq);
/// assert_eq!(rev_comp, vec![0, 1, 2, 3, 3]); //"acgtt"
/// ```
#[inline]
pub fn reverse_complement_i(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev() //reverse
        .map(|&c| COMPLEMENT_INT[c as usize]) //complement
        .collect::<Vec<u8>>() //collect and return
}

/// Helper function that converts a string to the corresponding Vec<u8> representation.
/// Unknown symbols are filtered to 0 ('a').
/// # Arguments
/// * `seq` - the sequence to convert to integer
/// # Examples
/// ```rust
/// use obec::string_util::convert_stoi;
/// let test = "acgtN";
/// let converted = convert_stoi(&test);
/// assert_eq!(converted, vec![0, 1, 2, 3, 0]);
/// ```
#[inline]
pub fn convert_stoi(seq: &str) -> Vec<u8> {
    seq.bytes()
        .map(|c| STRING_TO_INT[c as usize])
        .collect::<Vec<u8>>()
}

/// Same conversion, but starting from raw ASCII bytes (e.g. a FASTX record body).
/// # Arguments
/// * `seq` - the ASCII sequence bytes
#[inline]
pub fn encode_bytes(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|&c| STRING_TO_INT[c as usize])
        .collect::<Vec<u8>>()
}

/// Helper function that converts an integer array to its corresponding String representation
/// # Arguments
/// * `iseq` - the integer sequence to convert to String
/// # Examples
/// ```rust
/// use obec::string_util::convert_itos;
/// let test: Vec<u8> = vec![0, 1, 2, 3];
/// let converted = convert_itos(&test);
/// assert_eq!(&converted, "acgt");
/// ```
#[inline]
pub fn convert_itos(iseq: &[u8]) -> String {
    let ret_vec = iseq.iter()
        .map(|&v| INT_TO_STRING[v as usize])
        .collect::<Vec<u8>>();
    unsafe {
        //this is a no-alloc way to convert the collected Vec<u8> into a String
        String::from_utf8_unchecked(ret_vec)
    }
}
