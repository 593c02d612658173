
pub mod analyze;
pub mod banded_align;
pub mod correction;
pub mod error_diff;
pub mod find_errors;
pub mod olap_store;
pub mod pipeline;
pub mod read_corrector;
pub mod rescore;
pub mod seq_store;
pub mod string_util;
pub mod vote;
