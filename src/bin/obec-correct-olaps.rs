
extern crate clap;
extern crate env_logger;
extern crate exitcode;
extern crate log;

use bio::io::fasta;
use clap::{value_t, App, Arg};
use log::{error, info};
use std::fs::File;
use std::io::BufReader;

use obec::correction::CorrectionReader;
use obec::olap_store::{apply_erates, OverlapStore};
use obec::rescore::{correct_reads, rescore_overlaps, RescoreParameters, RescoreStats};
use obec::seq_store::SequenceStore;
use obec::string_util::convert_itos;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn main() {
    //initialize logging for our benefit later
    env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

    //this is the CLI block, params that get populated appear before
    let reads_fn: String;
    let olaps_fn: String;
    let corrections_fn: String;
    let erates_fn: String;
    let mut defaults = RescoreParameters::default();
    let verbose_mode: bool;
    let apply_mode: bool;
    let corrected_fn: Option<String>;
    let summary_fn: Option<String>;

    let matches = App::new("obec-correct-olaps")
        .version(VERSION.unwrap_or("?"))
        .about("Overlap-Based Error Corrector - re-score overlaps against corrected reads")
        .arg(Arg::with_name("verbose_mode")
            .short("v")
            .long("verbose")
            .help("enable verbose output"))
        .arg(Arg::with_name("begin_id")
            .short("b")
            .long("begin_index")
            .takes_value(true)
            .help("id of the first a-read to rescore (default: 0)"))
        .arg(Arg::with_name("end_id")
            .short("e")
            .long("end_index")
            .takes_value(true)
            .help("id of the last a-read to rescore (default: end of store)"))
        .arg(Arg::with_name("error_rate")
            .long("error_rate")
            .takes_value(true)
            .help("maximum tolerated alignment error rate (default: 0.06)"))
        .arg(Arg::with_name("ignore_flank")
            .long("ignore_flank")
            .takes_value(true)
            .help("alignment columns at each end whose events are not counted (default: 5)"))
        .arg(Arg::with_name("no_trivial_filter")
            .long("no_trivial_filter")
            .help("count events even inside locally repetitive sequence"))
        .arg(Arg::with_name("apply")
            .long("apply")
            .help("rewrite the overlap store's error rates in place after rescoring"))
        .arg(Arg::with_name("corrected_out")
            .long("corrected_out")
            .takes_value(true)
            .help("also write the corrected reads as FASTA to this file"))
        .arg(Arg::with_name("summary")
            .long("summary")
            .takes_value(true)
            .help("write a JSON run summary to this file"))
        .arg(Arg::with_name("READS")
            .help("The FASTX file with raw reads")
            .required(true)
            .index(1))
        .arg(Arg::with_name("OLAPS")
            .help("The overlap store computed against the raw reads")
            .required(true)
            .index(2))
        .arg(Arg::with_name("CORRECTIONS")
            .help("The correction stream from obec-find-errors")
            .required(true)
            .index(3))
        .arg(Arg::with_name("ERATES_OUT")
            .help("The error-rate file to write")
            .required(true)
            .index(4))
        .get_matches();

    //pull out required values
    reads_fn = matches.value_of("READS").unwrap().to_string();
    olaps_fn = matches.value_of("OLAPS").unwrap().to_string();
    corrections_fn = matches.value_of("CORRECTIONS").unwrap().to_string();
    erates_fn = matches.value_of("ERATES_OUT").unwrap().to_string();

    //now check options
    verbose_mode = matches.is_present("verbose_mode");
    apply_mode = matches.is_present("apply");
    defaults.begin_id = value_t!(matches.value_of("begin_id"), u32).unwrap_or(defaults.begin_id);
    defaults.end_id = value_t!(matches.value_of("end_id"), u32).unwrap_or(defaults.end_id);
    defaults.max_error_rate = value_t!(matches.value_of("error_rate"), f64).unwrap_or(defaults.max_error_rate);
    defaults.error_diff.ignore_flank = value_t!(matches.value_of("ignore_flank"), usize).unwrap_or(defaults.error_diff.ignore_flank);
    defaults.error_diff.filter_trivial = !matches.is_present("no_trivial_filter");
    corrected_fn = matches.value_of("corrected_out").map(|s| s.to_string());
    summary_fn = matches.value_of("summary").map(|s| s.to_string());

    info!("Input parameters (required):");
    info!("\tReads: \"{}\"", reads_fn);
    match File::open(&reads_fn) {
        Ok(_) => {}
        Err(e) => {
            error!("Failed to open reads file: {:?}", e);
            std::process::exit(exitcode::NOINPUT);
        }
    };

    info!("\tOverlap store: \"{}\"", olaps_fn);
    match File::open(&olaps_fn) {
        Ok(_) => {}
        Err(e) => {
            error!("Failed to open overlap store: {:?}", e);
            std::process::exit(exitcode::NOINPUT);
        }
    };

    info!("\tCorrection stream: \"{}\"", corrections_fn);
    let corrections_file = match File::open(&corrections_fn) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open correction stream: {:?}", e);
            std::process::exit(exitcode::NOINPUT);
        }
    };

    info!("\tOutput error rates: \"{}\"", erates_fn);

    info!("Execution Parameters:");
    info!("\tverbose: {}", verbose_mode);
    info!("\tapply to store: {}", apply_mode);
    info!("Rescore Parameters:");
    info!("\toverlaps to rescore: a-id in [{}, {}]", defaults.begin_id, defaults.end_id);
    if defaults.begin_id > defaults.end_id {
        error!("--begin_index set to value larger than --end_index");
        std::process::exit(exitcode::DATAERR);
    }
    info!("\terror rate: {}", defaults.max_error_rate);
    if !(defaults.max_error_rate > 0.0 && defaults.max_error_rate < 0.5) {
        error!("--error_rate must be within the range (0, 0.5)");
        std::process::exit(exitcode::DATAERR);
    }
    info!("\tignore flank: {}", defaults.error_diff.ignore_flank);
    info!("\ttrivial-DNA filter: {}", defaults.error_diff.filter_trivial);

    //load the reads into memory
    info!("Loading reads into memory...");
    let seqs = match SequenceStore::from_fastx_file(&reads_fn) {
        Ok(seqs) => seqs,
        Err(e) => {
            error!("Failed to load reads file: {:?}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    info!("Loaded {} reads", seqs.len());

    //replay the correction stream against every read
    info!("Materializing corrected reads...");
    let mut stats = RescoreStats::default();
    let mut correction_reader = match CorrectionReader::new(BufReader::new(corrections_file)) {
        Ok(reader) => reader,
        Err(e) => {
            error!("Failed to read correction stream: {:?}", e);
            std::process::exit(exitcode::DATAERR);
        }
    };
    let corrected = match correct_reads(&seqs, &mut correction_reader, &mut stats) {
        Ok(corrected) => corrected,
        Err(e) => {
            error!("Failed while replaying corrections: {:?}", e);
            std::process::exit(exitcode::DATAERR);
        }
    };
    info!("Corrected {} of {} reads", stats.reads_corrected, corrected.len());

    if let Some(corrected_fn) = corrected_fn {
        info!("Writing corrected reads to \"{}\"...", corrected_fn);
        let write_file: File = match File::create(&corrected_fn) {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to create corrected reads file: {:?}", e);
                std::process::exit(exitcode::NOINPUT);
            }
        };
        let mut fasta_writer = fasta::Writer::new(write_file);
        for (read_id, read) in corrected.iter().enumerate() {
            match fasta_writer.write(&read_id.to_string(), None, convert_itos(&read.seq).as_bytes()) {
                Ok(()) => {}
                Err(e) => {
                    error!("Failed while writing corrected read: {:?}", e);
                    std::process::exit(exitcode::IOERR);
                }
            };
        }
    }

    //load the overlaps for the requested range
    let overlaps = match OverlapStore::open(&olaps_fn).and_then(|mut store| {
        store.load_range(defaults.begin_id, defaults.end_id).map(|(_, overlaps)| overlaps)
    }) {
        Ok(overlaps) => overlaps,
        Err(e) => {
            error!("Failed to load overlap store: {:?}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    info!("Loaded {} overlaps in range", overlaps.len());

    info!("Starting overlap rescoring...");
    let erates = rescore_overlaps(&corrected, &overlaps, &defaults, &mut stats);
    match erates.write_file(&erates_fn) {
        Ok(_) => {}
        Err(e) => {
            error!("Failed to write error-rate file: {:?}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    info!(
        "Finished rescoring {} overlaps ({} kept stale rates)",
        stats.overlaps_processed, stats.rescore_failures
    );

    if apply_mode {
        info!("Applying new rates to the overlap store...");
        match apply_erates(&olaps_fn, &erates) {
            Ok(applied) => {
                info!("Rewrote {} overlap records", applied);
            }
            Err(e) => {
                error!("Failed to apply error rates: {:?}", e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    if let Some(summary_fn) = summary_fn {
        let summary = serde_json::json!({
            "reads_corrected": stats.reads_corrected,
            "overlaps_processed": stats.overlaps_processed,
            "rescore_failures": stats.rescore_failures
        });
        match std::fs::write(&summary_fn, summary.to_string()) {
            Ok(_) => {
                info!("Wrote summary to \"{}\"", summary_fn);
            }
            Err(e) => {
                error!("Failed to write summary file: {:?}", e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }
}
