
extern crate clap;
extern crate env_logger;
extern crate exitcode;
extern crate log;

use clap::{value_t, App, Arg};
use log::{error, info};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use obec::correction::CorrectionWriter;
use obec::find_errors::FindErrorsParameters;
use obec::olap_store::OverlapStore;
use obec::pipeline::ParallelReadProcessor;
use obec::seq_store::SequenceStore;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn main() {
    //initialize logging for our benefit later
    env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

    //this is the CLI block, params that get populated appear before
    let reads_fn: String;
    let olaps_fn: String;
    let corrections_fn: String;
    let mut defaults = FindErrorsParameters::default();
    let verbose_mode: bool;
    let summary_fn: Option<String>;

    let matches = App::new("obec-find-errors")
        .version(VERSION.unwrap_or("?"))
        .about("Overlap-Based Error Corrector - vote on read errors and emit a correction stream")
        .arg(Arg::with_name("verbose_mode")
            .short("v")
            .long("verbose")
            .help("enable verbose output"))
        .arg(Arg::with_name("threads")
            .short("t")
            .long("threads")
            .takes_value(true)
            .help("number of correction threads (default: 1)"))
        .arg(Arg::with_name("begin_id")
            .short("b")
            .long("begin_index")
            .takes_value(true)
            .help("id of the first read to correct (default: 0)"))
        .arg(Arg::with_name("end_id")
            .short("e")
            .long("end_index")
            .takes_value(true)
            .help("id of the last read to correct (default: end of store)"))
        .arg(Arg::with_name("kmer_len")
            .short("k")
            .long("kmer_len")
            .takes_value(true)
            .help("exact-match run length that confirms its interior (default: 9)"))
        .arg(Arg::with_name("end_exclude")
            .short("x")
            .long("end_exclude")
            .takes_value(true)
            .help("confirmed-run flank width that still votes normally (default: 3)"))
        .arg(Arg::with_name("degree_threshold")
            .short("d")
            .long("degree_threshold")
            .takes_value(true)
            .help("ends with fewer overlaps than this are flagged keep (default: 2)"))
        .arg(Arg::with_name("error_rate")
            .long("error_rate")
            .takes_value(true)
            .help("maximum tolerated alignment error rate (default: 0.06)"))
        .arg(Arg::with_name("no_haplo")
            .long("no_haplo")
            .help("disable the heterozygous-site rejection heuristic"))
        .arg(Arg::with_name("batch_bytes")
            .long("batch_bytes")
            .takes_value(true)
            .help("batch size bound in read bases (default: 67108864)"))
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
        .arg(Arg::with_name("CORRECTIONS_OUT")
            .help("The correction stream file to write")
            .required(true)
            .index(3))
        .get_matches();

    //pull out required values
    reads_fn = matches.value_of("READS").unwrap().to_string();
    olaps_fn = matches.value_of("OLAPS").unwrap().to_string();
    corrections_fn = matches.value_of("CORRECTIONS_OUT").unwrap().to_string();

    //now check options
    verbose_mode = matches.is_present("verbose_mode");
    defaults.threads = value_t!(matches.value_of("threads"), usize).unwrap_or(defaults.threads);
    defaults.begin_id = value_t!(matches.value_of("begin_id"), u32).unwrap_or(defaults.begin_id);
    defaults.end_id = value_t!(matches.value_of("end_id"), u32).unwrap_or(defaults.end_id);
    defaults.kmer_len = value_t!(matches.value_of("kmer_len"), usize).unwrap_or(defaults.kmer_len);
    defaults.end_exclude_len = value_t!(matches.value_of("end_exclude"), usize).unwrap_or(defaults.end_exclude_len);
    defaults.degree_threshold = value_t!(matches.value_of("degree_threshold"), u32).unwrap_or(defaults.degree_threshold);
    defaults.max_error_rate = value_t!(matches.value_of("error_rate"), f64).unwrap_or(defaults.max_error_rate);
    defaults.use_haplo = !matches.is_present("no_haplo");
    defaults.batch_bytes = value_t!(matches.value_of("batch_bytes"), usize).unwrap_or(defaults.batch_bytes);
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

    info!("\tOutput correction stream: \"{}\"", corrections_fn);
    let write_file: File = match File::create(&corrections_fn) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to create correction stream file: {:?}", e);
            std::process::exit(exitcode::NOINPUT);
        }
    };

    info!("Execution Parameters:");
    info!("\tverbose: {}", verbose_mode);
    info!("\tthreads: {}", defaults.threads);
    if defaults.threads == 0 {
        error!("--threads must be greater than 0");
        std::process::exit(exitcode::DATAERR);
    }
    info!("\tbatch bytes: {}", defaults.batch_bytes);
    info!("Correction Parameters:");
    info!("\treads to correct: [{}, {}]", defaults.begin_id, defaults.end_id);
    if defaults.begin_id > defaults.end_id {
        error!("--begin_index set to value larger than --end_index");
        std::process::exit(exitcode::DATAERR);
    }
    info!("\tk-mer length: {}", defaults.kmer_len);
    info!("\tend exclude: {}", defaults.end_exclude_len);
    if defaults.kmer_len <= 2 * defaults.end_exclude_len {
        error!("--kmer_len must be larger than twice --end_exclude");
        std::process::exit(exitcode::DATAERR);
    }
    info!("\tdegree threshold: {}", defaults.degree_threshold);
    info!("\terror rate: {}", defaults.max_error_rate);
    if !(defaults.max_error_rate > 0.0 && defaults.max_error_rate < 0.5) {
        error!("--error_rate must be within the range (0, 0.5)");
        std::process::exit(exitcode::DATAERR);
    }
    info!("\thaplotype heuristic: {}", defaults.use_haplo);

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
    let arc_seqs: Arc<SequenceStore> = Arc::new(seqs);

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

    let mut writer = match CorrectionWriter::new(BufWriter::new(write_file)) {
        Ok(writer) => writer,
        Err(e) => {
            error!("Failed to start correction stream: {:?}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    info!("Starting read correction processes...");
    let arc_params: Arc<FindErrorsParameters> = Arc::new(defaults);
    let processor = ParallelReadProcessor::new(arc_params.clone());
    let stats = match processor.run(&arc_seqs, &overlaps, &mut writer) {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed during correction: {:?}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
    match writer.finish() {
        Ok(_) => {}
        Err(e) => {
            error!("Failed to finish correction stream: {:?}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    info!(
        "Finished processing {} reads, {} overlaps ({} failed alignments), {} records emitted",
        stats.reads_processed, stats.overlaps_processed, stats.alignments_failed, stats.records_emitted
    );

    if let Some(summary_fn) = summary_fn {
        let summary = serde_json::json!({
            "reads_processed": stats.reads_processed,
            "overlaps_processed": stats.overlaps_processed,
            "alignments_failed": stats.alignments_failed,
            "records_emitted": stats.records_emitted
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
