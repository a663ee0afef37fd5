//! `allanvar compute`: chunked Allan variance of one or more files.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use allanvar_core::{
    DatFileSink, FileChunkSource, FileSummary, RunConfig, RunOutcome, RunWriter, SinkSet,
    TableSink, estimate_source,
};

pub struct ComputeCommandConfig<'a> {
    pub files: &'a [String],
    pub run: RunConfig,
}

/// Run the compute command. Returns the process exit code.
pub fn run(cfg: ComputeCommandConfig<'_>) -> i32 {
    if let Some(missing) = first_missing(cfg.files) {
        eprintln!("'{missing}' doesn't exist.");
        return 1;
    }

    // Ctrl+C stops after the current chunk; what was computed is still reported.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            log::warn!("could not install Ctrl+C handler: {e}");
        }
    }

    println!("#chunk size: {}", cfg.run.chunk_bits());
    println!("#offset: {}", cfg.run.offset_bits());

    let mut writer = match &cfg.run.output_dir {
        Some(dir) => match RunWriter::new(dir, cfg.run.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                eprintln!("Error: {e}");
                return 1;
            }
        },
        None => None,
    };

    let mut failures = 0usize;
    for file in cfg.files {
        println!("#filename: {file}");
        let out_dir = writer.as_ref().map(|w| w.dir().to_path_buf());
        let path = Path::new(file);
        let summary = match compute_file(file, &cfg.run, out_dir.as_deref(), &stop) {
            Ok(outcome) => FileSummary::completed(path, &outcome.state, outcome.cancelled),
            Err(e) => {
                eprintln!("Error: {e}");
                failures += 1;
                FileSummary::failed(path, &e)
            }
        };
        println!("---");

        if let Some(w) = writer.as_mut() {
            w.record(summary);
        }
        if stop.load(Ordering::SeqCst) {
            log::warn!("interrupted; remaining files skipped");
            break;
        }
    }

    if let Some(w) = writer {
        match w.finish() {
            Ok(path) => log::info!("wrote {}", path.display()),
            Err(e) => {
                eprintln!("Error: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 { 1 } else { 0 }
}

/// Estimate one file, printing every chunk and saving tables when `out_dir` is set.
fn compute_file(
    file: &str,
    run: &RunConfig,
    out_dir: Option<&Path>,
    stop: &AtomicBool,
) -> allanvar_core::Result<RunOutcome> {
    let mut source = FileChunkSource::open(file, run)?;
    let plan = source.plan().clone();
    println!("#file size: {}", plan.file_bits());
    if plan.chunk_bits() != run.chunk_bits() {
        log::info!("{file}: using the whole file as one chunk ({} bits)", plan.chunk_bits());
    }
    log::info!("{file}: {} chunk(s) planned", plan.offsets.len());

    let mut sinks = SinkSet::new();
    sinks.push(Box::new(TableSink::stdout()));
    if let Some(dir) = out_dir {
        sinks.push(Box::new(DatFileSink::new(dir, file)));
    }

    let outcome = estimate_source(&mut source, run, &mut sinks, stop)?;
    if outcome.state.is_empty() {
        println!(
            "#no cluster sizes 2^{}.. below half the chunk size ({} bits)",
            run.tmin,
            plan.chunk_bits()
        );
    }
    log::info!(
        "{file}: {} chunk(s) processed{}",
        outcome.state.chunks(),
        if outcome.cancelled { " (interrupted)" } else { "" }
    );
    Ok(outcome)
}

fn first_missing(files: &[String]) -> Option<&str> {
    files
        .iter()
        .map(String::as_str)
        .find(|f| !Path::new(f).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("a.bin");
        std::fs::write(&present, [0u8; 4]).unwrap();
        let present = present.display().to_string();
        let absent = tmp.path().join("b.bin").display().to_string();

        assert_eq!(first_missing(std::slice::from_ref(&present)), None);
        assert_eq!(
            first_missing(&[present.clone(), absent.clone()]),
            Some(absent.as_str())
        );
        // Directories are not data files.
        let dir = tmp.path().display().to_string();
        assert_eq!(first_missing(std::slice::from_ref(&dir)), Some(dir.as_str()));
    }

    #[test]
    fn test_compute_file_writes_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("d.bin");
        std::fs::write(&data, [0xF0u8; 64]).unwrap();
        let run = RunConfig {
            blocks: 32.0 / 1_000_000.0,
            summed: true,
            ..Default::default()
        };
        let out = tmp.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let file = data.display().to_string();
        let outcome = compute_file(&file, &run, Some(out.as_path()), &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.state.chunks(), 2);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }
}
