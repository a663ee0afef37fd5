pub mod compute;
pub mod fit;

use std::path::PathBuf;

use allanvar_core::RunConfig;

/// Log to stderr at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();
}

/// Negative exponents clamp to 0.
pub fn clamp_tmin(tmin: i64) -> u32 {
    tmin.clamp(0, u32::MAX as i64) as u32
}

/// Negative (and non-finite) offsets clamp to 0.
pub fn clamp_offset(offset: f64) -> f64 {
    if offset.is_finite() && offset > 0.0 {
        offset
    } else {
        0.0
    }
}

/// Build the run configuration from raw CLI values.
#[allow(clippy::too_many_arguments)]
pub fn build_run_config(
    blocks: f64,
    tmin: i64,
    summed: bool,
    count: usize,
    offset: f64,
    outdir: Option<&str>,
    threads: usize,
) -> RunConfig {
    RunConfig {
        blocks,
        tmin: clamp_tmin(tmin),
        summed,
        count,
        offset_mb: clamp_offset(offset),
        output_dir: outdir.filter(|d| !d.is_empty()).map(PathBuf::from),
        threads: threads.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // clamp tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_clamp_tmin() {
        assert_eq!(clamp_tmin(-4), 0);
        assert_eq!(clamp_tmin(0), 0);
        assert_eq!(clamp_tmin(7), 7);
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(-2.5), 0.0);
        assert_eq!(clamp_offset(f64::NAN), 0.0);
        assert_eq!(clamp_offset(1.5), 1.5);
    }

    // -----------------------------------------------------------------------
    // build_run_config tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_build_run_config_defaults_match_core() {
        let cfg = build_run_config(1.0, 0, false, 0, 0.0, None, 1);
        assert_eq!(cfg, RunConfig::default());
    }

    #[test]
    fn test_build_run_config_clamps() {
        let cfg = build_run_config(0.5, -3, true, 4, -1.0, Some("out"), 0);
        assert_eq!(cfg.tmin, 0);
        assert_eq!(cfg.offset_mb, 0.0);
        assert_eq!(cfg.threads, 1);
        assert!(cfg.summed);
        assert_eq!(cfg.count, 4);
        assert_eq!(cfg.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_build_run_config_empty_outdir_is_none() {
        let cfg = build_run_config(1.0, 0, false, 0, 0.0, Some(""), 1);
        assert!(cfg.output_dir.is_none());
    }
}
