//! `allanvar fit`: log-log slope of saved variance tables.

use std::path::Path;

use allanvar_core::{LineFit, fit_table};
use serde::Serialize;

#[derive(Serialize)]
struct FitRow<'a> {
    table: &'a str,
    #[serde(flatten)]
    fit: &'a LineFit,
}

/// Run the fit command. Returns the process exit code.
pub fn run(tables: &[String], json: bool) -> i32 {
    let mut failures = 0usize;
    let mut fits: Vec<(String, LineFit)> = Vec::new();

    for table in tables {
        match fit_table(Path::new(table)) {
            Ok(fit) => {
                if !json {
                    println!("{table}");
                    println!("{}", describe(&fit));
                }
                fits.push((table.clone(), fit));
            }
            Err(e) => {
                eprintln!("Error: {e}");
                failures += 1;
            }
        }
    }

    if json {
        let rows: Vec<FitRow<'_>> = fits
            .iter()
            .map(|(table, fit)| FitRow { table, fit })
            .collect();
        match serde_json::to_string_pretty(&rows) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 { 1 } else { 0 }
}

/// Two-line human summary, rounded to five decimals.
fn describe(fit: &LineFit) -> String {
    format!(
        "  k={:.5}±{:.5} (95% ±{:.5})\n  offset={:.5}±{:.5} (95% ±{:.5})  [{} points]",
        fit.slope,
        fit.slope_err,
        fit.slope_ci95,
        fit.intercept,
        fit.intercept_err,
        fit.intercept_ci95,
        fit.points
    )
}
