use anyhow::Result;
use clap::Parser;
use komootexport::catalog::{self, DistancePolicy, RawPayload};
use komootexport::{debug, utils};
use std::fs;
use std::process;

/// Convert a saved tour overview (tours.json or tours.html) into a CSV file.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Saved tour overview, as written by komootexport
    tours_file: String,

    /// Path to output CSV file
    #[clap(short, long, default_value = "tours.csv")]
    output: String,

    /// Leave this field out of the CSV (repeatable)
    #[clap(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Keep the fields that are excluded by default
    #[clap(long)]
    all_fields: bool,

    /// Exit with an error if a recorded tour has no numeric distance
    /// (the summary counts it as 0 and the run still completes)
    #[clap(long)]
    strict_distance: bool,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    debug::set_verbose(args.debug);

    let text = match fs::read_to_string(&args.tours_file) {
        Ok(text) => text,
        Err(_) => {
            eprintln!("Could not open {}.", args.tours_file);
            process::exit(1);
        }
    };

    let payload = RawPayload::from_saved(&text)?;
    let catalog = catalog::extract(&payload)?;

    let policy = if args.strict_distance {
        DistancePolicy::Strict
    } else {
        DistancePolicy::TreatAsZero
    };
    let (summary, distance_problem) = catalog.summary_with_policy(policy);
    println!("{}", summary);
    if let Some(e) = &distance_problem {
        eprintln!("Distance check failed: {}", e);
    }

    let excluded = utils::excluded_fields(&args.exclude, args.all_fields);
    utils::export_csv(&catalog, &args.output, Some(&excluded))?;
    println!("Converted {} to CSV file \"{}\".", args.tours_file, args.output);

    if distance_problem.is_some() {
        process::exit(1);
    }
    Ok(())
}
