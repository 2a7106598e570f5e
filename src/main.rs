use anyhow::{Context, Result};
use clap::Parser;
use komootexport::catalog::{self, Catalog, DistancePolicy};
use komootexport::client::{CatalogSource, ClientConfig, KomootClient};
use komootexport::downloader::{download_tours, DownloadOptions};
use komootexport::models::{Category, TourRecord};
use komootexport::tui::{self, DownloadTUI};
use komootexport::{debug, debug_eprintln, utils};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

/// Download planned or recorded Komoot tours as GPX files.
///
/// GPX files are named <date>_<tour_id>.gpx; tours already present in the
/// target directory are not downloaded again. The raw tour overview is
/// saved to tours.json (tours.html with --html) and exported as CSV.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Login email address
    email: String,

    /// Login password (prompted for if not given)
    password: Option<String>,

    /// Directory to download planned tours to
    #[clap(short, long)]
    planned: Option<PathBuf>,

    /// Directory to download recorded tours to
    #[clap(short, long)]
    recorded: Option<PathBuf>,

    /// Read the tour overview from the web page instead of the JSON API
    #[clap(long)]
    html: bool,

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

    /// Pause between downloads in milliseconds
    #[clap(long, default_value = "500")]
    delay_ms: u64,

    /// HTTP timeout in seconds
    #[clap(long, default_value = "30")]
    timeout: u64,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    debug::set_verbose(args.debug);

    let password = match &args.password {
        Some(password) => password.clone(),
        None => tui::prompt_password("Komoot password: ").context("Failed to read password")?,
    };

    let config = ClientConfig {
        timeout: Duration::from_secs(args.timeout),
        ..ClientConfig::default()
    };
    let mut client = KomootClient::new(config)?;

    if let Err(e) = client.login(&args.email, &password) {
        eprintln!("Failed to log in to komoot.de. Check given mail and password.");
        debug_eprintln!("{:#}", e);
        process::exit(1);
    }

    let source = if args.html { CatalogSource::Html } else { CatalogSource::Api };
    let payload = match client.fetch_catalog_payload(source) {
        Ok(payload) => payload,
        Err(e) => {
            eprintln!("Failed to download komoot tour overview page.");
            debug_eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    // keep the raw overview for offline replay, whatever extraction makes of it
    utils::save_text(payload.file_name(), &payload.to_saved())?;
    println!("Saved tour overview page to \"{}\"", payload.file_name());

    let (catalog, extracted) = match catalog::extract(&payload) {
        Ok(catalog) => (catalog, true),
        Err(e) => {
            eprintln!("Could not read tours from the overview: {}", e);
            (Catalog::default(), false)
        }
    };

    let policy = if args.strict_distance {
        DistancePolicy::Strict
    } else {
        DistancePolicy::TreatAsZero
    };

    println!();
    println!("{}", client);
    let (summary, distance_problem) = catalog.summary_with_policy(policy);
    println!("{}", summary);
    if let Some(e) = &distance_problem {
        eprintln!("Distance check failed: {}", e);
    }

    let options = DownloadOptions {
        delay: Duration::from_millis(args.delay_ms),
    };
    let targets = [
        (Category::Planned, args.planned.as_ref()),
        (Category::Recorded, args.recorded.as_ref()),
    ];
    for (category, dir) in targets {
        if let Some(dir) = dir {
            download_category(&client, &catalog, category, dir, &options)?;
        }
    }

    if extracted {
        let excluded = utils::excluded_fields(&args.exclude, args.all_fields);
        utils::export_csv(&catalog, &args.output, Some(&excluded))?;
        println!("Exported {} tours to \"{}\"", catalog.len(), args.output);
    }

    if distance_problem.is_some() {
        process::exit(1);
    }
    Ok(())
}

fn download_category(
    client: &KomootClient,
    catalog: &Catalog,
    category: Category,
    dir: &Path,
    options: &DownloadOptions,
) -> Result<()> {
    let tours: Vec<&TourRecord> = catalog.by_category(category).collect();

    println!();
    println!("Downloading {} GPX files:", category);
    let mut tui = DownloadTUI::new(tours.len());
    tui.start(&dir.display().to_string())?;

    let report = download_tours(client, tours, dir, options, Some(&mut tui))?;
    tui.finish()?;

    if report.skipped > 0 {
        println!(
            "Skipped downloading of {} files which are already present.",
            report.skipped
        );
    }
    if !report.failed.is_empty() {
        println!("Failed to download {} tours.", report.failed.len());
    }
    Ok(())
}
