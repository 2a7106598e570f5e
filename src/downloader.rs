use crate::client::KomootClient;
use crate::models::TourRecord;
use crate::tui::DownloadTUI;
use crate::{debug_eprintln, debug_println};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Anything that can hand out the GPX bytes of a tour.
pub trait TourSource {
    fn download_tour(&self, tour_id: &str) -> Result<Vec<u8>>;
}

impl TourSource for KomootClient {
    fn download_tour(&self, tour_id: &str) -> Result<Vec<u8>> {
        KomootClient::download_tour(self, tour_id)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Pause after each download request, whether it succeeded or not.
    /// Tours skipped without a request do not wait.
    pub delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: Vec<PathBuf>,
    /// Files that were already present.
    pub skipped: usize,
    /// Tours that could not be downloaded or named, by file name or id.
    pub failed: Vec<String>,
}

/// `<YYYY-MM-DD>_<id>.gpx`, or `None` when the tour lacks a date or an id
/// that is safe to use in a file name.
pub fn gpx_file_name(tour: &TourRecord) -> Option<String> {
    let id = tour.id().filter(|id| is_plain_id(id))?;
    let date = tour.date()?;
    Some(format!("{}_{}.gpx", date.format("%Y-%m-%d"), id))
}

/// Ids end up in file names, so only letters, digits, `-` and `_` pass.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Download every tour into `dir`, skipping files that already exist.
///
/// A failed tour is reported and counted; the remaining tours are still
/// processed. Only failing to create `dir` or to write a file aborts.
pub fn download_tours<'a, S, I>(
    source: &S,
    tours: I,
    dir: &Path,
    options: &DownloadOptions,
    mut tui: Option<&mut DownloadTUI>,
) -> Result<DownloadReport>
where
    S: TourSource,
    I: IntoIterator<Item = &'a TourRecord>,
{
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut report = DownloadReport::default();

    for tour in tours {
        let (tour_id, file_name) = match (tour.id(), gpx_file_name(tour)) {
            (Some(id), Some(name)) => (id, name),
            (id, _) => {
                let label = id.unwrap_or_else(|| "<no id>".to_string());
                eprintln!("  Tour {} has no usable id or date, cannot name its file", label);
                if let Some(tui) = tui.as_mut() {
                    tui.failed(&label)?;
                }
                report.failed.push(label);
                continue;
            }
        };

        let path = dir.join(&file_name);
        let shown = path.display().to_string();

        if path.exists() {
            debug_println!("Already present: {}", shown);
            report.skipped += 1;
            if let Some(tui) = tui.as_mut() {
                tui.skipped(&shown)?;
            }
            continue;
        }

        match source.download_tour(&tour_id) {
            Ok(bytes) => {
                fs::write(&path, &bytes)
                    .with_context(|| format!("Failed to write {}", shown))?;
                match tui.as_mut() {
                    Some(tui) => tui.downloaded(&shown)?,
                    None => println!("   {}", shown),
                }
                report.downloaded.push(path);
            }
            Err(e) => {
                debug_eprintln!("Download of tour {} failed: {:#}", tour_id, e);
                match tui.as_mut() {
                    Some(tui) => tui.failed(&shown)?,
                    None => eprintln!("  Failed to download: {}", shown),
                }
                report.failed.push(file_name);
            }
        }

        if !options.delay.is_zero() {
            std::thread::sleep(options.delay);
        }
    }

    Ok(report)
}
