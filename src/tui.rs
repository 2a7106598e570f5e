use crossterm::{
    cursor::MoveToPreviousLine,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use std::io;

/// Console display for a GPX download run: one colored line per tour,
/// with a progress line kept at the bottom.
pub struct DownloadTUI {
    total: usize,
    processed: usize,
    downloaded: usize,
    skipped: usize,
    failed: usize,
    progress_printed: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum TourStatus {
    Downloaded,
    Skipped,
    Failed,
}

impl DownloadTUI {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            progress_printed: false,
        }
    }

    pub fn start(&mut self, directory: &str) -> io::Result<()> {
        execute!(
            io::stdout(),
            SetForegroundColor(Color::White),
            Print(format!("⏳ Downloading {} GPX files to {}\n", self.total, directory)),
            ResetColor
        )?;
        self.print_progress()?;
        self.progress_printed = true;
        Ok(())
    }

    pub fn downloaded(&mut self, file: &str) -> io::Result<()> {
        self.downloaded += 1;
        self.record(TourStatus::Downloaded, file)
    }

    /// Already present on disk; shown greyed out.
    pub fn skipped(&mut self, file: &str) -> io::Result<()> {
        self.skipped += 1;
        self.record(TourStatus::Skipped, file)
    }

    pub fn failed(&mut self, file: &str) -> io::Result<()> {
        self.failed += 1;
        self.record(TourStatus::Failed, file)
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.clear_progress()?;

        execute!(
            io::stdout(),
            SetForegroundColor(Color::Green),
            Print(format!("✅ Downloaded {} files", self.downloaded)),
            ResetColor
        )?;
        if self.skipped > 0 {
            execute!(
                io::stdout(),
                SetForegroundColor(Color::DarkGrey),
                Print(format!(", {} already present", self.skipped)),
                ResetColor
            )?;
        }
        if self.failed > 0 {
            execute!(
                io::stdout(),
                SetForegroundColor(Color::Red),
                Print(format!(", {} failed", self.failed)),
                ResetColor
            )?;
        }
        execute!(io::stdout(), Print("\n"))?;
        Ok(())
    }

    fn record(&mut self, status: TourStatus, file: &str) -> io::Result<()> {
        self.processed += 1;
        // on long runs skips are only counted
        if status == TourStatus::Skipped && self.total > 20 {
            return self.redraw_progress();
        }

        self.clear_progress()?;
        let (color, icon) = match status {
            TourStatus::Downloaded => (Color::Green, "✓"),
            TourStatus::Skipped => (Color::DarkGrey, "·"),
            TourStatus::Failed => (Color::Red, "✗"),
        };
        execute!(
            io::stdout(),
            SetForegroundColor(color),
            Print(format!("  {} {}\n", icon, file)),
            ResetColor
        )?;
        self.print_progress()
    }

    fn redraw_progress(&self) -> io::Result<()> {
        self.clear_progress()?;
        self.print_progress()
    }

    fn clear_progress(&self) -> io::Result<()> {
        if self.progress_printed {
            execute!(
                io::stdout(),
                MoveToPreviousLine(1),
                Clear(ClearType::CurrentLine),
            )?;
        }
        Ok(())
    }

    fn print_progress(&self) -> io::Result<()> {
        execute!(
            io::stdout(),
            SetForegroundColor(Color::Blue),
            Print(format!("{}\n", self.progress_text())),
            ResetColor
        )
    }

    fn progress_text(&self) -> String {
        let percentage = if self.total > 0 {
            (self.processed * 100) / self.total
        } else {
            100
        };

        let bar_width = 30;
        let filled = (self.processed * bar_width) / self.total.max(1);
        let bar = format!("[{}{}]", "█".repeat(filled.min(bar_width)), "░".repeat(bar_width - filled.min(bar_width)));

        let mut text = format!(
            "Progress: {} {}/{} ({}%) | {} new, {} present",
            bar, self.processed, self.total, percentage, self.downloaded, self.skipped
        );
        if self.failed > 0 {
            text.push_str(&format!(", {} failed", self.failed));
        }
        text
    }
}

/// Read a line from the terminal without echoing it.
pub fn prompt_password(prompt: &str) -> io::Result<String> {
    execute!(io::stdout(), Print(prompt))?;

    terminal::enable_raw_mode()?;
    let entered = read_hidden_line();
    terminal::disable_raw_mode()?;

    execute!(io::stdout(), Print("\n"))?;
    entered
}

fn read_hidden_line() -> io::Result<String> {
    let mut line = String::new();
    loop {
        let key = match event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => key,
            _ => continue,
        };

        match key.code {
            KeyCode::Enter => return Ok(line),
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "password entry cancelled"));
            }
            KeyCode::Esc => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "password entry cancelled"));
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }
}
