//! Download progress display with progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use sonar_core::ProgressCallback;

/// Download progress tracker
pub struct FetchProgress {
    bar: ProgressBar,
}

impl FetchProgress {
    /// Create a tracker; the length is filled in once the engine reports it
    #[must_use]
    pub fn new(name: &str) -> Self {
        let bar = ProgressBar::new(0);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n[{elapsed_precise}] {wide_bar:.green/black} {bytes}/{total_bytes} {binary_bytes_per_sec}")
                .expect("Invalid progress bar template")
                .progress_chars("=> ")
        );

        bar.set_message(format!("Fetching: {name}"));

        Self { bar }
    }

    /// Engine callback feeding this bar
    #[must_use]
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Box::new(move |done, total| {
            if total > 0 {
                bar.set_length(total);
            }
            bar.set_position(done);
        })
    }

    /// Mark the download complete
    pub fn finish(&self, bytes: u64) {
        self.bar
            .finish_with_message(format!("Fetched {}", format_bytes(bytes)));
    }

    /// Leave the bar where it stopped
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Human-readable size with binary units
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const STEPS: [(u64, &str); 3] = [(1 << 30, "GiB"), (1 << 20, "MiB"), (1 << 10, "KiB")];
    STEPS
        .iter()
        .find(|(scale, _)| bytes >= *scale)
        .map_or_else(
            || format!("{bytes} B"),
            |(scale, unit)| format!("{:.1} {unit}", bytes as f64 / *scale as f64),
        )
}

/// Format a track duration as `m:ss`
#[must_use]
pub fn format_duration_ms(ms: u32) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
