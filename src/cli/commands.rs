use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use crate::config::ClientConfig;
use crate::core::{ErrorReport, PinService, ProgressUpdate, Result, TransferError, UploadTask};
use crate::utils::{format_bytes, format_duration};
use super::Command;

const PROGRESS_CHANNEL: usize = 64;
const BAR_TEMPLATE: &str = "{spinner} [{bar:30}] {percent:>3}% {bytes}/{total_bytes} {binary_bytes_per_sec} ETA {eta}";

/// Runs one command against a pinning service and renders the outcome.
///
/// Regular output goes to `out`, failures to `err`. Errors stop at this
/// boundary: [`CommandSurface::run`] reports success as a bool.
pub struct CommandSurface<S, W, E> {
    service: S,
    config: ClientConfig,
    out: W,
    err: E,
    show_progress: bool,
}

impl<S, W, E> CommandSurface<S, W, E>
where
    S: PinService,
    W: Write,
    E: Write,
{
    pub fn new(service: S, config: ClientConfig, out: W, err: E) -> Self {
        Self {
            service,
            config,
            out,
            err,
            show_progress: true,
        }
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn into_output(self) -> (W, E) {
        (self.out, self.err)
    }

    pub async fn run(&mut self, command: &Command) -> bool {
        let result = match command {
            Command::Upload { file_path } => self.upload(file_path).await,
            Command::Remove { hash } => self.remove(hash).await,
            Command::List => self.list().await,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.render_error(&e.report());
                false
            }
        }
    }

    async fn upload(&mut self, path: &Path) -> Result<()> {
        let task = Arc::new(UploadTask::from_path(path).await?);

        self.line(format!("Uploading {} to ipfs...", path.display()));
        self.line("");
        self.line("File Upload Analysis:");
        self.line(format!("  File path: {}", task.file_path.display()));
        self.line(format!("  File name: {}", task.file_name));
        self.line(format!("  File size: {}", format_bytes(task.total_bytes)));
        self.line("");
        let _ = self.out.flush();

        let bar = self.progress_bar(task.total_bytes);
        let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(PROGRESS_CHANNEL);
        let started = Instant::now();

        let result = {
            let upload = self.service.upload(task.clone(), Arc::new(tx));
            tokio::pin!(upload);
            loop {
                tokio::select! {
                    biased;
                    result = &mut upload => break result,
                    Some(update) = rx.recv() => bar.set_position(update.position),
                }
            }
        };

        let files = match result {
            Ok(files) => files,
            Err(e) => {
                bar.abandon();
                return Err(e);
            }
        };
        let file = files.into_iter().next().ok_or_else(|| {
            bar.abandon();
            TransferError::UnclassifiedNetwork("the pinning service returned no results".to_string())
        })?;

        bar.set_position(task.total_bytes);
        bar.finish();

        self.line(format!(
            "{} Upload completed [{}] 100% {}",
            "✔".green(),
            "█".repeat(20),
            format_duration(started.elapsed())
        ));
        self.line("URL:");
        self.line(self.config.retrieval_url(&file.hash));
        Ok(())
    }

    async fn remove(&mut self, hash: &str) -> Result<()> {
        let message = self.service.unpin(hash).await?;
        self.line(message);
        Ok(())
    }

    async fn list(&mut self) -> Result<()> {
        let pins = self.service.list().await?;
        if pins.is_empty() {
            self.line("No files are currently pinned.");
            return Ok(());
        }

        self.line("Pinned Files:");
        for pin in pins {
            self.line(format!("  - Hash: {}, Type: {}", pin.hash, pin.pin_type));
        }
        Ok(())
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏ ");
        ProgressBar::new(total).with_style(style)
    }

    // Output is best effort; a closed stdout should not turn into an upload error.
    fn line(&mut self, text: impl Display) {
        let _ = writeln!(self.out, "{}", text);
    }

    fn render_error(&mut self, report: &ErrorReport) {
        let _ = writeln!(self.err, "{} {}", "Error:".red().bold(), report);
    }
}
