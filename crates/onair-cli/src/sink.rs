use std::io::Write;
use std::path::{Path, PathBuf};

use onair_runtime::{DisplaySink, SinkError, TargetKind};
use tracing::debug;

/// Writes the display text to a file (or stdout) and the album art path to another file.
///
/// Pointing an OBS text source at `text_output` with "read from file" shows the
/// rendered string.
#[derive(Debug, Default)]
pub struct FileSink {
    text_output: Option<PathBuf>,
    image_output: Option<PathBuf>,
    echo: bool,
}

impl FileSink {
    pub fn new(text_output: Option<PathBuf>, image_output: Option<PathBuf>) -> Self {
        Self {
            text_output,
            image_output,
            echo: false,
        }
    }

    /// Print every text update to stdout when no text file is set.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

fn target_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl DisplaySink for FileSink {
    fn set_text(&mut self, target: &str, text: &str) -> Result<(), SinkError> {
        match &self.text_output {
            Some(path) => {
                std::fs::write(path, text)?;
                debug!(target = %target, path = %path.display(), "Display text written");
            }
            None if self.echo => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{text}")?;
                stdout.flush()?;
            }
            None => {}
        }
        Ok(())
    }

    fn set_image(&mut self, _target: &str, path: Option<&Path>) -> Result<(), SinkError> {
        if let Some(output) = &self.image_output {
            let contents = path.map(|p| p.display().to_string()).unwrap_or_default();
            std::fs::write(output, contents)?;
        }
        Ok(())
    }

    fn list_targets(&self, kind: TargetKind) -> Vec<String> {
        let path = match kind {
            TargetKind::Text => &self.text_output,
            TargetKind::Image => &self.image_output,
        };
        path.as_deref().map(target_name).into_iter().collect()
    }
}
