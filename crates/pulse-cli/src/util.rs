//! Utility functions for CLI operations.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Line-oriented destination for streaming commands.
///
/// Every line is flushed so that piped consumers see samples as they arrive.
pub struct OutputSink {
    writer: Box<dyn Write>,
}

impl OutputSink {
    pub fn open(output: Option<&PathBuf>) -> Result<Self> {
        let writer: Box<dyn Write> = match output {
            Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
                format!("Failed to create {}", path.display())
            })?)),
            None => Box::new(io::stdout()),
        };
        Ok(Self { writer })
    }

    #[cfg(test)]
    pub fn from_writer(writer: impl Write + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}
