use crate::models::EventSubmission;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;

/// Tail an NDJSON file of event submissions
///
/// The web tier appends one JSON submission per line; the daemon picks up
/// whatever arrives after the tailer is initialized.
pub struct JsonlTailer {
    file_path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl JsonlTailer {
    pub fn new(file_path: PathBuf) -> Self {
        JsonlTailer {
            file_path,
            reader: None,
        }
    }

    /// Open the file and seek to its end to start tailing.
    pub fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let file = File::open(&self.file_path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::End(0))?;
        self.reader = Some(reader);
        Ok(())
    }

    /// Read newly appended submissions.
    ///
    /// Lines that fail to parse are skipped with a debug log; a malformed
    /// producer never stalls ingestion of later lines.
    pub fn read_submissions(&mut self) -> Result<Vec<EventSubmission>, Box<dyn std::error::Error>> {
        if self.reader.is_none() {
            self.initialize()?;
        }

        let reader = self.reader.as_mut().ok_or("Reader not initialized")?;
        let mut submissions = Vec::new();

        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;

            if bytes_read == 0 {
                break; // EOF
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<EventSubmission>(trimmed) {
                Ok(submission) => submissions.push(submission),
                Err(e) => log::debug!("Skipping unparseable submission line: {}", e),
            }
        }

        Ok(submissions)
    }

    /// Check if the file still exists and is readable
    pub fn is_valid(&self) -> bool {
        self.file_path.exists()
    }
}
