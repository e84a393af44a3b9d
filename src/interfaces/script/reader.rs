use super::step::ScriptStep;
use crate::error::{BridgeError, Result};
use std::io::{BufRead, BufReader, Read};

/// Reads scenario steps from a JSON-lines source.
///
/// Blank lines and lines starting with `#` are skipped. A malformed line
/// yields an error item and reading carries on with the next one.
pub struct StepReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> StepReader<R> {
    /// Creates a new `StepReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Returns an iterator that lazily reads and deserializes steps.
    pub fn steps(self) -> impl Iterator<Item = Result<ScriptStep>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some(serde_json::from_str(line).map_err(BridgeError::from))
                }
            }
            Err(e) => Some(Err(BridgeError::from(e))),
        })
    }
}
