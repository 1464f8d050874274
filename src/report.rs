//! Results of testing every entry in an archive.

use std::fmt;

use crate::result::*;

/// How one entry fared
#[derive(Debug)]
pub struct EntryReport {
    pub name: String,
    /// Payload bytes read back (decompressed, for ZIP)
    pub size: u64,
    pub error: Option<ArchiveError>,
}

impl EntryReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-entry results of reading back a whole archive,
/// plus any failure that kept the walk from finishing.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub entries: Vec<EntryReport>,
    /// Set if the archive's structure was too broken to keep going
    pub fatal: Option<ArchiveError>,
}

impl ArchiveReport {
    pub(crate) fn record(&mut self, name: String, result: ArchiveResult<u64>) {
        let (size, error) = match result {
            Ok(size) => (size, None),
            Err(e) => (0, Some(e)),
        };
        self.entries.push(EntryReport { name, size, error });
    }

    /// True if every entry read back cleanly
    pub fn is_ok(&self) -> bool {
        self.fatal.is_none() && self.entries.iter().all(EntryReport::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| !e.is_ok())
    }
}

impl fmt::Display for ArchiveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(
            f,
            "{} entries tested, {} failed",
            self.entries.len(),
            failed
        )?;
        if let Some(fatal) = &self.fatal {
            write!(f, "; stopped early: {}", fatal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aggregates_entry_results() {
        let mut report = ArchiveReport::default();
        report.record("good".into(), Ok(3));
        assert!(report.is_ok());
        report.record("bad".into(), Err(ArchiveError::format("Invalid checksum")));
        assert!(!report.is_ok());
        let failures: Vec<_> = report.failures().map(|e| e.name.as_str()).collect();
        assert_eq!(failures, ["bad"]);
        assert_eq!(report.to_string(), "2 entries tested, 1 failed");
    }
}
