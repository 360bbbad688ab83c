//! Logical file paths inside a data directory.

use std::fmt;

/// Logical path of the nationwide summary file.
pub const SUMMARY_FILE: &str = "/SummaryJSON.json";

/// A data file that can be fetched from the active directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFile {
    /// Nationwide summary.
    Summary,
    /// Results of one province, keyed by province id.
    PerProvince(u32),
    /// Results of one party, keyed by party id.
    PerParty(u32),
}

impl DataFile {
    /// Path of this file relative to a data directory, with a leading slash.
    #[must_use]
    pub fn logical_path(&self) -> String {
        match self {
            Self::Summary => SUMMARY_FILE.to_string(),
            Self::PerProvince(id) => format!("/PerProvinceJSON/{id}.json"),
            Self::PerParty(id) => format!("/PerPartyJSON/{id}.json"),
        }
    }

    /// Cache key of this file within `directory`.
    #[must_use]
    pub fn path_in(&self, directory: &str) -> String {
        data_file_path(directory, &self.logical_path())
    }
}

impl fmt::Display for DataFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.logical_path())
    }
}

/// Join a directory and a logical file path into a resource path.
///
/// The result is also the key used to memoize data file resources, so two
/// directories never share an entry.
#[must_use]
pub fn data_file_path(directory: &str, logical_path: &str) -> String {
    format!("/{directory}{logical_path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_paths() {
        assert_eq!(DataFile::Summary.logical_path(), "/SummaryJSON.json");
        assert_eq!(
            DataFile::PerProvince(10).logical_path(),
            "/PerProvinceJSON/10.json"
        );
        assert_eq!(DataFile::PerParty(7).logical_path(), "/PerPartyJSON/7.json");
    }

    #[test]
    fn test_path_in_directory() {
        assert_eq!(
            DataFile::Summary.path_in("20190324T2000"),
            "/20190324T2000/SummaryJSON.json"
        );
        assert_ne!(
            DataFile::PerProvince(1).path_in("a"),
            DataFile::PerProvince(1).path_in("b")
        );
    }
}
