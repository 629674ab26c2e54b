//! Module names derived from uploaded archive filenames.
//!
//! A module is named after its archive: everything before the first `.` in
//! the filename. `foo.tar.gz`, `foo.zip` and `foo.v2.tar.bz2` all name the
//! module `foo`.

use std::fmt;
use thiserror::Error;

/// Errors raised when an archive filename cannot name a module.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    /// The filename has no `.`, so there is no extension to strip.
    #[error("cannot derive a module name from {filename:?}: no '.' in filename")]
    MissingExtension {
        /// The offending filename.
        filename: String,
    },

    /// The text before the first `.` is empty (for example `.tar.gz`).
    #[error("cannot derive a module name from {filename:?}: name is empty")]
    Empty {
        /// The offending filename.
        filename: String,
    },

    /// The derived name would escape the directory it is placed in.
    #[error("module name {name:?} contains path components")]
    PathComponents {
        /// The rejected name.
        name: String,
    },
}

/// Name of a module in the archive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(String);

impl ModuleName {
    /// Derives a module name from an archive filename.
    ///
    /// Any leading directory components are ignored, since browsers and
    /// command-line clients disagree on whether they send them.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError`] when the filename has no `.`, when the prefix
    /// before it is empty, or when the prefix is `..`.
    ///
    /// # Examples
    ///
    /// ```
    /// use modarchive_common::ModuleName;
    ///
    /// let name = ModuleName::from_archive_filename("hash.tar.gz")?;
    /// assert_eq!(name.as_str(), "hash");
    ///
    /// assert!(ModuleName::from_archive_filename("hash").is_err());
    /// # Ok::<(), modarchive_common::NamingError>(())
    /// ```
    pub fn from_archive_filename(filename: &str) -> Result<Self, NamingError> {
        let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        let Some(dot) = base.find('.') else {
            return Err(NamingError::MissingExtension {
                filename: filename.to_owned(),
            });
        };
        let prefix = base.get(..dot).unwrap_or_default();
        if prefix.is_empty() {
            return Err(NamingError::Empty {
                filename: filename.to_owned(),
            });
        }
        Self::new(prefix)
    }

    /// Wraps an already-derived name, validating that it is a single path
    /// component.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::Empty`] for an empty name and
    /// [`NamingError::PathComponents`] for names containing separators or
    /// equal to `..`.
    pub fn new(name: impl Into<String>) -> Result<Self, NamingError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NamingError::Empty { filename: name });
        }
        if name.contains(['/', '\\']) || name == ".." || name == "." {
            return Err(NamingError::PathComponents { name });
        }
        Ok(Self(name))
    }

    /// Returns the disambiguated name `<name>-<suffix>` used when the plain
    /// name belongs to someone else.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}-{suffix}", self.0))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::gzip_tar("alloc.tar.gz", "alloc")]
    #[case::bzip_tar("alloc.tar.bz2", "alloc")]
    #[case::plain_tar("alloc.tar", "alloc")]
    #[case::zip("alloc.zip", "alloc")]
    #[case::dotted_version("alloc.v2.tar.gz", "alloc")]
    #[case::directory_prefix("uploads/alloc.tgz", "alloc")]
    #[case::windows_prefix("C:\\Users\\me\\alloc.zip", "alloc")]
    fn derives_prefix_before_first_dot(#[case] filename: &str, #[case] expected: &str) {
        let name = ModuleName::from_archive_filename(filename).expect("valid filename");
        assert_eq!(name.as_str(), expected);
    }

    #[test]
    fn rejects_filename_without_dot() {
        let err = ModuleName::from_archive_filename("alloc").expect_err("no dot");
        assert!(matches!(err, NamingError::MissingExtension { .. }));
        assert!(err.to_string().contains("alloc"));
    }

    #[rstest]
    #[case::leading_dot(".tar.gz")]
    #[case::only_dot(".")]
    fn rejects_empty_prefix(#[case] filename: &str) {
        let err = ModuleName::from_archive_filename(filename).expect_err("empty prefix");
        assert!(matches!(err, NamingError::Empty { .. }));
    }

    #[test]
    fn suffix_joins_with_hyphen() {
        let name = ModuleName::new("alloc").expect("valid name");
        assert_eq!(name.with_suffix("rusty").as_str(), "alloc-rusty");
    }

    #[rstest]
    #[case::parent("..")]
    #[case::nested("a/b")]
    fn new_rejects_path_components(#[case] raw: &str) {
        assert!(matches!(
            ModuleName::new(raw),
            Err(NamingError::PathComponents { .. })
        ));
    }
}
