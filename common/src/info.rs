//! Parsing of module description files.
//!
//! Every module ships a description source file whose leading documentation
//! block reads:
//!
//! ```text
//! /**
//!  * alloc - memory allocator routines
//!  *
//!  * The alloc module implements a simple allocator which you can use to
//!  * dynamically allocate space within a region of memory.
//!  */
//! ```
//!
//! The first line of the block is the title; the remaining lines form the
//! description.

use thiserror::Error;

/// Errors produced while reading a description block.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InfoError {
    /// No `/**` block was found.
    #[error("no documentation block found")]
    MissingBlock,

    /// The block opened but never closed.
    #[error("documentation block is not terminated")]
    Unterminated,

    /// A line inside the block does not start with ` *`.
    #[error("malformed documentation line {line}: {text:?}")]
    MalformedLine {
        /// One-based line number in the source file.
        line: usize,
        /// The offending line.
        text: String,
    },
}

/// Title and description extracted from a module description file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    title: String,
    description: Vec<String>,
}

impl ModuleInfo {
    /// Builds a record directly from its parts.
    #[must_use]
    pub fn new(title: impl Into<String>, description: Vec<String>) -> Self {
        Self {
            title: title.into(),
            description,
        }
    }

    /// Parses the first documentation block of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] when the block is missing, unterminated, or
    /// contains a line that does not continue the comment.
    ///
    /// # Examples
    ///
    /// ```
    /// use modarchive_common::ModuleInfo;
    ///
    /// let info = ModuleInfo::parse("/**\n * str - string helpers\n *\n * Handy.\n */\n")?;
    /// assert_eq!(info.title(), "str - string helpers");
    /// assert_eq!(info.description_text(), "\nHandy.");
    /// # Ok::<(), modarchive_common::InfoError>(())
    /// ```
    pub fn parse(source: &str) -> Result<Self, InfoError> {
        let mut lines = source.lines().enumerate();
        if !lines.by_ref().any(|(_, line)| line.trim_end() == "/**") {
            return Err(InfoError::MissingBlock);
        }

        let mut body = Vec::new();
        for (index, raw) in lines {
            let line = raw.trim_end();
            if line == " */" || line == "*/" {
                return Ok(Self::from_body(body));
            }
            let text = line
                .strip_prefix(" * ")
                .or_else(|| line.strip_prefix(" *"))
                .ok_or_else(|| InfoError::MalformedLine {
                    line: index + 1,
                    text: raw.to_owned(),
                })?;
            body.push(text.to_owned());
        }
        Err(InfoError::Unterminated)
    }

    fn from_body(mut body: Vec<String>) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        let title = body.remove(0);
        Self {
            title,
            description: body,
        }
    }

    /// Returns the title line.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description lines after the title.
    #[must_use]
    pub fn description(&self) -> &[String] {
        &self.description
    }

    /// Returns the description joined with newlines, as stored in the search
    /// index.
    #[must_use]
    pub fn description_text(&self) -> String {
        self.description.join("\n")
    }
}
