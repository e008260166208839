#![forbid(unsafe_code)]

use std::fmt;

/// Source position attached to an instruction by the host's debug info.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugLoc {
    /// 1-based line number
    pub line: u32,
    pub file: String,
    pub directory: String,
}

impl DebugLoc {
    pub fn new(line: u32, file: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            line,
            file: file.into(),
            directory: directory.into(),
        }
    }

    /// `directory/file`, as printed in bound reports.
    pub fn path(&self) -> String {
        format!("{}/{}", self.directory, self.file)
    }
}

impl fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path(), self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_joins_directory_and_file() {
        let loc = DebugLoc::new(12, "sum.c", "/src");
        assert_eq!(loc.path(), "/src/sum.c");
        assert_eq!(loc.to_string(), "/src/sum.c:12");
    }
}
