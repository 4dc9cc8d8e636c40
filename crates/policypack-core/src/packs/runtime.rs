use std::fmt;

/// Execution ecosystem a policy pack is written for.
///
/// Only `NodeJs` and `Python` have packaging and bootstrap procedures. The
/// two sides treat `Unsupported` differently: [`Publisher`](super::Publisher)
/// refuses to build an archive for it, while [`Installer`](super::Installer)
/// places the pack and skips the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Runtime {
    NodeJs,
    Python,
    Unsupported(String),
}

impl Runtime {
    /// Case-insensitive lookup of a manifest runtime name.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("nodejs") {
            Self::NodeJs
        } else if name.eq_ignore_ascii_case("python") {
            Self::Python
        } else {
            Self::Unsupported(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::NodeJs => "nodejs",
            Self::Python => "python",
            Self::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
