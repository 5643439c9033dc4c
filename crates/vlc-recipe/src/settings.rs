//! Target settings: operating system, compiler and architecture.
//!
//! Settings are read once from `[settings]` (with host defaults for anything left out)
//! and afterwards only ever consulted as branch conditions.

use std::fmt;

use serde::Deserialize;

use crate::config::ConfigDoc;
use crate::error::{Error, Result};

/// gcc versions the recipe accepts.
pub const SUPPORTED_GCC_VERSIONS: &[&str] = &["4.9", "5.4", "6", "6.1", "6.2", "6.3", "6.4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Windows,
}

impl Os {
    pub fn host() -> Option<Self> {
        match std::env::consts::OS {
            "linux" => Some(Os::Linux),
            "windows" => Some(Os::Windows),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "Linux" => Ok(Os::Linux),
            "Windows" => Ok(Os::Windows),
            other => Err(Error::msg(format!(
                "unsupported settings.os '{other}' (supported: Linux, Windows)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "Linux",
            Os::Windows => "Windows",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFamily {
    Gcc,
    VisualStudio,
}

impl CompilerFamily {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "gcc" => Ok(CompilerFamily::Gcc),
            "Visual Studio" => Ok(CompilerFamily::VisualStudio),
            other => Err(Error::msg(format!(
                "unsupported settings.compiler '{other}' (supported: gcc, Visual Studio)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::VisualStudio => "Visual Studio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiler {
    pub family: CompilerFamily,
    pub version: Option<String>,
}

impl Compiler {
    pub fn is_gcc(&self) -> bool {
        self.family == CompilerFamily::Gcc
    }
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version.as_deref() {
            Some(v) => write!(f, "{} {}", self.family.as_str(), v),
            None => write!(f, "{}", self.family.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
}

impl Arch {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "x86_64" => Ok(Arch::X86_64),
            other => Err(Error::msg(format!(
                "unsupported settings.arch '{other}' (supported: x86_64)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    os: Option<String>,
    compiler: Option<String>,
    compiler_version: Option<String>,
    arch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub os: Os,
    pub compiler: Compiler,
    pub arch: Arch,
}

impl Settings {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        let raw: RawSettings = doc.deserialize_path("settings")?.unwrap_or_default();

        let os = match raw.os.as_deref() {
            Some(s) => Os::parse(s)?,
            None => Os::host().ok_or_else(|| {
                Error::msg(format!(
                    "settings.os not set and host os '{}' is not supported",
                    std::env::consts::OS
                ))
            })?,
        };
        let family = match raw.compiler.as_deref() {
            Some(s) => CompilerFamily::parse(s)?,
            None => match os {
                Os::Linux => CompilerFamily::Gcc,
                Os::Windows => CompilerFamily::VisualStudio,
            },
        };
        let version = raw
            .compiler_version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if family == CompilerFamily::Gcc
            && let Some(v) = version.as_deref()
            && !SUPPORTED_GCC_VERSIONS.contains(&v)
        {
            return Err(Error::msg(format!(
                "unsupported settings.compiler_version '{v}' for gcc (supported: {})",
                SUPPORTED_GCC_VERSIONS.join(", ")
            )));
        }
        let arch = match raw.arch.as_deref() {
            Some(s) => Arch::parse(s)?,
            None => Arch::X86_64,
        };

        Ok(Settings {
            os,
            compiler: Compiler { family, version },
            arch,
        })
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "os={} compiler={} arch={}",
            self.os.as_str(),
            self.compiler,
            self.arch.as_str()
        )
    }
}
