//! Host platform resolution.
//!
//! Maps the running host (or a caller-supplied override) to the canonical
//! target triple used to select a distribution artifact. Triples follow the
//! `{arch}-{vendor}-{os}[-{abi}]` convention, e.g.
//! `x86_64-unknown-linux-gnu` or `aarch64-apple-darwin`.

use crate::error::{Error, Result};

/// Target triples the distribution ships artifacts for.
///
/// Detection and parsing are validated against this table so an
/// unsupported host fails up front instead of producing a 404 later.
pub const KNOWN_TRIPLES: &[&str] = &[
    "aarch64-apple-darwin",
    "aarch64-pc-windows-msvc",
    "aarch64-unknown-linux-gnu",
    "aarch64-unknown-linux-musl",
    "i686-pc-windows-msvc",
    "i686-unknown-linux-gnu",
    "x86_64-apple-darwin",
    "x86_64-pc-windows-msvc",
    "x86_64-unknown-linux-gnu",
    "x86_64-unknown-linux-musl",
];

/// Operating system component of a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    /// Parse from string, accepting common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "darwin" | "macos" | "osx" => Some(Self::Darwin),
            "windows" | "win" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Darwin => write!(f, "darwin"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// CPU architecture component of a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Arm64,
    I686,
}

impl Arch {
    /// Parse from string, accepting common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Arm64),
            "i686" | "i386" | "x86" => Some(Self::I686),
            _ => None,
        }
    }

    /// Canonical triple spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "aarch64",
            Self::I686 => "i686",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ABI variant component of a triple. Darwin triples carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
    Gnu,
    Musl,
    Msvc,
}

impl Abi {
    /// Canonical triple spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gnu => "gnu",
            Self::Musl => "musl",
            Self::Msvc => "msvc",
        }
    }
}

/// Canonical identifier of the host: OS, CPU architecture, and ABI variant.
///
/// Immutable once resolved; compared against manifest entries to pick the
/// artifact to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTriple {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
    /// ABI variant; `None` on darwin.
    pub abi: Option<Abi>,
}

impl HostTriple {
    /// Resolve the triple of the running host.
    ///
    /// Pure function of the compile-time host identification; the default
    /// ABI is `gnu` on linux and `msvc` on windows.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedPlatform`] when the host OS or
    /// architecture has no artifact in the support table.
    pub fn detect() -> Result<Self> {
        let os = Os::parse(std::env::consts::OS).ok_or_else(|| {
            Error::unsupported_platform(format!("unknown OS '{}'", std::env::consts::OS))
        })?;
        let arch = Arch::parse(std::env::consts::ARCH).ok_or_else(|| {
            Error::unsupported_platform(format!(
                "unknown architecture '{}'",
                std::env::consts::ARCH
            ))
        })?;
        Self::assemble(os, arch, default_abi(os))
    }

    /// Parse a triple string, accepting canonical triples and the common
    /// OS/arch aliases (`amd64`, `arm64`, `macos`, ...).
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedPlatform`] for malformed strings and for
    /// well-formed triples outside the support table.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        let (arch_s, os_parts) = match parts.as_slice() {
            [arch, rest @ ..] if !rest.is_empty() => (*arch, rest),
            _ => {
                return Err(Error::unsupported_platform(format!(
                    "malformed triple '{s}'"
                )));
            }
        };
        let arch = Arch::parse(arch_s)
            .ok_or_else(|| Error::unsupported_platform(format!("unknown architecture in '{s}'")))?;

        // Vendor is informative only; OS and ABI drive selection.
        let (os, abi) = match os_parts {
            ["apple", "darwin"] | ["darwin"] | ["macos"] => (Os::Darwin, None),
            ["pc", "windows", abi] | ["windows", abi] => {
                (Os::Windows, Some(parse_abi(s, *abi)?))
            }
            ["pc", "windows"] | ["windows"] => (Os::Windows, Some(Abi::Msvc)),
            [_, "linux", abi] | ["linux", abi] => (Os::Linux, Some(parse_abi(s, *abi)?)),
            [_, "linux"] | ["linux"] => (Os::Linux, Some(Abi::Gnu)),
            _ => {
                return Err(Error::unsupported_platform(format!(
                    "unknown OS in '{s}'"
                )));
            }
        };
        Self::assemble(os, arch, abi)
    }

    /// Resolve an optional override: parse it when given, detect otherwise.
    pub fn resolve(override_triple: Option<&str>) -> Result<Self> {
        match override_triple {
            Some(s) => Self::parse(s),
            None => Self::detect(),
        }
    }

    fn assemble(os: Os, arch: Arch, abi: Option<Abi>) -> Result<Self> {
        let triple = Self { os, arch, abi };
        if KNOWN_TRIPLES.contains(&triple.to_string().as_str()) {
            Ok(triple)
        } else {
            Err(Error::unsupported_platform(format!(
                "no artifact for triple '{triple}'"
            )))
        }
    }

    /// Suffix of executable files for this triple: `.exe` on windows,
    /// empty elsewhere.
    #[must_use]
    pub fn exe_suffix(&self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            _ => "",
        }
    }
}

impl std::fmt::Display for HostTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.os, self.abi) {
            (Os::Darwin, _) => write!(f, "{}-apple-darwin", self.arch),
            (Os::Windows, abi) => write!(
                f,
                "{}-pc-windows-{}",
                self.arch,
                abi.unwrap_or(Abi::Msvc).as_str()
            ),
            (Os::Linux, abi) => write!(
                f,
                "{}-unknown-linux-{}",
                self.arch,
                abi.unwrap_or(Abi::Gnu).as_str()
            ),
        }
    }
}

impl std::str::FromStr for HostTriple {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn default_abi(os: Os) -> Option<Abi> {
    match os {
        Os::Linux => Some(Abi::Gnu),
        Os::Windows => Some(Abi::Msvc),
        Os::Darwin => None,
    }
}

fn parse_abi(triple: &str, s: &str) -> Result<Abi> {
    match s.to_lowercase().as_str() {
        "gnu" => Ok(Abi::Gnu),
        "musl" => Ok(Abi::Musl),
        "msvc" => Ok(Abi::Msvc),
        _ => Err(Error::unsupported_platform(format!(
            "unknown ABI in '{triple}'"
        ))),
    }
}
