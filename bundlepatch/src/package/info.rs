//! Package descriptors and play modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a package's files come from at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// Local simulation with no network and no cache.
    EditorSimulate,
    /// Files are bundled with the application.
    Offline,
    /// Files are fetched from a remote host.
    #[default]
    Host,
    /// Files are served from a web host with no local disk-space query.
    WebRemote,
}

impl PlayMode {
    /// True when the mode talks to a remote host.
    pub fn is_remote(self) -> bool {
        matches!(self, PlayMode::Host | PlayMode::WebRemote)
    }

    /// True when the platform can report free disk space.
    pub fn supports_disk_query(self) -> bool {
        !matches!(self, PlayMode::WebRemote)
    }

    /// Configuration-file spelling of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            PlayMode::EditorSimulate => "editor_simulate",
            PlayMode::Offline => "offline",
            PlayMode::Host => "host",
            PlayMode::WebRemote => "web_remote",
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "editor_simulate" | "simulate" => Ok(PlayMode::EditorSimulate),
            "offline" => Ok(PlayMode::Offline),
            "host" => Ok(PlayMode::Host),
            "web_remote" | "web" => Ok(PlayMode::WebRemote),
            other => Err(format!("unknown play mode '{}'", other)),
        }
    }
}

/// Primary and fallback host roots for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEndpoints {
    pub primary: String,
    pub fallback: String,
}

impl HostEndpoints {
    pub fn new(primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
        }
    }

    /// Host root to use for the given zero-based attempt.
    ///
    /// Attempts alternate primary, fallback, primary, ... An empty fallback
    /// means every attempt goes to the primary.
    pub fn for_attempt(&self, attempt: u32) -> &str {
        if attempt % 2 == 1 && !self.fallback.is_empty() {
            &self.fallback
        } else {
            &self.primary
        }
    }

    /// Both roots in attempt order, skipping an empty fallback.
    pub fn ordered(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str())
            .chain(Some(self.fallback.as_str()).filter(|f| !f.is_empty()))
    }
}

/// Discriminant of [`PackageInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    App,
    Dlc,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::App => write!(f, "app"),
            PackageKind::Dlc => write!(f, "dlc"),
        }
    }
}

/// A package shipped with the application build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPackageInfo {
    pub name: String,
    pub play_mode: PlayMode,
}

/// A separately versioned downloadable content package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlcPackageInfo {
    pub name: String,
    pub play_mode: PlayMode,
    pub dlc_version: String,
    /// Drop the platform segment from auto-configured URLs.
    pub without_platform: bool,
    /// Explicit host root; empty means auto-configure.
    pub host_server: String,
    pub fallback_host_server: String,
}

/// Descriptor of one package taking part in a patch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageInfo {
    App(AppPackageInfo),
    Dlc(DlcPackageInfo),
}

impl PackageInfo {
    pub fn app(name: impl Into<String>, play_mode: PlayMode) -> Self {
        PackageInfo::App(AppPackageInfo {
            name: name.into(),
            play_mode,
        })
    }

    pub fn dlc(name: impl Into<String>, play_mode: PlayMode, dlc_version: impl Into<String>) -> Self {
        PackageInfo::Dlc(DlcPackageInfo {
            name: name.into(),
            play_mode,
            dlc_version: dlc_version.into(),
            without_platform: false,
            host_server: String::new(),
            fallback_host_server: String::new(),
        })
    }

    /// Set explicit hosts on a DLC descriptor. No effect on App packages.
    pub fn with_hosts(mut self, host: impl Into<String>, fallback: impl Into<String>) -> Self {
        if let PackageInfo::Dlc(ref mut dlc) = self {
            dlc.host_server = host.into();
            dlc.fallback_host_server = fallback.into();
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            PackageInfo::App(app) => &app.name,
            PackageInfo::Dlc(dlc) => &dlc.name,
        }
    }

    pub fn play_mode(&self) -> PlayMode {
        match self {
            PackageInfo::App(app) => app.play_mode,
            PackageInfo::Dlc(dlc) => dlc.play_mode,
        }
    }

    pub fn kind(&self) -> PackageKind {
        match self {
            PackageInfo::App(_) => PackageKind::App,
            PackageInfo::Dlc(_) => PackageKind::Dlc,
        }
    }
}
