//! Codec library discovery.
//!
//! A plugin bundle may ship its own copy of the codec under
//! `Contents/Resources/BlackmagicRAW`; otherwise the platform's SDK install
//! locations are tried in table order.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Directory inside a plugin bundle that holds a bundled codec.
pub const BUNDLE_CODEC_DIR: [&str; 3] = ["Contents", "Resources", "BlackmagicRAW"];

/// Target platform of an install location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform this binary was built for.
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Path of the codec shared library relative to its install directory.
    pub fn library_file(self) -> &'static str {
        match self {
            Self::Windows => "BlackmagicRawAPI.dll",
            Self::MacOs => "BlackmagicRawAPI.framework/BlackmagicRawAPI",
            Self::Linux => "libBlackmagicRawAPI.so",
        }
    }
}

/// One row of the install table.
struct InstallLocation {
    platform: Platform,
    /// Environment variable holding the path root, if any.
    root_env: Option<&'static str>,
    segments: &'static [&'static str],
}

const INSTALL_TABLE: &[InstallLocation] = &[
    InstallLocation {
        platform: Platform::Windows,
        root_env: Some("ProgramFiles"),
        segments: &["Adobe", "Common", "Plug-ins", "7.0", "MediaCore", "BlackmagicRawAPI"],
    },
    InstallLocation {
        platform: Platform::MacOs,
        root_env: None,
        segments: &["/Applications/Blackmagic RAW/Blackmagic RAW SDK/Mac/Libraries"],
    },
    InstallLocation {
        platform: Platform::Linux,
        root_env: None,
        segments: &["/usr/lib/blackmagic/BlackmagicRAWSDK/Linux/Libraries"],
    },
    InstallLocation {
        platform: Platform::Linux,
        root_env: None,
        segments: &["/usr/lib64/blackmagic/BlackmagicRAWSDK/Linux/Libraries"],
    },
];

/// Resolves the directory containing the codec library.
#[derive(Debug, Clone)]
pub struct LibraryLocator {
    bundle_root: Option<PathBuf>,
    system_dirs: Vec<PathBuf>,
}

impl LibraryLocator {
    /// Locator for the current platform.
    pub fn new(bundle_root: Option<PathBuf>) -> Self {
        Self::for_platform(Platform::current(), bundle_root, |key| std::env::var_os(key))
    }

    /// Locator for `platform`, reading path roots through `env`.
    pub fn for_platform(
        platform: Platform,
        bundle_root: Option<PathBuf>,
        env: impl Fn(&str) -> Option<std::ffi::OsString>,
    ) -> Self {
        let system_dirs = INSTALL_TABLE
            .iter()
            .filter(|loc| loc.platform == platform)
            .filter_map(|loc| {
                let mut path = match loc.root_env {
                    Some(key) => match env(key) {
                        Some(root) => PathBuf::from(root),
                        None => {
                            debug!(env = key, "install root not set, skipping location");
                            return None;
                        }
                    },
                    None => PathBuf::new(),
                };
                path.extend(loc.segments);
                Some(path)
            })
            .collect();
        Self::with_system_dirs(bundle_root, system_dirs)
    }

    /// Locator with an explicit list of system directories.
    pub fn with_system_dirs(bundle_root: Option<PathBuf>, system_dirs: Vec<PathBuf>) -> Self {
        Self {
            bundle_root,
            system_dirs,
        }
    }

    /// Candidate directories in lookup order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let bundled = self.bundle_root.as_ref().map(|root| {
            let mut dir = root.clone();
            dir.extend(BUNDLE_CODEC_DIR);
            dir
        });
        bundled.into_iter().chain(self.system_dirs.iter().cloned()).collect()
    }

    /// First candidate that exists as a directory.
    ///
    /// `None` is a configuration error for the caller; the lookup is not retried.
    pub fn locate(&self) -> Option<PathBuf> {
        let found = self.candidates().into_iter().find(|dir| is_dir(dir));
        match &found {
            Some(dir) => info!(path = %dir.display(), "Located codec library"),
            None => warn!("Codec library not found in any known location"),
        }
        found
    }
}

fn is_dir(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}
