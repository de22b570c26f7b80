//! Per-platform library-audit policy.
//!
//! A policy is an ordered list of accepted system directories, each with a
//! trust mode, plus an ordered list of accepted base-library-name patterns.
//! On Linux a library must both live in an accepted directory *and* match a
//! name pattern; on macOS anything inside an accepted directory is trusted
//! (custom installs land in /usr/local or Homebrew prefixes, not the system
//! paths). The built-in lists are maintained by hand and drift with OS
//! updates; a JSON policy file can replace them wholesale at startup.

use std::fs;
use std::path::{Path, PathBuf};

use naprel_error::{NaprelError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Trust mode for one accepted system directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustMode {
    /// Any library found inside the directory is accepted.
    DirectoryAbsolute,
    /// Libraries inside the directory must also match a name pattern.
    NameRestricted,
}

/// One accepted system directory.
#[derive(Debug, Clone)]
pub struct AcceptedDir {
    pub prefix: PathBuf,
    pub trust: TrustMode,
}

/// The compiled audit policy for one platform.
#[derive(Debug, Clone)]
pub struct LibraryPolicy {
    accepted_dirs: Vec<AcceptedDir>,
    name_patterns: Vec<Regex>,
}

/// On-disk form of a policy, loaded via `--library-policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFile {
    pub accepted_dirs: Vec<PolicyDirEntry>,
    #[serde(default)]
    pub name_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDirEntry {
    pub path: PathBuf,
    pub trust: TrustMode,
}

impl LibraryPolicy {
    /// Compile a policy from directory entries and raw name patterns.
    ///
    /// Patterns are anchored against the full short name at compile time so
    /// the audit hot path does no extra work.
    pub fn compile(dirs: Vec<AcceptedDir>, patterns: &[&str]) -> Result<Self> {
        let mut name_patterns = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let anchored = format!("^(?:{pattern})$");
            let compiled = Regex::new(&anchored).map_err(|err| NaprelError::InvalidPolicy {
                detail: format!("bad name pattern '{pattern}': {err}"),
            })?;
            name_patterns.push(compiled);
        }
        Ok(Self {
            accepted_dirs: dirs,
            name_patterns,
        })
    }

    /// Load a policy from a JSON file, replacing the built-in defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let file: PolicyFile =
            serde_json::from_str(&text).map_err(|source| NaprelError::MalformedJson {
                path: path.to_path_buf(),
                source,
            })?;
        let dirs = file
            .accepted_dirs
            .into_iter()
            .map(|entry| AcceptedDir {
                prefix: entry.path,
                trust: entry.trust,
            })
            .collect();
        let patterns: Vec<&str> = file.name_patterns.iter().map(String::as_str).collect();
        Self::compile(dirs, &patterns)
    }

    /// Built-in defaults for the given platform and architecture.
    pub fn builtin(platform: Platform, arch: &str) -> Result<Self> {
        match platform {
            Platform::Linux => {
                let dirs = linux_accepted_dirs(arch);
                Self::compile(dirs, LINUX_BASE_ACCEPTED_SYSTEM_LIBS)
            }
            Platform::MacOs => {
                let dirs = MACOS_ACCEPTED_SYSTEM_LIB_PATHS
                    .iter()
                    .map(|p| AcceptedDir {
                        prefix: PathBuf::from(p),
                        trust: TrustMode::DirectoryAbsolute,
                    })
                    .collect();
                Self::compile(dirs, &[])
            }
            // The Windows audit is a no-op; an empty policy matches.
            Platform::Windows => Self::compile(Vec::new(), &[]),
        }
    }

    /// The first accepted directory containing `path`, if any.
    #[must_use]
    pub fn dir_for(&self, path: &Path) -> Option<&AcceptedDir> {
        self.accepted_dirs.iter().find(|d| path.starts_with(&d.prefix))
    }

    /// Whether a short library name matches any accepted name pattern.
    #[must_use]
    pub fn name_accepted(&self, short_name: &str) -> bool {
        self.name_patterns.iter().any(|re| re.is_match(short_name))
    }

    #[must_use]
    pub fn accepted_dirs(&self) -> &[AcceptedDir] {
        &self.accepted_dirs
    }
}

fn linux_accepted_dirs(arch: &str) -> Vec<AcceptedDir> {
    let paths: &[&str] = match arch {
        "x86_64" => &[
            "/usr/lib/x86_64-linux-gnu",
            "/lib/x86_64-linux-gnu",
            "/usr/lib/mesa-diverted/x86_64-linux-gnu",
        ],
        // 32-bit ARM userlands report aarch64 kernels; accept both multiarch
        // triplets plus the VideoCore path on Raspberry Pi.
        "aarch64" | "arm" => &[
            "/usr/lib/aarch64-linux-gnu",
            "/usr/lib/arm-linux-gnueabihf",
            "/opt/vc/lib",
        ],
        _ => &[],
    };
    paths
        .iter()
        .map(|p| AcceptedDir {
            prefix: PathBuf::from(p),
            trust: TrustMode::NameRestricted,
        })
        .collect()
}

/// Accepted macOS system library locations. Anything inside is trusted.
pub const MACOS_ACCEPTED_SYSTEM_LIB_PATHS: &[&str] = &[
    "/usr/lib",
    "/System/Library/Frameworks",
    "/System/Library/PrivateFrameworks",
    "/System/Library/Extensions",
    "/System/Library/Components",
    "/Library/CoreMediaIO",
];

/// Accepted base library names for the Linux system paths.
///
/// Developed against Ubuntu 20.04/20.10 with x.org, Nvidia (open and
/// proprietary) and Intel i965 drivers; new distro versions tend to need
/// minor additions. Regular expressions, matched against the short name
/// with the `.so` suffix and everything after it stripped.
pub const LINUX_BASE_ACCEPTED_SYSTEM_LIBS: &[&str] = &[
    "i965_dri",
    "iris_dri",
    r"ld-[0-9]+\.[0-9]+",
    "ld-linux-x86-64",
    "ld-linux-aarch64",
    "libFLAC",
    "libICE",
    "libGL",
    "libGLX",
    "libGLX_mesa",
    "libGLX_nvidia",
    "libGLdispatch",
    "libLLVM-[0-9]+",
    "libOpenCL",
    "libSM",
    "libVkLayer_MESA_device_select",
    "libX11",
    "libX11-xcb",
    "libXau",
    "libXcursor",
    "libXdamage",
    "libXdmcp",
    "libXext",
    "libXfixes",
    "libXi",
    "libXinerama",
    "libXrandr",
    "libXrender",
    "libXss",
    "libXtst",
    "libXxf86vm",
    "libaom",
    "libapparmor",
    "libarmmem-v7l",
    "libasound",
    "libasound_module_pcm_a52",
    "libasound_module_pcm_jack",
    "libasound_module_pcm_oss",
    "libasound_module_pcm_pulse",
    "libasound_module_pcm_speex",
    "libasound_module_pcm_upmix",
    "libasound_module_pcm_usb_stream",
    "libasound_module_pcm_vdownmix",
    "libasound_module_rate_lavrate",
    "libasound_module_rate_samplerate",
    "libasound_module_rate_speexrate",
    "libasyncns",
    "libatomic",
    "libavcodec",
    "libavresample",
    "libavutil",
    "libbcm_host",
    "libblkid",
    "libbrotlicommon",
    "libbrotlidec",
    "libbsd",
    "libbz2",
    "libc",
    r"libc-[0-9]+\.[0-9]+",
    "libcairo",
    "libcairo-gobject",
    "libcap",
    "libcodec2",
    "libcom_err",
    r"libcroco-[0-9]+\.[0-9]+",
    "libcuda",
    "libdatrie",
    "libdav1d",
    r"libdb-[0-9]+\.[0-9]+",
    "libdbus-1",
    "libdecor-0",
    "libdl",
    r"libdl-[0-9]+\.[0-9]+",
    "libdrm",
    "libdrm_amdgpu",
    "libdrm_intel",
    "libdrm_nouveau",
    "libdrm_radeon",
    "libedit",
    r"libelf-[0-9]+\.[0-9]+",
    "libexpat",
    "libffi",
    "libfontconfig",
    "libfreetype",
    "libfribidi",
    "libgbm",
    "libgcc_s",
    "libgcrypt",
    r"libgdk_pixbuf-[0-9]+\.[0-9]+",
    r"libgio-[0-9]+\.[0-9]+",
    "libglapi",
    r"libglib-[0-9]+\.[0-9]+",
    r"libgmodule-[0-9]+\.[0-9]+",
    r"libgobject-[0-9]+\.[0-9]+",
    "libgomp",
    "libgpg-error",
    "libgraphite2",
    "libgsm",
    "libgssapi_krb5",
    r"libgthread-[0-9]+\.[0-9]+",
    "libharfbuzz",
    "libicudata",
    "libicui18n",
    "libicuuc",
    "libjack",
    "libjpeg",
    "libk5crypto",
    "libkeyutils",
    "libkrb5",
    "libkrb5support",
    "liblz4",
    "liblzma",
    "libm",
    r"libm-[0-9]+\.[0-9]+",
    "libmd",
    "libmfx",
    "libmount",
    "libmp3lame",
    "libmmal_core",
    "libmmal_util",
    "libmmal_vc_client",
    r"libmvec-[0-9]+\.[0-9]+",
    "libnsl",
    r"libnsl-[0-9]+\.[0-9]+",
    "libnss_compat",
    r"libnss_compat-[0-9]+\.[0-9]+",
    r"libnss_files-[0-9]+\.[0-9]+",
    "libnss_nis",
    r"libnss_nis-[0-9]+\.[0-9]+",
    "libnuma",
    "libnvidia-cbl",
    "libnvidia-compiler",
    "libnvidia-fatbinaryloader",
    "libnvidia-glcore",
    "libnvidia-glvkspirv",
    "libnvidia-opencl",
    "libnvidia-rtcore",
    "libnvidia-tls",
    "libogg",
    "libopenjp2",
    "libopus",
    r"libpango-[0-9]+\.[0-9]+",
    r"libpangocairo-[0-9]+\.[0-9]+",
    r"libpangoft2-[0-9]+\.[0-9]+",
    "libpciaccess",
    "libpcre",
    "libpcre2-8",
    "libpixman-1",
    "libpng16",
    "libpthread",
    r"libpthread-[0-9]+\.[0-9]+",
    "libpulse",
    r"libpulsecommon-[0-9]+\.[0-9]+",
    r"libpython[0-9]+\.[0-9]+m",
    "libresolv",
    r"libresolv-[0-9]+\.[0-9]+",
    "librsvg-2",
    "librt",
    r"librt-[0-9]+\.[0-9]+",
    "libsamplerate",
    "libselinux",
    "libsensors",
    "libshine",
    "libsnappy",
    "libsndfile",
    "libsoxr",
    "libspeex",
    "libspeexdsp",
    r"libstdc\+\+",
    "libswresample",
    "libsystemd",
    "libthai",
    "libtheoradec",
    "libtheoraenc",
    "libtinfo",
    "libtirpc",
    "libtwolame",
    "libudev",
    r"libusb-[0-9]+\.[0-9]+",
    "libutil",
    r"libutil-[0-9]+\.[0-9]+",
    "libuuid",
    "libva",
    "libva-drm",
    "libva-x11",
    "libvchiq_arm",
    "libvcos",
    "libvcsm",
    "libvdpau",
    "libvorbis",
    "libvorbisenc",
    "libvpx",
    "libvulkan_broadcom",
    "libvulkan_freedreno",
    "libvulkan_intel",
    "libvulkan_lvp",
    "libvulkan_radeon",
    "libvulkan_virtio",
    "libwavpack",
    "libwayland-client",
    "libwayland-cursor",
    "libwayland-egl",
    "libwayland-server",
    "libwebp",
    "libwebpmux",
    "libwrap",
    "libx264",
    "libx265",
    "libxcb",
    "libxcb-dri2",
    "libxcb-dri3",
    "libxcb-glx",
    "libxcb-icccm",
    "libxcb-image",
    "libxcb-keysyms",
    "libxcb-present",
    "libxcb-randr",
    "libxcb-render",
    "libxcb-render-util",
    "libxcb-shape",
    "libxcb-shm",
    "libxcb-sync",
    "libxcb-util",
    "libxcb-xinerama",
    "libxcb-xkb",
    "libxcb-xfixes",
    "libxkbcommon",
    "libxkbcommon-x11",
    "libxml2",
    "libxshmfence",
    "libxvidcore",
    "libz",
    "libz3",
    "libzstd",
    "libzvbi",
    "nouveau_dri",
    "radeonsi_dri",
    "sun4i-drm_dri",
    "vc4_dri",
];
