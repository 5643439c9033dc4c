//! Host package installation for build and system prerequisites.

use std::fs;
use std::process::Command;

/// Needed to run `./bootstrap`.
pub const BUILD_PREREQUISITES: &[&str] = &["autopoint", "libtool", "automake"];
/// Needed by the upstream configure/build.
pub const SYSTEM_PREREQUISITES: &[&str] = &["flex", "bison", "gettext"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Distro {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_id: Option<String>,
}

/// Parse the `KEY=value` lines of an os-release file.
pub fn parse_os_release(text: &str) -> Distro {
    let mut d = Distro::default();
    for line in text.lines() {
        let Some((k, v)) = line.trim().split_once('=') else {
            continue;
        };
        let v = v.trim().trim_matches('"').trim_matches('\'');
        match k.trim() {
            "ID" => d.id = v.to_ascii_lowercase(),
            "ID_LIKE" => {
                d.id_like = v
                    .split_whitespace()
                    .map(|s| s.to_ascii_lowercase())
                    .collect()
            }
            "VERSION_ID" => d.version_id = Some(v.to_string()),
            _ => {}
        }
    }
    d
}

pub fn detect_distro() -> Option<Distro> {
    ["/etc/os-release", "/usr/lib/os-release"]
        .iter()
        .find_map(|p| fs::read_to_string(p).ok())
        .map(|t| parse_os_release(&t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installer {
    Apt,
}

/// Debian, Ubuntu and their derivatives use apt; nothing else is supported.
pub fn installer_for(distro: &Distro) -> Option<Installer> {
    let apt_based = |id: &str| matches!(id, "ubuntu" | "debian");
    if apt_based(&distro.id) || distro.id_like.iter().any(|id| apt_based(id)) {
        Some(Installer::Apt)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SystemPackageTool {
    pub installer: Installer,
    pub sudo: bool,
}

impl SystemPackageTool {
    pub fn new(installer: Installer, sudo: bool) -> Self {
        Self {
            installer,
            sudo: sudo && !running_as_root(),
        }
    }

    fn base(&self, program: &str) -> Command {
        if self.sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").arg(program);
            cmd
        } else {
            Command::new(program)
        }
    }

    pub fn update_command(&self) -> Command {
        match self.installer {
            Installer::Apt => {
                let mut cmd = self.base("apt-get");
                cmd.arg("update");
                cmd
            }
        }
    }

    pub fn install_command(&self, packages: &[&str]) -> Command {
        match self.installer {
            Installer::Apt => {
                let mut cmd = self.base("apt-get");
                cmd.arg("install")
                    .arg("-y")
                    .arg("--no-install-recommends")
                    .args(packages);
                cmd.env("DEBIAN_FRONTEND", "noninteractive");
                cmd
            }
        }
    }

    /// Packages from `packages` that are not installed yet.
    pub fn missing<'a>(&self, packages: &[&'a str]) -> Vec<&'a str> {
        match self.installer {
            Installer::Apt => packages
                .iter()
                .copied()
                .filter(|p| !dpkg_installed(p))
                .collect(),
        }
    }
}

fn dpkg_installed(package: &str) -> bool {
    Command::new("dpkg-query")
        .arg("-W")
        .arg("-f=${Status}")
        .arg(package)
        .output()
        .map(|out| {
            out.status.success()
                && String::from_utf8_lossy(&out.stdout).contains("install ok installed")
        })
        .unwrap_or(false)
}

fn running_as_root() -> bool {
    std::env::var("USER").map(|u| u == "root").unwrap_or(false)
        || std::env::var("EUID").map(|u| u == "0").unwrap_or(false)
}
