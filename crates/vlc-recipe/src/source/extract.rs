use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::GzDecoder;
use tar::Archive;
use xz2::read::XzDecoder;

use super::ArchiveFormat;
use crate::error::{Error, Result};
use crate::settings::Os;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Unpacked in-process.
    Done,
    /// Not a tar-based archive; an external tool is needed.
    Unsupported(ArchiveFormat),
    /// The content does not decode as the format its name claims. `dest` may hold
    /// partially unpacked files.
    Mismatch {
        format: ArchiveFormat,
        reason: String,
    },
}

// Decoder and tar header failures keep these kinds through `TarError`.
fn is_format_error(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other
    )
}

/// Unpack a tar-based archive into `dest`.
pub fn unpack(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<Extraction> {
    let file = fs::File::open(archive)
        .map_err(|e| Error::msg(format!("failed to open {}: {e}", archive.display())))?;
    let reader = BufReader::new(file);
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::Tar => Box::new(reader),
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(reader)),
        ArchiveFormat::TarXz => Box::new(XzDecoder::new(reader)),
        ArchiveFormat::SevenZip | ArchiveFormat::Unknown => {
            return Ok(Extraction::Unsupported(format));
        }
    };
    fs::create_dir_all(dest)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", dest.display())))?;
    match Archive::new(reader).unpack(dest) {
        Ok(()) => Ok(Extraction::Done),
        Err(e) if is_format_error(e.kind()) => Ok(Extraction::Mismatch {
            format,
            reason: e.to_string(),
        }),
        Err(e) => Err(Error::msg(format!(
            "failed to extract {} into {}: {e}",
            archive.display(),
            dest.display()
        ))),
    }
}

/// External extraction command for archives the in-process path cannot handle.
/// Chosen by the host the recipe runs on; `None` means no known tool.
pub fn fallback_command(host: Option<Os>, archive: &Path, dest: &Path) -> Option<Command> {
    let mut cmd = match host? {
        Os::Linux => {
            let mut c = Command::new("tar");
            c.arg("-xavf").arg(archive);
            c
        }
        Os::Windows => {
            let mut c = Command::new("7z");
            c.arg("x").arg(archive);
            c
        }
    };
    cmd.current_dir(dest);
    Some(cmd)
}

pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::msg(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

/// Rename `<dest>/<from>` to `<dest>/<to>`.
pub fn rename_top_level(dest: &Path, from: &str, to: &str) -> Result<PathBuf> {
    let src = dest.join(from);
    let dst = dest.join(to);
    if !src.is_dir() {
        return Err(Error::msg(format!(
            "expected extracted directory {} not found",
            src.display()
        )));
    }
    fs::rename(&src, &dst).map_err(|e| {
        Error::msg(format!(
            "failed to rename {} -> {}: {e}",
            src.display(),
            dst.display()
        ))
    })?;
    Ok(dst)
}
