//! Source fixes needed before the Windows SDK headers can be consumed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::recipe::PatchSet;

/// Drops the `poll` -> `vlc_poll` redefinition from `vlc_threads.h`.
pub const POLL_PATCH: &str = include_str!("../../patches/poll.patch");

pub const READ_CB_SEARCH: &str =
    "typedef ssize_t (*libvlc_media_read_cb)(void *opaque, unsigned char *buf";
pub const READ_CB_REPLACE: &str =
    "typedef     int (*libvlc_media_read_cb)(void *opaque, unsigned char *buf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    AlreadyApplied,
    /// Target file does not exist in this tree.
    Absent,
    /// File exists but the expected text is not in it.
    NoMatch,
}

impl PatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOutcome::Applied => "applied",
            PatchOutcome::AlreadyApplied => "already applied",
            PatchOutcome::Absent => "absent, skipped",
            PatchOutcome::NoMatch => "no match",
        }
    }
}

/// Headers the `poll` patch targets, relative to the source root.
pub fn poll_targets(source_root: &Path) -> Vec<PathBuf> {
    vec![
        source_root.join("include").join("vlc_threads.h"),
        source_root
            .join("sdk")
            .join("include")
            .join("vlc")
            .join("plugins")
            .join("vlc_threads.h"),
    ]
}

pub fn read_cb_target(source_root: &Path) -> PathBuf {
    source_root
        .join("sdk")
        .join("include")
        .join("vlc")
        .join("libvlc_media.h")
}

/// Apply a unified diff to `file`. Reruns over an already patched file are detected
/// by the reverse patch applying cleanly.
pub fn apply_unified(file: &Path, patch_text: &str) -> Result<PatchOutcome> {
    if !file.is_file() {
        return Ok(PatchOutcome::Absent);
    }
    let patch = diffy::Patch::from_str(patch_text)
        .map_err(|e| Error::msg(format!("invalid patch: {e}")))?;
    let original = fs::read_to_string(file)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", file.display())))?;

    match diffy::apply(&original, &patch) {
        Ok(patched) => {
            write_back(file, &patched)?;
            Ok(PatchOutcome::Applied)
        }
        Err(e) => {
            if diffy::apply(&original, &patch.reverse()).is_ok() {
                return Ok(PatchOutcome::AlreadyApplied);
            }
            Err(Error::msg(format!(
                "patch does not apply to {}: {e}",
                file.display()
            )))
        }
    }
}

/// Replace every occurrence of `search` in `file` with `replace`.
pub fn replace_in_file(file: &Path, search: &str, replace: &str) -> Result<PatchOutcome> {
    if !file.is_file() {
        return Ok(PatchOutcome::Absent);
    }
    let text = fs::read_to_string(file)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", file.display())))?;
    if !text.contains(search) {
        return Ok(if text.contains(replace) {
            PatchOutcome::AlreadyApplied
        } else {
            PatchOutcome::NoMatch
        });
    }
    write_back(file, &text.replace(search, replace))?;
    Ok(PatchOutcome::Applied)
}

fn write_back(file: &Path, text: &str) -> Result<()> {
    fs::write(file, text)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", file.display())))
}

/// Apply the selected patches under `source_root`, returning one outcome per target.
pub fn apply_all(source_root: &Path, set: PatchSet) -> Result<Vec<(PathBuf, PatchOutcome)>> {
    let mut out = Vec::new();
    if set.poll {
        for target in poll_targets(source_root) {
            let outcome = apply_unified(&target, POLL_PATCH)?;
            out.push((target, outcome));
        }
    }
    if set.read_cb_typedef {
        let target = read_cb_target(source_root);
        let outcome = replace_in_file(&target, READ_CB_SEARCH, READ_CB_REPLACE)?;
        out.push((target, outcome));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREADS_H: &str = "\
static inline int vlc_poll(struct pollfd *fds, unsigned nfds, int timeout)
{
    int val;

    do
    {
        val = poll (fds, nfds, timeout);
    }
    while (val == 0 && timeout != 0);

    return val;
}
# define poll(u,n,t) vlc_poll(u, n, t)

#elif defined (__OS2__)
# include <errno.h>
";

    #[test]
    fn poll_patch_removes_redefinition_once() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let header = tmp.path().join("include").join("vlc_threads.h");
        fs::create_dir_all(header.parent().unwrap()).unwrap();
        fs::write(&header, THREADS_H).unwrap();

        assert_eq!(apply_unified(&header, POLL_PATCH).unwrap(), PatchOutcome::Applied);
        let patched = fs::read_to_string(&header).unwrap();
        assert!(!patched.contains("# define poll("));
        assert!(patched.contains("#elif defined (__OS2__)"));

        assert_eq!(
            apply_unified(&header, POLL_PATCH).unwrap(),
            PatchOutcome::AlreadyApplied
        );
    }

    #[test]
    fn absent_targets_are_a_no_op() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let out = apply_all(tmp.path(), PatchSet::default()).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|(_, o)| *o == PatchOutcome::Absent));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn read_callback_typedef_uses_int() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let header = read_cb_target(tmp.path());
        fs::create_dir_all(header.parent().unwrap()).unwrap();
        fs::write(
            &header,
            format!("/* media */\n{READ_CB_SEARCH},\n                                     size_t len);\n"),
        )
        .unwrap();

        let set = PatchSet {
            poll: false,
            read_cb_typedef: true,
        };
        let out = apply_all(tmp.path(), set).unwrap();
        assert_eq!(out, vec![(header.clone(), PatchOutcome::Applied)]);
        let text = fs::read_to_string(&header).unwrap();
        assert!(text.contains(READ_CB_REPLACE));
        assert!(!text.contains("ssize_t"));

        let out = apply_all(tmp.path(), set).unwrap();
        assert_eq!(out[0].1, PatchOutcome::AlreadyApplied);
    }

    #[test]
    fn mismatched_content_is_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let header = tmp.path().join("vlc_threads.h");
        fs::write(&header, "int unrelated;\n").unwrap();
        assert!(apply_unified(&header, POLL_PATCH).is_err());
        assert_eq!(
            replace_in_file(&header, READ_CB_SEARCH, READ_CB_REPLACE).unwrap(),
            PatchOutcome::NoMatch
        );
    }
}
