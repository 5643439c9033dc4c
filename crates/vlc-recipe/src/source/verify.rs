use std::fs;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::{Error, Result};

pub fn md5_file_hex(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| Error::msg(format!("failed to open {}: {e}", path.display())))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 1024 * 256];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Expected md5 for `filename` from md5sum-style text.
///
/// Lines are `<hex>  <name>`, `<hex> *<name>` (binary-mode marker) or a bare `<hex>`.
/// The line naming `filename` wins; otherwise a file with a single entry is accepted.
pub fn parse_hash_file(text: &str, filename: &str) -> Result<String> {
    let mut entries: Vec<(String, Option<String>)> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (hash, name) = match line.split_once(char::is_whitespace) {
            Some((h, rest)) => {
                let name = rest.trim_start().trim_start_matches('*').trim();
                (h, (!name.is_empty()).then(|| name.to_string()))
            }
            None => (line, None),
        };
        if hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::msg(format!("malformed md5 entry '{line}'")));
        }
        entries.push((hash.to_ascii_lowercase(), name));
    }

    let base = |n: &str| n.rsplit(['/', '\\']).next().unwrap_or(n).to_string();
    if let Some((h, _)) = entries
        .iter()
        .find(|(_, n)| n.as_deref().map(base).as_deref() == Some(filename))
    {
        return Ok(h.clone());
    }
    match entries.as_slice() {
        [(h, _)] => Ok(h.clone()),
        [] => Err(Error::msg("hash file has no entries")),
        _ => Err(Error::msg(format!("hash file has no entry for {filename}"))),
    }
}

/// Check `archive` against the md5 published in `hash_file`.
pub fn verify_archive(archive: &Path, hash_file: &Path) -> Result<String> {
    let filename = archive
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = fs::read_to_string(hash_file)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", hash_file.display())))?;
    let expected = parse_hash_file(&text, &filename)
        .map_err(|e| e.context(hash_file.display()))?;
    let actual = md5_file_hex(archive)?;
    if actual != expected {
        return Err(Error::msg(format!(
            "md5 mismatch for {filename}: expected {expected}, got {actual}"
        )));
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    // md5("hello\n")
    const HELLO_MD5: &str = "b1946ac92492d2347c6235b4d2611184";

    #[test]
    fn binary_marker_is_stripped() {
        let text = format!(
            "{HELLO_MD5} *vlc-3.0.4.tar.xz\n00000000000000000000000000000000  other.tar.xz\n"
        );
        assert_eq!(parse_hash_file(&text, "vlc-3.0.4.tar.xz").unwrap(), HELLO_MD5);
        assert_eq!(
            parse_hash_file(&format!("{}\n", HELLO_MD5.to_uppercase()), "x").unwrap(),
            HELLO_MD5
        );
        assert!(parse_hash_file("nothex *a\n", "a").is_err());
        assert!(parse_hash_file("", "a").is_err());
    }

    #[test]
    fn verification_accepts_matching_and_rejects_other_content() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let archive = tmp.path().join("vlc-3.0.4.tar.xz");
        let hashes = tmp.path().join("vlc-3.0.4.tar.xz.md5");
        fs::write(&hashes, format!("{HELLO_MD5} *vlc-3.0.4.tar.xz\n")).unwrap();

        fs::write(&archive, b"hello\n").unwrap();
        assert_eq!(verify_archive(&archive, &hashes).unwrap(), HELLO_MD5);

        fs::write(&archive, b"hello!\n").unwrap();
        let err = verify_archive(&archive, &hashes).unwrap_err().to_string();
        assert!(err.contains("md5 mismatch"), "unexpected err: {err}");
    }
}
