use std::fs;
use std::path::Path;
use std::sync::{Arc, mpsc};

use flate2::Compression;
use flate2::write::GzEncoder;

use vlc_recipe::config::ConfigDoc;
use vlc_recipe::executor::{ChannelSink, ExecCtx, ExecEvent};
use vlc_recipe::package::info::{self, PackageInfo};
use vlc_recipe::source::extract::{self, Extraction};
use vlc_recipe::source::{ArchiveFormat, verify};

fn touch(p: &Path) {
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(p, p.file_name().unwrap().to_string_lossy().as_bytes()).unwrap();
}

fn windows_doc(root: &Path) -> ConfigDoc {
    let raw = format!(
        r#"
[workspace]
root_dir = "{}"

[settings]
os = "Windows"
compiler = "Visual Studio"
"#,
        root.display()
    );
    ConfigDoc {
        path: root.join("recipe.toml"),
        value: toml::from_str(&raw).unwrap(),
    }
}

fn exec_task(doc: &ConfigDoc, id: &str) -> Vec<ExecEvent> {
    let reg = vlc_recipe::executor::builtin_registry().unwrap();
    let (tx, rx) = mpsc::channel();
    let mut ctx = ExecCtx::new(false, Arc::new(ChannelSink::new(tx)));
    ctx.set_task(id);
    let exec = reg.get(id).unwrap();
    exec(doc, &mut ctx).unwrap();
    drop(ctx);
    rx.into_iter().collect()
}

#[test]
fn sdk_copy_builds_package_folder_and_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let tree = tmp.path().join("build/vlc-3.0.4/source/vlc");
    touch(&tree.join("libvlc.dll"));
    touch(&tree.join("libvlccore.dll"));
    touch(&tree.join("plugins/access/libfilesystem_plugin.dll"));
    touch(&tree.join("sdk/lib/libvlc.lib"));
    touch(&tree.join("sdk/lib/pkgconfig/libvlc.pc"));
    touch(&tree.join("sdk/include/vlc/vlc.h"));
    touch(&tree.join("README.txt"));

    let doc = windows_doc(tmp.path());
    exec_task(&doc, "package.sdk");

    let pkg = tmp.path().join("out/vlc-3.0.4/package");
    assert!(pkg.join("bin/libvlc.dll").is_file());
    assert!(pkg.join("bin/libvlccore.dll").is_file());
    assert!(pkg.join("bin/plugins/access/libfilesystem_plugin.dll").is_file());
    assert!(pkg.join("lib/libvlc.lib").is_file());
    assert!(pkg.join("lib/pkgconfig/libvlc.pc").is_file());
    assert!(pkg.join("include/vlc/vlc.h").is_file());
    assert!(!pkg.join("README.txt").exists());
    assert!(!pkg.join("lib/pkgconfig/libvlc.lib").exists());

    let events = exec_task(&doc, "package.info");
    assert!(events.iter().any(|ev| matches!(
        ev,
        ExecEvent::TaskLog { line, .. } if line.starts_with("env: PKG_CONFIG_LIBVLC_PREFIX=")
    )));

    let published: PackageInfo = info::read(&pkg).unwrap();
    assert_eq!(published.libs, vec!["libvlc"]);
    assert_eq!(
        published.env.get("PKG_CONFIG_LIBVLC_PREFIX").map(String::as_str),
        Some(pkg.display().to_string().replace('\\', "/").as_str())
    );
    assert_eq!(published.pkg_config_path.len(), 1);
    assert!(published.pkg_config_path[0].ends_with("lib/pkgconfig"));
}

#[test]
fn info_skips_without_package_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = windows_doc(tmp.path());
    let events = exec_task(&doc, "package.info");
    assert!(events.iter().any(|ev| matches!(
        ev,
        ExecEvent::TaskLog { line, .. } if line.contains("skipped: no package folder")
    )));
}

#[test]
fn verified_archive_extracts_to_canonical_name() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("vlc-3.0.4.tar.gz");
    {
        let f = fs::File::create(&archive).unwrap();
        let mut tar = tar::Builder::new(GzEncoder::new(f, Compression::default()));
        let body = b"#!/bin/sh\necho configure\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        tar.append_data(&mut header, "vlc-3.0.4/configure", &body[..])
            .unwrap();
        tar.into_inner().unwrap().finish().unwrap();
    }

    let md5 = verify::md5_file_hex(&archive).unwrap();
    let sums = tmp.path().join("vlc-3.0.4.tar.gz.md5");
    fs::write(&sums, format!("{md5} *vlc-3.0.4.tar.gz\n")).unwrap();
    assert_eq!(verify::verify_archive(&archive, &sums).unwrap(), md5);

    let dest = tmp.path().join("source");
    fs::create_dir_all(&dest).unwrap();
    let format = ArchiveFormat::from_filename("vlc-3.0.4.tar.gz");
    assert_eq!(format, ArchiveFormat::TarGz);
    assert_eq!(
        extract::unpack(&archive, format, &dest).unwrap(),
        Extraction::Done
    );

    let tree = extract::rename_top_level(&dest, "vlc-3.0.4", "vlc").unwrap();
    assert_eq!(tree, dest.join("vlc"));
    assert!(tree.join("configure").is_file());
    assert!(!dest.join("vlc-3.0.4").exists());
}

#[test]
fn tampered_archive_fails_verification() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("vlc-3.0.4.tar.xz");
    fs::write(&archive, b"not the real archive").unwrap();
    let sums = tmp.path().join("md5sums.txt");
    fs::write(
        &sums,
        "b1946ac92492d2347c6235b4d2611184  vlc-3.0.4.tar.xz\n",
    )
    .unwrap();

    let err = verify::verify_archive(&archive, &sums).unwrap_err().to_string();
    assert!(err.contains("md5 mismatch"), "unexpected err: {err}");
}
