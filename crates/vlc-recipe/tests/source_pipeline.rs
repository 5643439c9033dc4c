use std::fs;
use std::path::Path;
use std::sync::{Arc, mpsc};

use vlc_recipe::config::ConfigDoc;
use vlc_recipe::executor::{ChannelSink, ExecCtx, ExecEvent};

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

const MEDIA_H: &str = "\
typedef ssize_t (*libvlc_media_read_cb)(void *opaque, unsigned char *buf,
                                        size_t len);
";

fn touch_with(p: &Path, body: &str) {
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(p, body).unwrap();
}

fn doc_in(root: &Path, settings: &str) -> ConfigDoc {
    let raw = format!(
        r#"
[workspace]
root_dir = "{}"

[prerequisites]
enabled = false

{settings}
"#,
        root.display()
    );
    ConfigDoc {
        path: root.join("recipe.toml"),
        value: toml::from_str(&raw).unwrap(),
    }
}

fn log_lines(events: &[ExecEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|ev| match ev {
            ExecEvent::TaskLog { line, .. } => Some(line.as_str()),
            _ => None,
        })
        .collect()
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
fn checksum_mismatch_stops_before_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("build/vlc-3.0.4/source");
    touch_with(&source.join("vlc-3.0.4.tar.xz"), "tampered archive");
    touch_with(
        &tmp.path().join("md5sums/vlc-3.0.4.tar.xz.md5"),
        "b1946ac92492d2347c6235b4d2611184 *vlc-3.0.4.tar.xz\n",
    );

    let doc = doc_in(tmp.path(), "[settings]\nos = \"Linux\"\ncompiler = \"gcc\"\n");
    let plan = vlc_recipe::modules::plan_recipe(&doc).unwrap();
    let reg = vlc_recipe::executor::builtin_registry().unwrap();
    let (tx, rx) = mpsc::channel();
    let mut ctx = ExecCtx::new(false, Arc::new(ChannelSink::new(tx)));
    let err = vlc_recipe::executor::execute_plan(&doc, &plan, &reg, &mut ctx)
        .unwrap_err()
        .to_string();
    drop(ctx);
    let events: Vec<ExecEvent> = rx.into_iter().collect();

    assert!(err.contains("source.verify"), "unexpected err: {err}");
    assert!(err.contains("md5 mismatch"), "unexpected err: {err}");
    assert!(events.iter().any(|ev| matches!(
        ev,
        ExecEvent::TaskFinished { id, ok: false, .. } if id == "source.verify"
    )));
    assert!(events.iter().any(|ev| matches!(
        ev,
        ExecEvent::TaskFinished { id, ok: true, .. } if id == "source.fetch"
    )));
    assert!(!events.contains(&ExecEvent::TaskStarted {
        id: "source.extract".into()
    }));
    assert!(!source.join("vlc").exists());
    assert!(!source.join("vlc-3.0.4").exists());
}

#[test]
fn windows_patches_apply_through_the_task() {
    let tmp = tempfile::tempdir().unwrap();
    let tree = tmp.path().join("build/vlc-3.0.4/source/vlc");
    touch_with(&tree.join("include/vlc_threads.h"), THREADS_H);
    touch_with(&tree.join("sdk/include/vlc/libvlc_media.h"), MEDIA_H);

    let doc = doc_in(
        tmp.path(),
        "[settings]\nos = \"Windows\"\ncompiler = \"Visual Studio\"\n",
    );
    let events = exec_task(&doc, "source.patch");
    let lines = log_lines(&events);

    let threads = fs::read_to_string(tree.join("include/vlc_threads.h")).unwrap();
    assert!(!threads.contains("# define poll(u,n,t)"), "{threads}");
    assert!(threads.contains("#elif defined (__OS2__)"));

    let media = fs::read_to_string(tree.join("sdk/include/vlc/libvlc_media.h")).unwrap();
    assert!(media.contains("typedef     int (*libvlc_media_read_cb)"), "{media}");
    assert!(!media.contains("ssize_t (*libvlc_media_read_cb)"));

    assert!(
        lines.iter().any(|l| l.ends_with("vlc_threads.h: applied")),
        "{lines:?}"
    );
    assert!(
        lines.iter().any(|l| l.ends_with("vlc_threads.h: absent, skipped")),
        "{lines:?}"
    );

    // A rerun over the patched tree changes nothing.
    let lines_again = exec_task(&doc, "source.patch");
    assert!(
        log_lines(&lines_again)
            .iter()
            .any(|l| l.ends_with("vlc_threads.h: already applied"))
    );
    assert_eq!(
        fs::read_to_string(tree.join("include/vlc_threads.h")).unwrap(),
        threads
    );
}

#[test]
fn linux_targets_are_not_patched() {
    let tmp = tempfile::tempdir().unwrap();
    let tree = tmp.path().join("build/vlc-3.0.4/source/vlc");
    touch_with(&tree.join("include/vlc_threads.h"), THREADS_H);

    let doc = doc_in(tmp.path(), "[settings]\nos = \"Linux\"\n");
    let events = exec_task(&doc, "source.patch");

    assert!(log_lines(&events).contains(&"no source patches for Linux targets"));
    assert_eq!(
        fs::read_to_string(tree.join("include/vlc_threads.h")).unwrap(),
        THREADS_H
    );
}
