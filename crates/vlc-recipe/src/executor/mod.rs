use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Instant;

use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_log_line;
use crate::planner::Plan;
use crate::workspace::{CleanMode, WorkspaceConfig, WorkspacePaths};

pub type TaskExecFn = fn(&ConfigDoc, &mut ExecCtx) -> Result<()>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    TaskStarted {
        id: String,
    },
    TaskLog {
        id: String,
        line: String,
    },
    TaskSkipped {
        id: String,
        reason: String,
    },
    TaskFinished {
        id: String,
        ok: bool,
        error: Option<String>,
        elapsed_ms: u128,
    },
    ExecutorDone {
        ok: bool,
        error: Option<String>,
    },
}

pub trait ExecSink: Send + Sync {
    fn emit(&self, ev: ExecEvent);
}

/// Prints `RUN`/`DONE`/`FAIL`/`SKIP` lines and a summary, and writes an error log per
/// failed task under `<build_dir>/error-logs/<timestamp>/`.
#[derive(Default)]
pub struct StdoutSink {
    build_dir: Option<PathBuf>,
    state: Mutex<StdoutSinkState>,
}

impl StdoutSink {
    /// Error logs go under the workspace `build_dir`. Without one they fall back to
    /// `<cwd>/build`.
    pub fn with_build_dir(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: Some(build_dir.into()),
            state: Mutex::default(),
        }
    }

    fn error_logs_root(&self) -> PathBuf {
        match &self.build_dir {
            Some(dir) => dir.join("error-logs"),
            None => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("build")
                .join("error-logs"),
        }
    }
}

#[derive(Default)]
struct StdoutSinkState {
    started_at: Option<Instant>,
    tasks_started: usize,
    tasks_ok: usize,
    tasks_skipped: usize,
    tasks_failed: usize,
    skipped: Vec<(String, String)>,
    failed_tasks: Vec<String>,
    task_logs: BTreeMap<String, VecDeque<String>>,
    error_logs_dir: Option<PathBuf>,
    error_log_paths: Vec<PathBuf>,
}

impl ExecSink for StdoutSink {
    fn emit(&self, ev: ExecEvent) {
        let Ok(mut s) = self.state.lock() else {
            return;
        };
        match ev {
            ExecEvent::TaskStarted { id } => {
                s.tasks_started += 1;
                s.started_at.get_or_insert_with(Instant::now);
                println!("RUN: {id}");
            }
            ExecEvent::TaskLog { id, line } => {
                append_task_log_line(&mut s.task_logs, &id, &line);
                println!("[{id}] {line}");
            }
            ExecEvent::TaskSkipped { id, reason } => {
                s.tasks_skipped += 1;
                s.task_logs.remove(&id);
                println!("SKIP: {id} ({reason})");
                s.skipped.push((id, reason));
            }
            ExecEvent::TaskFinished {
                id,
                ok,
                error,
                elapsed_ms,
            } => {
                if ok {
                    s.tasks_ok += 1;
                    s.task_logs.remove(&id);
                    println!("DONE: {id} ({elapsed_ms}ms)");
                    return;
                }
                s.tasks_failed += 1;
                s.failed_tasks.push(id.clone());
                let err_text = error.unwrap_or_default();
                println!("FAIL: {id} ({elapsed_ms}ms) {err_text}");
                let root = self.error_logs_root();
                match write_task_error_log(&mut s, &root, &id, &err_text, elapsed_ms) {
                    Ok(path) => println!("ERROR_LOG: {id} => {}", path.display()),
                    Err(e) => println!("WARN: failed to write task error log for {id}: {e}"),
                }
            }
            ExecEvent::ExecutorDone { ok, error } => {
                let wall = s.started_at.map(|t| t.elapsed()).unwrap_or_default();
                let mut summary = String::from("SUMMARY:\n");
                summary.push_str(&format!("  status: {}\n", if ok { "ok" } else { "failed" }));
                summary.push_str(&format!(
                    "  tasks: started={} ok={} skipped={} failed={}\n",
                    s.tasks_started, s.tasks_ok, s.tasks_skipped, s.tasks_failed
                ));
                summary.push_str(&format!("  elapsed: {}\n", format_elapsed_hms(wall.as_secs())));
                for (id, reason) in &s.skipped {
                    summary.push_str(&format!("  skipped: {id}: {reason}\n"));
                }
                if !s.failed_tasks.is_empty() {
                    summary.push_str(&format!("  failed_tasks: {}\n", s.failed_tasks.join(", ")));
                }
                for p in &s.error_log_paths {
                    summary.push_str(&format!("  error_log: {}\n", p.display()));
                }
                if let Some(e) = error.filter(|_| !ok) {
                    summary.push_str(&format!("  error: {e}\n"));
                }
                *s = StdoutSinkState::default();
                print!("{summary}");
            }
        }
    }
}

/// Forwards every event to a channel; used by callers that want to inspect the run.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ExecEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ExecEvent>) -> Self {
        Self { tx }
    }
}

impl ExecSink for ChannelSink {
    fn emit(&self, ev: ExecEvent) {
        let _ = self.tx.send(ev);
    }
}

#[derive(Clone)]
pub struct ExecCtx {
    pub dry_run: bool,
    pub sink: Arc<dyn ExecSink>,
    pub current_task_id: Option<String>,
    workspace_paths: Option<WorkspacePaths>,
    skip_reason: Option<String>,
}

impl ExecCtx {
    pub fn new(dry_run: bool, sink: Arc<dyn ExecSink>) -> Self {
        Self {
            dry_run,
            sink,
            current_task_id: None,
            workspace_paths: None,
            skip_reason: None,
        }
    }

    pub fn set_task(&mut self, id: impl Into<String>) {
        self.current_task_id = Some(id.into());
    }

    pub fn set_workspace_paths(&mut self, paths: WorkspacePaths) {
        self.workspace_paths = Some(paths);
    }

    pub fn workspace_paths(&self) -> Option<&WorkspacePaths> {
        self.workspace_paths.as_ref()
    }

    // Cleaning is only applied by core.init; later lookups just resolve the paths.
    // A dry run never creates directories.
    pub fn workspace_paths_or_init(&mut self, doc: &ConfigDoc) -> Result<WorkspacePaths> {
        if let Some(p) = self.workspace_paths.as_ref() {
            return Ok(p.clone());
        }
        let mut ws: WorkspaceConfig = doc.deserialize_path("workspace")?.unwrap_or_default();
        ws.clean = CleanMode::None;
        let paths = if self.dry_run {
            crate::workspace::load_paths(&ws)?
        } else {
            crate::workspace::init_dirs(&ws)?
        };
        self.workspace_paths = Some(paths.clone());
        Ok(paths)
    }

    pub fn log(&self, msg: &str) {
        let id = self
            .current_task_id
            .clone()
            .unwrap_or_else(|| "<none>".into());
        self.sink.emit(ExecEvent::TaskLog {
            id,
            line: msg.to_string(),
        });
    }

    pub fn warn(&self, msg: &str) {
        self.log(&format!("WARN: {msg}"));
    }

    /// Mark the current task as skipped. The task still returns `Ok(())`; the executor
    /// reports it as `TaskSkipped` instead of a plain success.
    pub fn skip(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.warn(&format!("skipped: {reason}"));
        self.skip_reason = Some(reason);
    }

    fn take_skip(&mut self) -> Option<String> {
        self.skip_reason.take()
    }

    /// Run a subprocess to completion, streaming its stdout/stderr lines into the task log.
    /// A non-zero exit status is an error.
    pub fn run_cmd(&self, mut cmd: Command) -> Result<()> {
        let shown = display_command(&cmd);
        if self.dry_run {
            self.log(&format!("DRY-RUN: {shown}"));
            return Ok(());
        }
        self.log(&format!("$ {shown}"));

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::msg(format!("failed to spawn '{shown}': {e}")))?;

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(out, tx));
        }
        if let Some(err) = child.stderr.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(err, tx));
        }
        drop(tx);

        for line in rx {
            let line = sanitize_log_line(&line);
            if !line.is_empty() {
                self.log(&line);
            }
        }

        let status = child
            .wait()
            .map_err(|e| Error::msg(format!("wait failed for '{shown}': {e}")))?;
        if !status.success() {
            return Err(Error::msg(format!("command '{shown}' failed: {status}")));
        }
        Ok(())
    }
}

/// `program arg1 arg2` with the working directory appended when set.
pub fn display_command(cmd: &Command) -> String {
    let mut out = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        out.push(' ');
        out.push_str(&arg.to_string_lossy());
    }
    if let Some(dir) = cmd.get_current_dir() {
        out.push_str(&format!(" (in {})", dir.display()));
    }
    out
}

#[derive(Default)]
pub struct TaskRegistry {
    exec: BTreeMap<&'static str, TaskExecFn>,
}

impl TaskRegistry {
    pub fn add(&mut self, id: &'static str, f: TaskExecFn) -> Result<()> {
        if self.exec.contains_key(id) {
            return Err(Error::msg(format!("duplicate task executor for '{id}'")));
        }
        self.exec.insert(id, f);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<TaskExecFn> {
        self.exec.get(id).copied()
    }
}

pub trait ModuleExec {
    fn register_tasks(reg: &mut TaskRegistry) -> Result<()>;
}

/// Execute the plan in order, one task at a time. The first failing task stops the run.
pub fn execute_plan(
    doc: &ConfigDoc,
    plan: &Plan,
    reg: &TaskRegistry,
    ctx: &mut ExecCtx,
) -> Result<()> {
    for task in plan.ordered()? {
        let Some(exec) = reg.get(&task.id) else {
            return Err(Error::msg(format!(
                "no executor registered for task '{}'",
                task.id
            )));
        };
        ctx.sink.emit(ExecEvent::TaskStarted {
            id: task.id.clone(),
        });
        ctx.set_task(task.id.clone());
        ctx.skip_reason = None;

        let start = Instant::now();
        let res = exec(doc, ctx);
        let elapsed_ms = start.elapsed().as_millis();
        match res {
            Ok(()) => match ctx.take_skip() {
                Some(reason) => ctx.sink.emit(ExecEvent::TaskSkipped {
                    id: task.id.clone(),
                    reason,
                }),
                None => ctx.sink.emit(ExecEvent::TaskFinished {
                    id: task.id.clone(),
                    ok: true,
                    error: None,
                    elapsed_ms,
                }),
            },
            Err(e) => {
                ctx.sink.emit(ExecEvent::TaskFinished {
                    id: task.id.clone(),
                    ok: false,
                    error: Some(e.to_string()),
                    elapsed_ms,
                });
                let err = Error::msg(format!("task '{}' failed: {e}", task.id));
                ctx.sink.emit(ExecEvent::ExecutorDone {
                    ok: false,
                    error: Some(err.to_string()),
                });
                return Err(err);
            }
        }
    }
    ctx.sink.emit(ExecEvent::ExecutorDone {
        ok: true,
        error: None,
    });
    Ok(())
}

pub fn builtin_registry() -> Result<TaskRegistry> {
    let mut reg = TaskRegistry::default();
    reg.add("core.init", core_init)?;
    reg.add(crate::planner::SOURCE_BARRIER_ID, core_barrier_source)?;
    crate::modules::recipe::RecipeModule::register_tasks(&mut reg)?;
    crate::modules::source::SourceModule::register_tasks(&mut reg)?;
    crate::modules::build::BuildModule::register_tasks(&mut reg)?;
    crate::modules::package::PackageModule::register_tasks(&mut reg)?;
    Ok(reg)
}

fn core_init(doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
    let ws: WorkspaceConfig = doc.deserialize_path("workspace")?.unwrap_or_default();
    ctx.log(&format!("workspace.root_dir = {}", ws.root_dir));
    ctx.log(&format!("workspace.build_dir = {}", ws.build_dir));
    ctx.log(&format!("workspace.out_dir = {}", ws.out_dir));
    ctx.log(&format!("workspace.clean = {}", ws.clean.as_str()));
    if ctx.dry_run {
        return Ok(());
    }

    let paths = crate::workspace::init_dirs(&ws)?;
    ctx.log(&format!("workspace.root = {}", paths.root.display()));
    for (name, path) in &paths.named_dirs {
        ctx.log(&format!("workspace.paths.{} = {}", name, path.display()));
    }
    ctx.set_workspace_paths(paths);
    Ok(())
}

fn core_barrier_source(_doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
    ctx.log("source tree ready");
    Ok(())
}

fn read_output_stream<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    const MAX_PENDING_BYTES: usize = 16 * 1024;
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 8192];
    let mut pending = Vec::with_capacity(1024);

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            if b == b'\n' || b == b'\r' {
                if !pending.is_empty() {
                    let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            } else {
                pending.push(b);
                if pending.len() >= MAX_PENDING_BYTES {
                    let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            }
        }
    }

    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
    }
}

fn append_task_log_line(
    task_logs: &mut BTreeMap<String, VecDeque<String>>,
    task_id: &str,
    line: &str,
) {
    const MAX_LINES: usize = 4000;
    let q = task_logs.entry(task_id.to_string()).or_default();
    while q.len() >= MAX_LINES {
        q.pop_front();
    }
    q.push_back(sanitize_log_line(line));
}

fn write_task_error_log(
    state: &mut StdoutSinkState,
    root: &Path,
    task_id: &str,
    error: &str,
    elapsed_ms: u128,
) -> Result<PathBuf> {
    let dir = match state.error_logs_dir.as_ref() {
        Some(d) => d.clone(),
        None => {
            let dir = root.join(chrono::Local::now().format("%Y%m%d-%H%M%S").to_string());
            fs::create_dir_all(&dir).map_err(|e| {
                Error::msg(format!(
                    "failed to create error logs dir {}: {e}",
                    dir.display()
                ))
            })?;
            state.error_logs_dir = Some(dir.clone());
            dir
        }
    };
    let path = dir.join(format!("{}.log", sanitize_filename_component(task_id)));

    let mut body = format!("task: {task_id}\nstatus: failed\nelapsed_ms: {elapsed_ms}\n");
    if !error.trim().is_empty() {
        body.push_str(&format!("error: {error}\n"));
    }
    body.push_str("\nlogs:\n");
    for line in state.task_logs.get(task_id).into_iter().flatten() {
        body.push_str(line);
        body.push('\n');
    }

    fs::write(&path, body).map_err(|e| {
        Error::msg(format!(
            "failed to write task error log {}: {e}",
            path.display()
        ))
    })?;
    state.error_log_paths.push(path.clone());
    Ok(path)
}

fn sanitize_filename_component(raw: &str) -> String {
    let out: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() { "task".into() } else { out }
}

fn format_elapsed_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
