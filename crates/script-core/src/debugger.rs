//! Interactive line debugger.
//!
//! Grounded on `debug_lua.c`'s `ldbState` and the `ldb*` function family.
//! The debugger is process-singleton state gated behind a single owned
//! value (spec §9: "gate it behind a single owned value accessed only from
//! the main thread") rather than scattered globals; sessions either fork a
//! child (UNIX) to keep the parent responsive, or run synchronously when
//! the caller requests `SCRIPT DEBUG SYNC` or the platform has no `fork`.

use std::sync::Mutex;

use crate::resp::resp_to_human;
use crate::value::{render_value, Value};

/// Marker substring a call-stack frame's label must contain to be shown by
/// the `trace` command, mirroring `debug_lua.c`'s filter on `"user_script"`.
pub const TRACE_FRAME_MARKER: &str = "user_script";

/// Default truncation length for a single log line, `ldbState.maxlen`'s
/// default.
pub const DEFAULT_MAXLEN: usize = 256;
/// The lowest non-zero `maxlen` value accepted; smaller values clamp up to
/// this, matching `ldbMaxlen`'s `newval <= 60` clamp.
pub const MIN_MAXLEN: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Forked,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Started,
    /// The parent aborted the command after a fork (spec §9: the parent's
    /// own copy of the script is never run when forked).
    Abort,
}

/// Host identifier for a forked debugger child. A thin newtype so the rest
/// of the module stays portable; only the `#[cfg(unix)]` impl actually
/// forks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildId(pub i32);

struct Breakpoints {
    lines: Vec<u32>,
    capacity: usize,
}

impl Breakpoints {
    fn new(capacity: usize) -> Self {
        Breakpoints { lines: Vec::new(), capacity }
    }

    fn contains(&self, line: u32) -> bool {
        self.lines.contains(&line)
    }

    fn add(&mut self, line: u32) -> Result<(), String> {
        if self.lines.contains(&line) {
            return Ok(());
        }
        if self.lines.len() >= self.capacity {
            return Err("Too many breakpoints set.".to_string());
        }
        self.lines.push(line);
        Ok(())
    }

    /// Removes `line` from the set. The original C implementation
    /// (`ldbDelBreakpoint`) shifts the tail down with a `memmove` that
    /// miscounts bytes vs. `int` elements — a real bug. This resolves the
    /// spec's open question by NOT reproducing it: a plain element-wise
    /// `Vec::remove` is unambiguously correct and is used here instead.
    fn remove(&mut self, line: u32) -> Result<(), String> {
        match self.lines.iter().position(|&l| l == line) {
            Some(idx) => {
                self.lines.remove(idx);
                Ok(())
            }
            None => Err("No breakpoint in the specified line.".to_string()),
        }
    }

    fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Everything the debugger needs to know about the script being debugged
/// and its session, gathered into one value per spec §9's design note.
pub struct DebugSession {
    active: bool,
    mode: Option<SessionMode>,
    logs: Vec<String>,
    children: Vec<ChildId>,
    breakpoints: Breakpoints,
    step: bool,
    /// Transient "break on the very next line" flag, set by an in-script
    /// `breakpoint()` call (`ldb.luabp` in the original).
    break_next_line: bool,
    source_lines: Vec<String>,
    current_line: u32,
    maxlen: usize,
    maxlen_hint_sent: bool,
    /// Set by `[a]bort`; the caller must raise an error in the backend and
    /// terminate the program once it observes this flag.
    abort_requested: bool,
}

impl DebugSession {
    pub fn new(breakpoint_capacity: usize) -> Self {
        DebugSession {
            active: false,
            mode: None,
            logs: Vec::new(),
            children: Vec::new(),
            breakpoints: Breakpoints::new(breakpoint_capacity),
            step: false,
            break_next_line: false,
            source_lines: Vec::new(),
            current_line: 0,
            maxlen: DEFAULT_MAXLEN,
            maxlen_hint_sent: false,
            abort_requested: false,
        }
    }

    /// Starts a session against `source`, splitting it into 1-based lines
    /// (trailing `\r`/`\n` stripped), per `ldbStartSession`.
    pub fn start(&mut self, source: &str, mode: SessionMode) -> SessionOutcome {
        self.active = true;
        self.mode = Some(mode);
        self.source_lines = source.lines().map(|l| l.trim_end_matches('\r').to_string()).collect();
        self.current_line = 0;
        tracing::info!(?mode, "debugger session started");
        SessionOutcome::Started
    }

    /// Ends the session, per `ldbEndSession`: emits the end marker and
    /// flushes pending logs.
    pub fn end(&mut self) -> Vec<String> {
        self.active = false;
        self.logs.push("<endsession>".to_string());
        self.source_lines.clear();
        std::mem::take(&mut self.logs)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    pub fn set_current_line(&mut self, line: u32) {
        self.current_line = line;
    }

    pub fn is_step_enabled(&self) -> bool {
        self.step
    }

    pub fn set_step_mode(&mut self, enabled: bool) {
        self.step = enabled;
    }

    /// Arms a one-shot break on the next executed line, the effect of an
    /// in-script `breakpoint()` call.
    pub fn set_breakpoint_on_next_line(&mut self) {
        self.break_next_line = true;
    }

    pub fn is_breakpoint_on_next_line_enabled(&self) -> bool {
        self.break_next_line
    }

    /// The per-line hook: should execution stop at `line`?
    pub fn should_break(&mut self, line: u32) -> bool {
        if self.break_next_line {
            self.break_next_line = false;
            return true;
        }
        self.step || self.breakpoints.contains(line)
    }

    /// Looks up one source line (1-based), per `ldbGetSourceLine`.
    pub fn source_line(&self, line: u32) -> String {
        if line == 0 || line as usize > self.source_lines.len() {
            return "<out of range source code line>".to_string();
        }
        self.source_lines[line as usize - 1].clone()
    }

    pub fn source_len(&self) -> usize {
        self.source_lines.len()
    }

    fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Appends a log line, truncating at `maxlen` bytes and emitting the
    /// one-time hint, per `ldbLogWithMaxLen`.
    fn log_truncated(&mut self, line: &str) {
        if self.maxlen > 0 && line.len() > self.maxlen {
            let mut truncated = line.as_bytes()[..self.maxlen].to_vec();
            truncated.extend_from_slice(b" ...");
            self.logs.push(String::from_utf8_lossy(&truncated).into_owned());
            if !self.maxlen_hint_sent {
                self.maxlen_hint_sent = true;
                self.logs.push(format!(
                    "<hint> The above reply was trimmed. Use 'maxlen 0' to disable trimming."
                ));
            }
        } else {
            self.logs.push(line.to_string());
        }
    }

    /// Logs a RESP reply rendered into human-readable form, prefixed
    /// `<reply> `, matching `ldbLogRespReply`.
    pub fn log_resp_reply(&mut self, resp: &[u8]) {
        match resp_to_human(resp) {
            Ok((rendered, _rest)) => {
                let line = format!("<reply> {rendered}");
                self.log_truncated(&line);
            }
            Err(_) => self.log("<reply> (error) unparseable reply"),
        }
    }

    pub fn drain_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.logs)
    }

    // ── REPL command handlers ──────────────────────────────────────────

    pub fn cmd_list(&mut self) {
        let around = self.current_line;
        let start = around.saturating_sub(3).max(1);
        let end = (around + 3).min(self.source_lines.len() as u32);
        for line in start..=end.max(start) {
            let marker = if line == around { "->" } else { "  " };
            self.log(format!("{marker} {line}\t{}", self.source_line(line)));
        }
    }

    pub fn cmd_whole(&mut self) {
        for line in 1..=self.source_lines.len() as u32 {
            let marker = if line == self.current_line { "->" } else { "  " };
            self.log(format!("{marker} {line}\t{}", self.source_line(line)));
        }
    }

    /// `break` with no argument lists current breakpoints.
    pub fn cmd_break_list(&mut self) {
        if self.breakpoints.lines.is_empty() {
            self.log("No breakpoints set.");
        } else {
            let mut lines = self.breakpoints.lines.clone();
            lines.sort_unstable();
            for line in lines {
                self.log(format!("#{}", line));
            }
        }
    }

    /// `break <n>`: `0` clears all, positive adds, negative removes.
    pub fn cmd_break(&mut self, arg: &str) {
        let n: i64 = match arg.parse() {
            Ok(n) => n,
            Err(_) => {
                self.log(format!("Invalid argument:'{arg}'"));
                return;
            }
        };
        if n == 0 {
            self.breakpoints.clear();
            self.log("All breakpoints removed.");
        } else if n > 0 {
            if n as u32 as i64 != n || n as u32 > self.source_lines.len() as u32 {
                self.log("Wrong line number.");
                return;
            }
            match self.breakpoints.add(n as u32) {
                Ok(()) => self.log(format!("Breakpoint set at line {n}.")),
                Err(message) => self.log(message),
            }
        } else {
            let line = (-n) as u32;
            match self.breakpoints.remove(line) {
                Ok(()) => self.log("Breakpoint removed."),
                Err(message) => self.log(message),
            }
        }
    }

    /// `print <name>`: renders a provided variable value, or the
    /// "no such variable" message if the lookup fails.
    pub fn cmd_print(&mut self, lookup: Option<Value>) {
        match lookup {
            Some(value) => self.log(render_value(&value)),
            None => self.log("No such variable."),
        }
    }

    /// `print` with no argument: dumps all provided locals, or the
    /// "no locals" message if the list is empty.
    pub fn cmd_print_all(&mut self, locals: &[(String, Value)]) {
        if locals.is_empty() {
            self.log("No local variables in the current context.");
            return;
        }
        for (name, value) in locals {
            self.log(format!("{name} = {}", render_value(value)));
        }
    }

    /// `trace`: logs only frames whose label contains [`TRACE_FRAME_MARKER`].
    pub fn cmd_trace(&mut self, frames: &[String]) {
        let user_frames: Vec<&String> = frames.iter().filter(|f| f.contains(TRACE_FRAME_MARKER)).collect();
        if user_frames.is_empty() {
            self.log("<error> Can't retrieve stack.");
            return;
        }
        for frame in user_frames {
            self.log(frame.clone());
        }
    }

    /// `maxlen [n]`: reports or updates the truncation length. `0` disables
    /// truncation; `1..=59` clamps up to [`MIN_MAXLEN`].
    pub fn cmd_maxlen(&mut self, arg: Option<&str>) {
        if let Some(arg) = arg {
            match arg.parse::<usize>() {
                Ok(0) => self.maxlen = 0,
                Ok(n) if n <= MIN_MAXLEN => self.maxlen = MIN_MAXLEN,
                Ok(n) => self.maxlen = n,
                Err(_) => {
                    self.log(format!("Invalid argument:'{arg}'"));
                    return;
                }
            }
        }
        if self.maxlen == 0 {
            self.log("<value> replies are unlimited.");
        } else {
            self.log(format!("<value> replies are truncated at {} bytes.", self.maxlen));
        }
    }

    /// `eval <code>`: compiles and runs `code` directly in the engine's
    /// context, first as `return <code>` (an expression), falling back to
    /// running `code` itself as a bare statement if that attempt fails, then
    /// logs the rendered result. `compile_and_run` is supplied by the caller
    /// (the engine that owns the running program) so this module stays
    /// engine-agnostic, matching the `cmd_print`/`cmd_trace` pattern above.
    pub fn cmd_eval(&mut self, code: &str, mut compile_and_run: impl FnMut(&str) -> Result<Value, String>) {
        let as_expression = format!("return {code}");
        let outcome = compile_and_run(&as_expression).or_else(|_| compile_and_run(code));
        match outcome {
            Ok(value) => self.log(render_value(&value)),
            Err(message) => self.log(format!("<error> {message}")),
        }
    }

    /// `abort`: requests that the backend raise an error and terminate the
    /// running program, per `ldbRepl`'s `abort` case.
    pub fn cmd_abort(&mut self) {
        self.abort_requested = true;
        self.log("<endsession>");
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort_requested
    }

    /// `valkey`/`redis`/`<api> <cmd> <args...>`: issues a host command via
    /// the backend's command-call binding. The reply is logged only in step
    /// mode, per `ldbRedis`.
    pub fn cmd_host_command(&mut self, args: &[String], dispatch: impl FnOnce(&[String]) -> Vec<u8>) {
        let reply = dispatch(args);
        if self.step {
            self.log_resp_reply(&reply);
        }
    }

    pub const fn help_text() -> &'static str {
        "Redis Lua debugger help:\n\
[h]elp               Show this help.\n\
[s]tep                Run current line and stop again.\n\
[n]ext                Alias for step.\n\
[c]continue           Run till next breakpoint.\n\
[l]ist                List source code around current line.\n\
[w]hole               List all source code.\n\
[p]rint <var>         Show value of the specified variable.\n\
[b]reak               Show currently set breakpoints.\n\
[b]reak <line>        Add a breakpoint to the specified line.\n\
[b]reak -<line>       Remove breakpoint from the specified line.\n\
[b]reak 0             Remove all breakpoints.\n\
[t]race               Show a backtrace.\n\
[e]eval <code>        Execute some code directly in the engine context.\n\
[r]edis <cmd>         Execute a server command.\n\
[m]axlen <len>        Trim logged replies longer than <len>. 0 means no limit.\n\
[a]abort              Stop the execution of the script. In sync mode dataset changes will be retained.\n\n\
Debugger functions you can call from Lua scripts:\n\
redis.debug()         Produce logs for the specified arguments.\n\
redis.breakpoint()    Stop execution as if there was a breakpoint in the\n\
                      next line of code.\n"
    }
}

/// Thread-safe wrapper exposing the single process-global debugger state.
pub struct DebugSingleton {
    inner: Mutex<DebugSession>,
}

impl DebugSingleton {
    pub fn new(breakpoint_capacity: usize) -> Self {
        DebugSingleton { inner: Mutex::new(DebugSession::new(breakpoint_capacity)) }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut DebugSession) -> R) -> R {
        let mut guard = self.inner.lock().expect("debugger mutex poisoned");
        f(&mut guard)
    }
}

#[cfg(unix)]
pub mod forked {
    use super::ChildId;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::{fork, ForkResult, Pid};

    /// Forks a debugger child, per `ldbStartSession`. Returns `Some(child)`
    /// in the parent, `None` in the child (the caller runs the debugger
    /// REPL loop in the child, then `exit`s).
    ///
    /// # Safety
    /// Must only be called from the single-threaded request-dispatch
    /// thread; forking a multithreaded process is otherwise unsound.
    pub unsafe fn fork_session() -> std::io::Result<Option<ChildId>> {
        match fork() {
            Ok(ForkResult::Parent { child }) => Ok(Some(ChildId(child.as_raw()))),
            Ok(ForkResult::Child) => Ok(None),
            Err(e) => Err(std::io::Error::from_raw_os_error(e as i32)),
        }
    }

    /// SIGKILLs every still-pending forked debugger child, per
    /// `ldbKillForkedSessions`.
    pub fn kill_all(children: &[ChildId]) {
        for child in children {
            let _ = kill(Pid::from_raw(child.0), Signal::SIGKILL);
        }
    }
}
