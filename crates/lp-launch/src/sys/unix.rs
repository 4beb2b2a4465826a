// SPDX-License-Identifier: MIT OR Apache-2.0
//! POSIX launch protocol: fork, then dup2/chdir/execve in the child.
//!
//! Everything the child touches is built before `fork`. Between `fork` and
//! `execve` the child runs only async-signal-safe libc calls, and reports a
//! failure as `[errno: i32 BE][stage: 4 bytes]` on a close-on-exec pipe
//! before `_exit(127)`. End of file on that pipe means `execve` succeeded.
#![allow(unsafe_code)]

use crate::child::ChildHandle;
use crate::executor::LaunchRequest;
use crate::outcome::ExitOutcome;
use lp_cmdline::PosixArgv;
use lp_env::PosixEnvBlock;
use lp_error::{ErrorCode, LaunchError};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, pipe2};
use std::ffi::{CStr, CString, c_char, c_int};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

pub(crate) const NULL_DEVICE: &str = "/dev/null";

const STAGE_REDIRECT: [u8; 4] = *b"RDIR";
const STAGE_CHDIR: [u8; 4] = *b"CHDR";
const STAGE_EXEC: [u8; 4] = *b"EXEC";

const MAX_BACKOFF: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Pipes
// ---------------------------------------------------------------------------

pub(crate) fn pipe() -> io::Result<(File, File)> {
    let (r, w) = pipe2(OFlag::O_CLOEXEC)?;
    Ok((File::from(r), File::from(w)))
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

// Borrowed, pre-built view of everything the child needs.
struct ChildPlan<'a> {
    program: &'a CStr,
    argv: *const *const c_char,
    envp: *const *const c_char,
    cwd: Option<&'a CStr>,
    stdio: [c_int; 3],
    report: c_int,
}

pub(crate) fn spawn(request: LaunchRequest) -> Result<ChildHandle, LaunchError> {
    let LaunchRequest {
        program,
        command,
        environment,
        working_dir,
        stdin,
        stdout,
        stderr,
    } = request;

    let argv = PosixArgv::build(&command)?;
    // No environment initializer: pass the parent's environ through as is.
    let envp = match environment {
        Some(env) => PosixEnvBlock::encode(&env)?,
        None => PosixEnvBlock::inherit(),
    };
    let program_c = path_to_cstring(&program)?;
    let cwd_c = working_dir.as_deref().map(path_to_cstring).transpose()?;

    let stdio = [&stdin, &stdout, &stderr].map(|ep| ep.child.as_ref().map_or(-1, |f| f.as_raw_fd()));
    let (report_r, report_w) = pipe2(OFlag::O_CLOEXEC).map_err(|e| {
        LaunchError::from_io(
            ErrorCode::SystemPipeFailed,
            "cannot create exec report pipe",
            e.into(),
        )
    })?;

    let plan = ChildPlan {
        program: &program_c,
        argv: argv.as_ptr(),
        envp: envp.as_ptr(),
        cwd: cwd_c.as_deref(),
        stdio,
        report: report_w.as_raw_fd(),
    };

    debug!(
        target: "lp.launch",
        program = %program.display(),
        args = command.arguments().len(),
        vars = envp.len(),
        "forking"
    );
    // SAFETY: the child branch only calls async-signal-safe functions on
    // data prepared above and never returns.
    let pid = match unsafe { fork() } {
        Err(errno) => {
            return Err(LaunchError::from_io(
                ErrorCode::LaunchForkFailed,
                "fork failed",
                errno.into(),
            ));
        }
        Ok(ForkResult::Child) => unsafe { exec_child(&plan) },
        Ok(ForkResult::Parent { child }) => child,
    };

    // Parent: close our copy of the write end and every child-side stream,
    // otherwise EOF never arrives on either.
    drop(report_w);
    drop((stdin.child, stdout.child, stderr.child));

    let mut report = File::from(report_r);
    match read_report(&mut report) {
        Ok(None) => {
            debug!(target: "lp.launch", pid = pid.as_raw(), "exec succeeded");
            Ok(ChildHandle::new(
                Process::new(pid),
                stdin.parent,
                stdout.parent,
                stderr.parent,
            ))
        }
        Ok(Some(buf)) => {
            reap(pid);
            Err(decode_report(buf)
                .with_context("program", program.display().to_string())
                .with_context("pid", pid.as_raw()))
        }
        Err(e) => {
            let _ = signal::kill(pid, Signal::SIGKILL);
            reap(pid);
            Err(LaunchError::from_io(
                ErrorCode::SystemIo,
                "cannot read exec report",
                e,
            ))
        }
    }
}

/// Child side of the protocol.
///
/// # Safety
///
/// Must only be called in a freshly forked child.
unsafe fn exec_child(plan: &ChildPlan<'_>) -> ! {
    let mut report = plan.report;
    let mut stdio = plan.stdio;

    unsafe {
        // Sources sitting on 0..=2 would be clobbered by an earlier dup2.
        if report <= 2 {
            report = libc::fcntl(report, libc::F_DUPFD_CLOEXEC, 3);
            if report < 0 {
                libc::_exit(127);
            }
        }
        for fd in stdio.iter_mut() {
            if (0..=2).contains(fd) {
                *fd = libc::fcntl(*fd, libc::F_DUPFD_CLOEXEC, 3);
                if *fd < 0 {
                    child_fail(report, STAGE_REDIRECT);
                }
            }
        }
        for (target, &fd) in stdio.iter().enumerate() {
            if fd >= 0 && libc::dup2(fd, target as c_int) < 0 {
                child_fail(report, STAGE_REDIRECT);
            }
        }

        if let Some(dir) = plan.cwd {
            if libc::chdir(dir.as_ptr()) < 0 {
                child_fail(report, STAGE_CHDIR);
            }
        }

        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        libc::execve(plan.program.as_ptr(), plan.argv, plan.envp);
        child_fail(report, STAGE_EXEC)
    }
}

unsafe fn child_fail(report: c_int, stage: [u8; 4]) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&errno.to_be_bytes());
    buf[4..].copy_from_slice(&stage);
    unsafe {
        libc::write(report, buf.as_ptr().cast(), buf.len());
        libc::_exit(127)
    }
}

fn read_report(file: &mut File) -> io::Result<Option<[u8; 8]>> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    match filled {
        0 => Ok(None),
        8 => Ok(Some(buf)),
        n => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated exec report ({n} bytes)"),
        )),
    }
}

fn decode_report(buf: [u8; 8]) -> LaunchError {
    let errno = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let (code, message) = match [buf[4], buf[5], buf[6], buf[7]] {
        STAGE_CHDIR => (
            ErrorCode::LaunchChdirFailed,
            "child could not change to working directory",
        ),
        STAGE_REDIRECT => (
            ErrorCode::LaunchRedirectFailed,
            "child could not install stream redirection",
        ),
        STAGE_EXEC => (ErrorCode::LaunchExecFailed, "exec failed in child"),
        _ => (ErrorCode::Internal, "malformed exec report"),
    };
    LaunchError::from_io(code, message, io::Error::from_raw_os_error(errno))
}

fn reap(pid: Pid) {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            _ => return,
        }
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, LaunchError> {
    CString::new(path.as_os_str().as_bytes()).map_err(|e| {
        LaunchError::new(
            ErrorCode::ValidationInvalidArgument,
            "path contains a NUL character",
        )
        .with_source(e)
    })
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Process {
    pid: Pid,
}

impl Process {
    fn new(pid: Pid) -> Self {
        Self { pid }
    }

    pub(crate) fn id(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    pub(crate) fn wait(&mut self) -> io::Result<ExitOutcome> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(outcome) = translate(status) {
                        return Ok(outcome);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => return Ok(translate(status)),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(crate) fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitOutcome>> {
        let deadline = Instant::now() + timeout;
        let mut delay = Duration::from_millis(1);
        loop {
            if let Some(outcome) = self.try_wait()? {
                return Ok(Some(outcome));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(delay.min(deadline - now));
            delay = (delay * 2).min(MAX_BACKOFF);
        }
    }

    pub(crate) fn kill(&mut self) -> io::Result<()> {
        signal::kill(self.pid, Signal::SIGKILL)?;
        Ok(())
    }
}

fn translate(status: WaitStatus) -> Option<ExitOutcome> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitOutcome::Exited { code }),
        WaitStatus::Signaled(_, sig, _) => Some(ExitOutcome::Signaled { signal: sig as i32 }),
        _ => None,
    }
}
