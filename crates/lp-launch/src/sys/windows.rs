// SPDX-License-Identifier: MIT OR Apache-2.0
//! Windows launch protocol: a single `CreateProcessW` call.
//!
//! Child-side handles are created non-inheritable and only flagged
//! inheritable while `LAUNCH_LOCK` is held, so a concurrent launch on
//! another thread cannot leak them into its child.
#![allow(unsafe_code)]

use crate::child::ChildHandle;
use crate::executor::LaunchRequest;
use crate::outcome::ExitOutcome;
use lp_env::WindowsEnvBlock;
use lp_error::{ErrorCode, LaunchError};
use std::ffi::{OsStr, c_void};
use std::fs::File;
use std::io;
use std::iter;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::ptr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use windows_sys::Win32::Foundation::{
    CloseHandle, HANDLE, HANDLE_FLAG_INHERIT, SetHandleInformation, WAIT_FAILED, WAIT_OBJECT_0,
    WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Console::{
    GetStdHandle, STD_ERROR_HANDLE, STD_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use windows_sys::Win32::System::Pipes::CreatePipe;
use windows_sys::Win32::System::Threading::{
    CREATE_UNICODE_ENVIRONMENT, CreateProcessW, GetExitCodeProcess, INFINITE,
    PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW, TerminateProcess,
    WaitForSingleObject,
};

pub(crate) const NULL_DEVICE: &str = "NUL";

static LAUNCH_LOCK: Mutex<()> = Mutex::new(());

fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(iter::once(0)).collect()
}

// ---------------------------------------------------------------------------
// Pipes
// ---------------------------------------------------------------------------

pub(crate) fn pipe() -> io::Result<(File, File)> {
    let mut read: HANDLE = ptr::null_mut();
    let mut write: HANDLE = ptr::null_mut();
    // SAFETY: out-pointers are valid; null attributes give non-inheritable
    // handles.
    let ok = unsafe { CreatePipe(&mut read, &mut write, ptr::null(), 0) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both handles are freshly created and owned by nobody else.
    unsafe {
        Ok((
            File::from_raw_handle(read as RawHandle),
            File::from_raw_handle(write as RawHandle),
        ))
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

fn std_handle(endpoint: Option<&File>, which: STD_HANDLE) -> HANDLE {
    match endpoint {
        Some(f) => f.as_raw_handle() as HANDLE,
        // SAFETY: no preconditions.
        None => unsafe { GetStdHandle(which) },
    }
}

fn set_inheritable(file: &File, inherit: bool) -> io::Result<()> {
    let flags = if inherit { HANDLE_FLAG_INHERIT } else { 0 };
    // SAFETY: the handle is owned by `file` and open.
    let ok = unsafe { SetHandleInformation(file.as_raw_handle() as HANDLE, HANDLE_FLAG_INHERIT, flags) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
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

    let mut cmdline: Vec<u16> = wide(OsStr::new(&command.to_windows_command_line()?));
    let app = wide(program.as_os_str());
    let env_block = environment.as_ref().map(WindowsEnvBlock::encode).transpose()?;
    let cwd = working_dir.as_deref().map(|d| wide(d.as_os_str()));

    let children = [stdin.child, stdout.child, stderr.child];

    let mut si: STARTUPINFOW = unsafe { mem::zeroed() };
    si.cb = mem::size_of::<STARTUPINFOW>() as u32;
    si.dwFlags = STARTF_USESTDHANDLES;
    si.hStdInput = std_handle(children[0].as_ref(), STD_INPUT_HANDLE);
    si.hStdOutput = std_handle(children[1].as_ref(), STD_OUTPUT_HANDLE);
    si.hStdError = std_handle(children[2].as_ref(), STD_ERROR_HANDLE);
    let mut pi: PROCESS_INFORMATION = unsafe { mem::zeroed() };

    debug!(
        target: "lp.launch",
        program = %program.display(),
        args = command.arguments().len(),
        custom_env = env_block.is_some(),
        "CreateProcessW"
    );

    let created = {
        let _guard = LAUNCH_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut result = Ok(());
        for file in children.iter().flatten() {
            if let Err(e) = set_inheritable(file, true) {
                result = Err(LaunchError::from_io(
                    ErrorCode::LaunchRedirectFailed,
                    "cannot make redirect handle inheritable",
                    e,
                ));
                break;
            }
        }
        if result.is_ok() {
            // SAFETY: every pointer refers to a NUL-terminated buffer that
            // outlives the call; `cmdline` is mutable as required.
            let ok = unsafe {
                CreateProcessW(
                    app.as_ptr(),
                    cmdline.as_mut_ptr(),
                    ptr::null(),
                    ptr::null(),
                    1,
                    CREATE_UNICODE_ENVIRONMENT,
                    env_block
                        .as_ref()
                        .map_or(ptr::null(), |b| b.as_ptr() as *const c_void),
                    cwd.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                    &si,
                    &mut pi,
                )
            };
            if ok == 0 {
                result = Err(LaunchError::from_io(
                    ErrorCode::LaunchCreateProcessFailed,
                    "CreateProcessW failed",
                    io::Error::last_os_error(),
                )
                .with_context("program", program.display().to_string()));
            }
        }
        // Child-side handles close before another launch can flag its own.
        drop(children);
        result
    };
    created?;

    // SAFETY: the thread handle is ours and unused.
    unsafe {
        CloseHandle(pi.hThread);
    }
    // SAFETY: the process handle is ours and owned from here on.
    let handle = unsafe { OwnedHandle::from_raw_handle(pi.hProcess as RawHandle) };
    debug!(target: "lp.launch", pid = pi.dwProcessId, "process created");

    Ok(ChildHandle::new(
        Process {
            handle,
            pid: pi.dwProcessId,
        },
        stdin.parent,
        stdout.parent,
        stderr.parent,
    ))
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Process {
    handle: OwnedHandle,
    pid: u32,
}

impl Process {
    pub(crate) fn id(&self) -> u32 {
        self.pid
    }

    fn raw(&self) -> HANDLE {
        self.handle.as_raw_handle() as HANDLE
    }

    fn exit_code(&self) -> io::Result<ExitOutcome> {
        let mut code = 0u32;
        // SAFETY: valid handle and out-pointer.
        if unsafe { GetExitCodeProcess(self.raw(), &mut code) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ExitOutcome::Exited { code: code as i32 })
    }

    fn wait_ms(&mut self, ms: u32) -> io::Result<Option<ExitOutcome>> {
        // SAFETY: valid handle.
        match unsafe { WaitForSingleObject(self.raw(), ms) } {
            WAIT_OBJECT_0 => self.exit_code().map(Some),
            WAIT_TIMEOUT => Ok(None),
            WAIT_FAILED => Err(io::Error::last_os_error()),
            other => Err(io::Error::other(format!("unexpected wait result {other}"))),
        }
    }

    pub(crate) fn wait(&mut self) -> io::Result<ExitOutcome> {
        loop {
            if let Some(outcome) = self.wait_ms(INFINITE)? {
                return Ok(outcome);
            }
        }
    }

    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        self.wait_ms(0)
    }

    pub(crate) fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitOutcome>> {
        let ms = timeout.as_millis().min(u128::from(INFINITE - 1)) as u32;
        self.wait_ms(ms)
    }

    pub(crate) fn kill(&mut self) -> io::Result<()> {
        // SAFETY: valid handle.
        if unsafe { TerminateProcess(self.raw(), 1) } != 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        // Terminating a process that already exited fails with access denied.
        if self.try_wait()?.is_some() {
            return Ok(());
        }
        Err(err)
    }
}
