//! C FFI bindings for tabmerge-core
//!
//! A merge run is started with `tm_merge_start` and polled with
//! `tm_merge_next_event`, which returns each notification as a JSON object
//! with an `"event"` field. Strings handed out must be released with
//! `tm_free_string` and the run with `tm_merge_free`.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;
use tabmerge_core::{HeaderPolicy, MergeHandle, MergeOptions, MergePipeline, MergeRequest};

/// Opaque handle to a running merge
pub struct FfiMergeRun {
    inner: MergeHandle,
}

/// Start a merge on a worker thread
///
/// # Safety
/// - `paths` must be a valid pointer to an array of C strings
/// - `count` must be the correct length of the array
/// - Every entry keeps its position in the merge order; a path that cannot
///   be read is reported as a `file_skipped` event during the run
/// - Returns null if any entry is null, if a path is not valid UTF-8 on a
///   platform without byte paths, or if the worker could not start
#[no_mangle]
pub unsafe extern "C" fn tm_merge_start(
    paths: *const *const c_char,
    count: usize,
    keep_all_first_rows: bool,
) -> *mut FfiMergeRun {
    if paths.is_null() || count == 0 {
        return ptr::null_mut();
    }

    let files: Option<Vec<PathBuf>> = (0..count)
        .map(|i| {
            let ptr = *paths.add(i);
            if ptr.is_null() {
                None
            } else {
                path_from_c(CStr::from_ptr(ptr))
            }
        })
        .collect();
    let Some(files) = files else {
        return ptr::null_mut();
    };

    let policy = HeaderPolicy::from_flags(keep_all_first_rows, !keep_all_first_rows);
    let options = MergeOptions::default().with_header_policy(policy);

    match MergePipeline::spawn(MergeRequest::new(files, options)) {
        Ok(handle) => Box::into_raw(Box::new(FfiMergeRun { inner: handle })),
        Err(_) => ptr::null_mut(),
    }
}

#[cfg(unix)]
fn path_from_c(s: &CStr) -> Option<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(OsStr::from_bytes(s.to_bytes())))
}

#[cfg(not(unix))]
fn path_from_c(s: &CStr) -> Option<PathBuf> {
    s.to_str().ok().map(PathBuf::from)
}

/// Wait up to `timeout_ms` for the next notification
///
/// # Safety
/// - `run` must be a valid pointer returned by `tm_merge_start`
/// - Returns null on timeout or once the run has ended and every event was read
/// - Caller must free the returned string with `tm_free_string`
#[no_mangle]
pub unsafe extern "C" fn tm_merge_next_event(run: *const FfiMergeRun, timeout_ms: u64) -> *mut c_char {
    if run.is_null() {
        return ptr::null_mut();
    }

    (*run)
        .inner
        .events()
        .recv_timeout(Duration::from_millis(timeout_ms))
        .ok()
        .and_then(|event| serde_json::to_string(&event).ok())
        .and_then(|json| CString::new(json).ok())
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

/// Answer a pending header conflict
///
/// # Safety
/// - `run` must be a valid pointer returned by `tm_merge_start`
#[no_mangle]
pub unsafe extern "C" fn tm_merge_resolve_conflict(run: *const FfiMergeRun, proceed: bool) {
    if !run.is_null() {
        (*run).inner.resolve_conflict(proceed);
    }
}

/// Request cancellation; a `cancelled` event follows
///
/// # Safety
/// - `run` must be a valid pointer returned by `tm_merge_start`
#[no_mangle]
pub unsafe extern "C" fn tm_merge_cancel(run: *const FfiMergeRun) {
    if !run.is_null() {
        (*run).inner.cancel();
    }
}

/// Free a run
///
/// A run that is still going is cancelled first. This does not wait for the
/// worker thread to exit.
///
/// # Safety
/// - `run` must be a valid pointer returned by `tm_merge_start` or null
#[no_mangle]
pub unsafe extern "C" fn tm_merge_free(run: *mut FfiMergeRun) {
    if !run.is_null() {
        let run = Box::from_raw(run);
        if !run.inner.is_finished() {
            run.inner.cancel();
        }
        drop(run);
    }
}

/// Free a string returned by other FFI functions
///
/// # Safety
/// - `s` must be a valid pointer returned by a tm_* function or null
#[no_mangle]
pub unsafe extern "C" fn tm_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
