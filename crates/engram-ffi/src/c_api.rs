//! C-compatible API
//!
//! Return values for status-returning functions:
//! - 0 = success
//! - -1 = error (call `engram_last_error` for details)
//!
//! Every engine operation on a handle goes through a `parking_lot::RwLock`:
//! `add` and `load` take it exclusively, `search`, `save` and the getters
//! share it.

use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};

use engram_core::{Engine, EngineError};
use parking_lot::RwLock;

/// Opaque handle to an Engram index
pub struct EngramHandle {
    engine: RwLock<Engine>,
}

// Thread-local last error message
thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = const { std::cell::RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Run `f`, translating engine errors and panics into `-1` plus a message.
fn guarded<F>(name: &str, f: F) -> c_int
where
    F: FnOnce() -> Result<(), EngineError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {
            clear_last_error();
            0
        }
        Ok(Err(e)) => {
            set_last_error(&e.to_string());
            -1
        }
        Err(_) => {
            set_last_error(&format!("Panic in {name}"));
            -1
        }
    }
}

unsafe fn handle_ref<'a>(handle: *const EngramHandle) -> Result<&'a EngramHandle, EngineError> {
    if handle.is_null() {
        return Err(EngineError::InvalidArgument("handle is null".to_string()));
    }
    Ok(unsafe { &*handle })
}

unsafe fn path_arg<'a>(path: *const c_char) -> Result<&'a str, EngineError> {
    if path.is_null() {
        return Err(EngineError::InvalidArgument("path is null".to_string()));
    }
    unsafe { CStr::from_ptr(path) }
        .to_str()
        .map_err(|e| EngineError::InvalidArgument(format!("invalid UTF-8 path: {e}")))
}

unsafe fn float_slice<'a>(ptr: *const f32, len: usize) -> Result<&'a [f32], EngineError> {
    if ptr.is_null() {
        if len == 0 {
            return Ok(&[]);
        }
        return Err(EngineError::InvalidArgument("vector pointer is null".to_string()));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Create an empty index for vectors of `dimension` floats.
///
/// Returns a handle on success, NULL on error.
/// The caller must call `engram_index_free` when done.
#[no_mangle]
pub extern "C" fn engram_index_new(dimension: usize) -> *mut EngramHandle {
    catch_unwind(|| match Engine::new(dimension) {
        Ok(engine) => {
            clear_last_error();
            Box::into_raw(Box::new(EngramHandle {
                engine: RwLock::new(engine),
            }))
        }
        Err(e) => {
            set_last_error(&e.to_string());
            std::ptr::null_mut()
        }
    })
    .unwrap_or_else(|_| {
        set_last_error("Panic in engram_index_new");
        std::ptr::null_mut()
    })
}

/// Free an index handle
///
/// # Safety
/// `handle` must be a pointer returned by `engram_index_new` that has not
/// been freed yet, or NULL (in which case this is a no-op).
#[no_mangle]
pub unsafe extern "C" fn engram_index_free(handle: *mut EngramHandle) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if !handle.is_null() {
            unsafe {
                drop(Box::from_raw(handle));
            }
        }
    }));
}

/// Append a vector. On success its id is written to `out_id` (if non-NULL).
///
/// # Safety
/// `handle` must be a live handle; `vector` must point to `len` floats;
/// `out_id` must be NULL or writable.
#[no_mangle]
pub unsafe extern "C" fn engram_index_add(
    handle: *mut EngramHandle,
    vector: *const f32,
    len: usize,
    out_id: *mut u64,
) -> c_int {
    guarded("engram_index_add", || {
        let handle = unsafe { handle_ref(handle) }?;
        let vector = unsafe { float_slice(vector, len) }?;
        let id = handle.engine.write().insert(vector)?;
        if !out_id.is_null() {
            unsafe { *out_id = id };
        }
        Ok(())
    })
}

/// Search for the `k` nearest vectors.
///
/// Writes up to `k` results into `out_ids` / `out_distances` (each must have
/// room for `k` entries), closest first, and returns the number written, or
/// -1 on error. `k` must be positive.
///
/// # Safety
/// `handle` must be a live handle; `query` must point to `len` floats;
/// both output buffers must be writable for `k` elements.
#[no_mangle]
pub unsafe extern "C" fn engram_index_search(
    handle: *const EngramHandle,
    query: *const f32,
    len: usize,
    k: c_int,
    out_ids: *mut u64,
    out_distances: *mut f32,
) -> c_int {
    let mut written: c_int = 0;
    let status = guarded("engram_index_search", || {
        if k <= 0 {
            return Err(EngineError::InvalidArgument(format!(
                "k must be a positive integer, got {k}"
            )));
        }
        if out_ids.is_null() || out_distances.is_null() {
            return Err(EngineError::InvalidArgument(
                "output buffers must not be null".to_string(),
            ));
        }
        let handle = unsafe { handle_ref(handle) }?;
        let query = unsafe { float_slice(query, len) }?;

        let hits = handle.engine.read().search(query, k as usize)?;
        for (i, hit) in hits.iter().enumerate() {
            unsafe {
                *out_ids.add(i) = hit.id;
                *out_distances.add(i) = hit.distance;
            }
        }
        // hits.len() <= k, which came from a c_int.
        written = hits.len() as c_int;
        Ok(())
    });
    if status == 0 {
        written
    } else {
        status
    }
}

/// Number of stored vectors, or 0 for a NULL handle.
///
/// # Safety
/// `handle` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn engram_index_count(handle: *const EngramHandle) -> usize {
    match unsafe { handle_ref(handle) } {
        Ok(handle) => handle.engine.read().count(),
        Err(_) => 0,
    }
}

/// Dimension the index was created with, or 0 for a NULL handle.
///
/// # Safety
/// `handle` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn engram_index_dimension(handle: *const EngramHandle) -> usize {
    match unsafe { handle_ref(handle) } {
        Ok(handle) => handle.engine.read().dimension(),
        Err(_) => 0,
    }
}

/// Save the index to `path`.
///
/// # Safety
/// `handle` must be a live handle; `path` a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn engram_index_save(
    handle: *const EngramHandle,
    path: *const c_char,
) -> c_int {
    guarded("engram_index_save", || {
        let handle = unsafe { handle_ref(handle) }?;
        let path = unsafe { path_arg(path) }?;
        handle.engine.read().save(path)
    })
}

/// Replace the index contents with the file at `path`.
///
/// # Safety
/// `handle` must be a live handle; `path` a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn engram_index_load(
    handle: *mut EngramHandle,
    path: *const c_char,
) -> c_int {
    guarded("engram_index_load", || {
        let handle = unsafe { handle_ref(handle) }?;
        let path = unsafe { path_arg(path) }?;
        handle.engine.write().load(path)
    })
}

/// Get the last error message
///
/// Returns a pointer to a null-terminated C string, or NULL if the last call
/// on this thread succeeded. The string is valid until the next API call from
/// the same thread and must not be freed by the caller.
#[no_mangle]
pub extern "C" fn engram_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(std::ptr::null())
    })
}
