//! FFI bindings for Stompkick
//!
//! This module provides C-compatible functions for driving a detector from a
//! host application (Unity, Swift, Kotlin). JSON crosses the boundary as
//! null-terminated strings; every string returned here is allocated by Rust and
//! must be released with `stompkick_free_string`.
//!
//! A detector pointer may be shared between the host's sensor thread and its
//! UI thread: all calls go through a [`DetectorHandle`].

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use crate::adapters::{BridgeJsonAdapter, Im600PacketAdapter, SampleAdapter};
use crate::config::Thresholds;
use crate::control::{Command, CommandDispatcher};
use crate::detector::MotionDetector;
use crate::error::EngineError;
use crate::handle::DetectorHandle;
use crate::types::{MotionEvent, Sample};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Opaque detector handed to the host
pub struct StompkickDetector {
    handle: DetectorHandle,
    dispatcher: CommandDispatcher,
}

impl StompkickDetector {
    fn new(thresholds: Thresholds) -> Self {
        let handle = DetectorHandle::new(MotionDetector::with_thresholds(thresholds));
        Self {
            dispatcher: CommandDispatcher::new(handle.clone()),
            handle,
        }
    }

    /// Feed a sample and encode the outcome for the host
    fn push(&self, sample: Result<Sample, EngineError>) -> *mut c_char {
        let event = sample.and_then(|s| self.handle.process(s));
        match event.and_then(|e| e.as_ref().map(encode_event).transpose()) {
            Ok(Some(json)) => string_to_cstr(&json),
            Ok(None) => ptr::null_mut(),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        }
    }
}

fn encode_event(event: &MotionEvent) -> Result<String, EngineError> {
    Ok(event.to_json()?)
}

unsafe fn detector_ref<'a>(detector: *const StompkickDetector) -> Option<&'a StompkickDetector> {
    if detector.is_null() {
        set_last_error("Null detector pointer");
        return None;
    }
    Some(&*detector)
}

// ============================================================================
// Detector lifecycle
// ============================================================================

/// Create a detector.
///
/// # Safety
/// - `thresholds_json` must be NULL (defaults) or a valid null-terminated C
///   string holding a thresholds object; missing fields take their defaults.
/// - Must be freed with `stompkick_detector_free`.
/// - Returns NULL on error; call `stompkick_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stompkick_detector_new(
    thresholds_json: *const c_char,
) -> *mut StompkickDetector {
    clear_last_error();

    let thresholds = if thresholds_json.is_null() {
        Thresholds::default()
    } else {
        let json = match cstr_to_str(thresholds_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid thresholds string pointer");
                return ptr::null_mut();
            }
        };
        match Thresholds::from_json(json) {
            Ok(t) => t,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    Box::into_raw(Box::new(StompkickDetector::new(thresholds)))
}

/// Free a detector.
///
/// # Safety
/// - `detector` must be a pointer returned by `stompkick_detector_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn stompkick_detector_free(detector: *mut StompkickDetector) {
    if !detector.is_null() {
        drop(Box::from_raw(detector));
    }
}

// ============================================================================
// Sample input
// ============================================================================

/// Push one bridge-JSON sample.
///
/// Returns the emitted event as JSON, or NULL when no event was emitted. On
/// error NULL is returned and `stompkick_last_error` is set.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `stompkick_detector_new`.
/// - `json` must be a valid null-terminated C string.
/// - A non-NULL result must be freed with `stompkick_free_string`.
#[no_mangle]
pub unsafe extern "C" fn stompkick_detector_push_sample(
    detector: *const StompkickDetector,
    json: *const c_char,
    timestamp: f64,
) -> *mut c_char {
    clear_last_error();

    let Some(detector) = detector_ref(detector) else {
        return ptr::null_mut();
    };
    let Some(json) = cstr_to_str(json) else {
        set_last_error("Invalid JSON string pointer");
        return ptr::null_mut();
    };

    detector.push(BridgeJsonAdapter.decode(json, timestamp))
}

/// Push one raw im600 packet.
///
/// Same return convention as `stompkick_detector_push_sample`.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `stompkick_detector_new`.
/// - `bytes` must point to at least `len` readable bytes.
/// - A non-NULL result must be freed with `stompkick_free_string`.
#[no_mangle]
pub unsafe extern "C" fn stompkick_detector_push_packet(
    detector: *const StompkickDetector,
    bytes: *const u8,
    len: usize,
    timestamp: f64,
) -> *mut c_char {
    clear_last_error();

    let Some(detector) = detector_ref(detector) else {
        return ptr::null_mut();
    };
    if bytes.is_null() {
        set_last_error("Null packet pointer");
        return ptr::null_mut();
    }

    let packet = slice::from_raw_parts(bytes, len);
    detector.push(Im600PacketAdapter.decode(packet, timestamp))
}

// ============================================================================
// Control
// ============================================================================

/// Execute a control command and return its responses as a JSON array.
///
/// `calibrate` blocks the calling thread until the window refills or the
/// calibration timeout elapses; samples pushed from other threads keep being
/// processed meanwhile.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `stompkick_detector_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `stompkick_free_string`.
/// - Returns NULL on error; call `stompkick_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stompkick_detector_command(
    detector: *const StompkickDetector,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(detector) = detector_ref(detector) else {
        return ptr::null_mut();
    };
    let Some(json) = cstr_to_str(json) else {
        set_last_error("Invalid JSON string pointer");
        return ptr::null_mut();
    };

    let command = match Command::from_json(json) {
        Ok(c) => c,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let responses = detector.dispatcher.dispatch_collect(command);
    match serde_json::to_string(&responses) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Current detector status as JSON.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `stompkick_detector_new`.
/// - Returns a newly allocated string that must be freed with `stompkick_free_string`.
/// - Returns NULL on error; call `stompkick_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stompkick_detector_status(
    detector: *const StompkickDetector,
) -> *mut c_char {
    clear_last_error();

    let Some(detector) = detector_ref(detector) else {
        return ptr::null_mut();
    };

    match serde_json::to_string(&detector.handle.status()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Stompkick functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Stompkick function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn stompkick_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Stompkick call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if the last call succeeded.
#[no_mangle]
pub unsafe extern "C" fn stompkick_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn stompkick_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
