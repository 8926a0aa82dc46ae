use crate::{
    error::{Result, TurboError},
    ffi,
    pixel::{Subsampling, to_c_int},
};
use libloading::Library;
use std::{
    ffi::{CStr, OsStr, OsString, c_char, c_int, c_ulong},
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
};

/// Environment variable with extra library paths, tried before the defaults.
pub const LIBRARY_ENV: &str = "TURBOJPEG_LIB";

#[cfg(target_os = "windows")]
pub const DEFAULT_CANDIDATES: &[&str] = &["turbojpeg.dll"];

#[cfg(target_os = "macos")]
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "/opt/libjpeg-turbo/lib64/libturbojpeg.0.dylib",
    "/opt/homebrew/lib/libturbojpeg.dylib",
    "/usr/local/lib/libturbojpeg.dylib",
    "libturbojpeg.0.dylib",
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_CANDIDATES: &[&str] = &["libturbojpeg.so.0", "libturbojpeg.so"];

/// Candidate library names: `TURBOJPEG_LIB` entries first, then the platform defaults.
pub fn default_candidates() -> Vec<OsString> {
    let mut candidates: Vec<OsString> = std::env::var_os(LIBRARY_ENV)
        .map(|value| {
            std::env::split_paths(&value)
                .filter(|path| !path.as_os_str().is_empty())
                .map(PathBuf::into_os_string)
                .collect()
        })
        .unwrap_or_default();
    candidates.extend(DEFAULT_CANDIDATES.iter().map(OsString::from));
    candidates
}

/// Resolved libturbojpeg function table.
///
/// Shared as `Arc<TurboJpeg>` by every handle created from it; the shared
/// library stays mapped for as long as any of them is alive.
pub struct TurboJpeg {
    api: ffi::Api,
    origin: String,
    _library: Option<Library>,
}

impl std::fmt::Debug for TurboJpeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurboJpeg")
            .field("origin", &self.origin)
            .field("handle_errors", &self.has_handle_errors())
            .finish()
    }
}

impl TurboJpeg {
    /// Load the first candidate that opens and exports every required symbol.
    ///
    /// This does not touch the process-wide instance; see [`ensure_loaded`].
    pub fn load<S: AsRef<OsStr>>(candidates: &[S]) -> Result<Arc<Self>> {
        let mut failures = Vec::new();

        for candidate in candidates {
            let name = candidate.as_ref();
            // SAFETY: opening runs the library's initializers; libturbojpeg has none
            // with preconditions, and symbols are typed per turbojpeg.h
            match unsafe { Self::open(name) } {
                Ok(turbo) => {
                    log::info!(
                        "loaded libturbojpeg from {} (per-handle errors: {})",
                        turbo.origin,
                        turbo.has_handle_errors()
                    );
                    return Ok(Arc::new(turbo));
                }
                Err(err) => {
                    log::debug!("skipping {}: {}", name.to_string_lossy(), err);
                    failures.push(format!("{}: {}", name.to_string_lossy(), err));
                }
            }
        }

        if failures.is_empty() {
            return Err(TurboError::LibraryLoad("no candidate library names given".into()));
        }
        Err(TurboError::LibraryLoad(format!(
            "could not load libturbojpeg ({})",
            failures.join("; ")
        )))
    }

    unsafe fn open(name: &OsStr) -> std::result::Result<Self, libloading::Error> {
        unsafe {
            let library = Library::new(name)?;
            let api = ffi::Api {
                init_decompress: *library.get::<ffi::InitDecompressFn>(ffi::SYM_INIT_DECOMPRESS)?,
                init_compress: *library.get::<ffi::InitCompressFn>(ffi::SYM_INIT_COMPRESS)?,
                destroy: *library.get::<ffi::DestroyFn>(ffi::SYM_DESTROY)?,
                decompress_header2: *library
                    .get::<ffi::DecompressHeader2Fn>(ffi::SYM_DECOMPRESS_HEADER2)?,
                decompress2: *library.get::<ffi::Decompress2Fn>(ffi::SYM_DECOMPRESS2)?,
                compress2: *library.get::<ffi::Compress2Fn>(ffi::SYM_COMPRESS2)?,
                buf_size: *library.get::<ffi::BufSizeFn>(ffi::SYM_BUF_SIZE)?,
                get_error_str: *library.get::<ffi::GetErrorStrFn>(ffi::SYM_GET_ERROR_STR)?,
                get_error_str2: library
                    .get::<ffi::GetErrorStr2Fn>(ffi::SYM_GET_ERROR_STR2)
                    .ok()
                    .map(|symbol| *symbol),
                get_error_code: library
                    .get::<ffi::GetErrorCodeFn>(ffi::SYM_GET_ERROR_CODE)
                    .ok()
                    .map(|symbol| *symbol),
                decompress_to_yuv: library
                    .get::<ffi::DecompressToYuvFn>(ffi::SYM_DECOMPRESS_TO_YUV)
                    .ok()
                    .map(|symbol| *symbol),
                buf_size_yuv: library
                    .get::<ffi::BufSizeYuvFn>(ffi::SYM_BUF_SIZE_YUV)
                    .ok()
                    .map(|symbol| *symbol),
                get_scaling_factors: library
                    .get::<ffi::GetScalingFactorsFn>(ffi::SYM_GET_SCALING_FACTORS)
                    .ok()
                    .map(|symbol| *symbol),
            };

            Ok(TurboJpeg {
                api,
                origin: name.to_string_lossy().into_owned(),
                _library: Some(library),
            })
        }
    }

    /// Build a table from caller-supplied entry points, e.g. a statically
    /// linked libturbojpeg or a stand-in native layer.
    ///
    /// # Safety
    /// Every function in `api` must follow the turbojpeg.h contract for its
    /// signature and stay callable for the lifetime of the returned value.
    pub unsafe fn from_api(api: ffi::Api, origin: impl Into<String>) -> Arc<Self> {
        Arc::new(TurboJpeg {
            api,
            origin: origin.into(),
            _library: None,
        })
    }

    pub(crate) fn api(&self) -> &ffi::Api {
        &self.api
    }

    /// Library file name, or the origin given to [`TurboJpeg::from_api`]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether the library exports `tjGetErrorStr2`, making error strings per handle
    pub fn has_handle_errors(&self) -> bool {
        self.api.get_error_str2.is_some()
    }

    /// Whether planar YUV decoding is available
    pub fn has_yuv(&self) -> bool {
        self.api.decompress_to_yuv.is_some() && self.api.buf_size_yuv.is_some()
    }

    /// Decode scales the library supports, empty when it does not export
    /// `tjGetScalingFactors`.
    pub fn scaling_factors(&self) -> Vec<ffi::ScalingFactor> {
        let Some(get_scaling_factors) = self.api.get_scaling_factors else {
            return Vec::new();
        };
        let mut count: c_int = 0;
        // SAFETY: the returned table is static and holds `count` entries
        unsafe {
            let table = get_scaling_factors(&mut count);
            if table.is_null() || count <= 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(table, count as usize).to_vec()
        }
    }

    /// Size in bytes of the planar YUV image `tjDecompressToYUV` writes.
    ///
    /// # Errors
    /// `Unsupported` when `tjBufSizeYUV` is not exported, `InvalidArgument`
    /// for sizes or a subsampling the library rejects.
    pub fn yuv_buffer_size(
        &self,
        width: usize,
        height: usize,
        subsampling: Subsampling,
    ) -> Result<usize> {
        let Some(buf_size_yuv) = self.api.buf_size_yuv else {
            return Err(TurboError::Unsupported(format!(
                "{} does not export tjBufSizeYUV",
                self.origin
            )));
        };
        if let Subsampling::Other(code) = subsampling {
            return Err(TurboError::invalid(format!("unknown subsampling code {code}")));
        }
        let width = to_c_int(width, "width")?;
        let height = to_c_int(height, "height")?;
        // SAFETY: plain arithmetic on its arguments
        let size = unsafe { buf_size_yuv(width, height, subsampling.code()) };
        if size == c_ulong::MAX {
            return Err(TurboError::invalid(format!(
                "no YUV buffer size for {width}x{height} {subsampling:?}"
            )));
        }
        usize::try_from(size).map_err(|_| TurboError::invalid("YUV size exceeds the address space"))
    }

    /// The library-global error string (`tjGetErrorStr`).
    ///
    /// Any thread's failing call overwrites it; prefer the error carried by
    /// the failed operation's `TurboError`.
    pub fn last_error_string(&self) -> String {
        // SAFETY: tjGetErrorStr takes no arguments and returns a static or thread buffer
        unsafe { message_from_ptr((self.api.get_error_str)()) }
    }

    /// Error code and message for a native call that just failed on `handle`.
    ///
    /// Must be the next native call made by this thread after the failure, or
    /// the global message may already describe a different failure. With
    /// `tjGetErrorStr2` the message is read from the handle itself.
    ///
    /// # Safety
    /// `handle` must be null or a live handle created by this library.
    pub(crate) unsafe fn failure(&self, handle: ffi::TjHandle, status: c_int) -> (i32, String) {
        unsafe {
            let message = match self.api.get_error_str2 {
                Some(get_error_str2) if !handle.is_null() => {
                    message_from_ptr(get_error_str2(handle))
                }
                _ => message_from_ptr((self.api.get_error_str)()),
            };
            let code = match self.api.get_error_code {
                Some(get_error_code) if !handle.is_null() => get_error_code(handle),
                _ => status,
            };
            (code, message)
        }
    }
}

/// # Safety
/// `ptr` must be null or point at a NUL-terminated string.
unsafe fn message_from_ptr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::from("Unknown error");
    }
    let message = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().trim().to_string();
    if message.is_empty() {
        String::from("Unknown error")
    } else {
        message
    }
}

/// A value created at most once per process, with a fallible constructor.
///
/// Reads after initialization take no lock. Failed initialization is not
/// remembered, so a later call may succeed with different inputs.
pub(crate) struct LoadOnce<T> {
    value: OnceLock<Arc<T>>,
    lock: Mutex<()>,
}

impl<T> LoadOnce<T> {
    pub const fn new() -> Self {
        LoadOnce {
            value: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    pub fn get_or_try_load(&self, load: impl FnOnce() -> Result<Arc<T>>) -> Result<Arc<T>> {
        if let Some(value) = self.value.get() {
            return Ok(Arc::clone(value));
        }

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(value) = self.value.get() {
            return Ok(Arc::clone(value));
        }

        let value = load()?;
        // only the lock holder sets the cell, so this cannot race
        let _ = self.value.set(Arc::clone(&value));
        Ok(value)
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value.get().cloned()
    }
}

static LIBRARY: LoadOnce<TurboJpeg> = LoadOnce::new();

/// Load libturbojpeg into the process once and return the shared table.
///
/// Once a library is loaded every later call returns it, whatever
/// `candidates` says. A failed attempt leaves nothing behind.
pub fn ensure_loaded<S: AsRef<OsStr>>(candidates: &[S]) -> Result<Arc<TurboJpeg>> {
    LIBRARY.get_or_try_load(|| TurboJpeg::load(candidates))
}

/// The process-wide library, loaded from [`default_candidates`] on first use.
pub fn library() -> Result<Arc<TurboJpeg>> {
    if let Some(turbo) = LIBRARY.get() {
        return Ok(turbo);
    }
    ensure_loaded(default_candidates().as_slice())
}
