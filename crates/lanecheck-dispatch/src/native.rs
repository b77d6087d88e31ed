//! Native entry points and the libraries that export them.
//!
//! Kernels are exported from a shared library with one uniform C ABI:
//!
//! ```c
//! int32_t kernel(const uint8_t *const *args, const size_t *arg_lens,
//!                size_t nargs, uint8_t *out, size_t out_cap,
//!                size_t *out_len);
//! ```
//!
//! Each `args[i]` points at `arg_lens[i]` bytes of densely packed lanes.
//! The kernel writes its result into `out` (capacity `out_cap`), stores
//! the number of bytes written in `*out_len` and returns zero. Any other
//! status is a native fault.

use crate::{DeclResult, DeclarationError};
use camino::Utf8Path;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Raw signature of an exported kernel.
pub type RawKernelFn = unsafe extern "C" fn(
    args: *const *const u8,
    arg_lens: *const usize,
    nargs: usize,
    out: *mut u8,
    out_cap: usize,
    out_len: *mut usize,
) -> i32;

/// What a native call handed back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeReturn {
    /// A result buffer.
    Bytes(Vec<u8>),
    /// No result.
    Empty,
    /// The kernel reported more bytes than the output buffer holds.
    Overflow(usize),
    /// Non-zero status from the kernel.
    Fault(i32),
}

/// A callable native kernel.
///
/// `args` holds one buffer per data parameter in declared order.
/// `ret_len` is the number of result bytes the declaration expects, zero
/// for a `void` signature.
pub trait EntryPoint: Send + Sync {
    /// Run the kernel.
    fn invoke(&self, args: &[&[u8]], ret_len: usize) -> NativeReturn;
}

impl<F> EntryPoint for F
where
    F: Fn(&[&[u8]]) -> NativeReturn + Send + Sync,
{
    fn invoke(&self, args: &[&[u8]], _ret_len: usize) -> NativeReturn {
        self(args)
    }
}

/// An entry point calling a raw C function.
pub struct CEntryPoint {
    func: RawKernelFn,
    // Keeps the exporting library mapped while this entry point lives.
    _library: Option<Arc<NativeLibrary>>,
}

impl CEntryPoint {
    /// Wrap a kernel function pointer.
    ///
    /// # Safety
    ///
    /// `func` must follow the kernel ABI above: read only `nargs` argument
    /// buffers within their lengths, and write at most `out_cap` bytes.
    pub unsafe fn new(func: RawKernelFn) -> Self {
        Self {
            func,
            _library: None,
        }
    }
}

impl fmt::Debug for CEntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CEntryPoint")
            .field("func", &(self.func as *const ()))
            .finish_non_exhaustive()
    }
}

impl EntryPoint for CEntryPoint {
    fn invoke(&self, args: &[&[u8]], ret_len: usize) -> NativeReturn {
        let ptrs: SmallVec<[*const u8; 4]> = args.iter().map(|a| a.as_ptr()).collect();
        let lens: SmallVec<[usize; 4]> = args.iter().map(|a| a.len()).collect();
        let mut out = vec![0u8; ret_len];
        let mut out_len = 0usize;

        // Safety: the pointers and lengths describe live slices for the
        // duration of the call, and `out` has `ret_len` writable bytes.
        let status = unsafe {
            (self.func)(
                ptrs.as_ptr(),
                lens.as_ptr(),
                args.len(),
                out.as_mut_ptr(),
                out.len(),
                &mut out_len,
            )
        };

        if status != 0 {
            return NativeReturn::Fault(status);
        }
        if out_len > out.len() {
            return NativeReturn::Overflow(out_len);
        }
        if ret_len == 0 && out_len == 0 {
            return NativeReturn::Empty;
        }
        out.truncate(out_len);
        NativeReturn::Bytes(out)
    }
}

// ============================================================================
// Shared libraries
// ============================================================================

/// A loaded shared library of kernels.
pub struct NativeLibrary {
    path: String,
    library: libloading::Library,
}

impl NativeLibrary {
    /// Load the library at `path`.
    ///
    /// The library is expected to be a kernel build: loading runs its
    /// initializers.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::Library`] if the loader fails.
    pub fn open(path: &Utf8Path) -> DeclResult<Arc<Self>> {
        // Safety: the path names a kernel library produced by the kernel
        // build, whose initializers only register static tables.
        let library = unsafe { libloading::Library::new(path.as_std_path()) }.map_err(|e| {
            DeclarationError::Library {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })?;
        tracing::info!(library = %path, "loaded native kernel library");
        Ok(Arc::new(Self {
            path: path.to_string(),
            library,
        }))
    }

    /// Path the library was loaded from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up an exported kernel.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::Symbol`] if `symbol` is not exported.
    pub fn entry_point(self: &Arc<Self>, symbol: &str) -> DeclResult<CEntryPoint> {
        // Safety: every symbol named by the kernel manifest is exported
        // with the kernel ABI.
        let func: RawKernelFn = unsafe {
            let sym: libloading::Symbol<'_, RawKernelFn> =
                self.library.get(symbol.as_bytes()).map_err(|e| DeclarationError::Symbol {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                })?;
            *sym
        };
        Ok(CEntryPoint {
            func,
            _library: Some(Arc::clone(self)),
        })
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Symbol resolution
// ============================================================================

/// Maps exported symbol names to entry points.
pub trait SymbolResolver {
    /// Find the entry point exported as `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::Symbol`] if nothing is exported under
    /// that name.
    fn resolve(&self, symbol: &str) -> DeclResult<Arc<dyn EntryPoint>>;
}

impl SymbolResolver for Arc<NativeLibrary> {
    fn resolve(&self, symbol: &str) -> DeclResult<Arc<dyn EntryPoint>> {
        Ok(Arc::new(self.entry_point(symbol)?))
    }
}

/// An in-memory symbol table, for kernels that are not in a library.
#[derive(Clone, Default)]
pub struct SymbolTable {
    entries: FxHashMap<String, Arc<dyn EntryPoint>>,
}

impl SymbolTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `entry` under `symbol`, replacing any previous export.
    pub fn insert(&mut self, symbol: impl Into<String>, entry: impl EntryPoint + 'static) {
        self.entries.insert(symbol.into(), Arc::new(entry));
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, symbol: impl Into<String>, entry: impl EntryPoint + 'static) -> Self {
        self.insert(symbol, entry);
        self
    }

    /// Number of exported symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, symbol: &str) -> DeclResult<Arc<dyn EntryPoint>> {
        self.entries
            .get(symbol)
            .cloned()
            .ok_or_else(|| DeclarationError::Symbol {
                symbol: symbol.to_string(),
                reason: "not in symbol table".to_string(),
            })
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SymbolTable").field("symbols", &names).finish()
    }
}
