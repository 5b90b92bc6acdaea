//! WASI host context
//!
//! An engine built as a `wasm32-wasi` reactor imports a few preview1
//! functions (`fd_write`, `proc_exit`, clocks, `random_get`) for its assert
//! and abort paths. Without a WASI context those imports trap like any other;
//! with one, the `wasi` feature links a real preview1 implementation into
//! either back end.

/// Import module name of WASI preview1
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// Default cap on captured stdout and stderr (1 MiB each)
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

/// Where the engine's stdout and stderr go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WasiStdio {
    /// Discard writes
    #[default]
    Null,
    /// Share the host process's stdio
    Inherit,
    /// Keep writes in memory, read back with `Prism::captured_output`
    Capture,
}

/// Preview1 context handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasiConfig {
    /// Program arguments seen by the engine
    pub args: Vec<String>,
    /// Environment variables seen by the engine
    pub env: Vec<(String, String)>,
    /// Stdio routing
    pub stdio: WasiStdio,
    /// Bytes kept per stream when capturing
    pub capture_limit: usize,
}

impl Default for WasiConfig {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            env: Vec::new(),
            stdio: WasiStdio::default(),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }
}

impl WasiConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a program argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set stdio routing
    pub fn with_stdio(mut self, stdio: WasiStdio) -> Self {
        self.stdio = stdio;
        self
    }

    /// Set the per-stream capture cap
    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }

    /// Whether stdio is kept in memory
    pub fn captures(&self) -> bool {
        self.stdio == WasiStdio::Capture
    }
}

/// Bytes the engine wrote to stdout and stderr so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Contents of fd 1
    pub stdout: Vec<u8>,
    /// Contents of fd 2
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    /// Stdout as text, with invalid UTF-8 replaced
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr as text, with invalid UTF-8 replaced
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
