//! Parser options and their packed wire layout
//!
//! The engine reads its configuration from one flat byte string:
//!
//! | Field | Encoding |
//! |-------|----------|
//! | file path | u32 length, bytes |
//! | starting line | i32 |
//! | encoding name | u32 length, bytes |
//! | frozen string literal | u8 |
//! | command line `-p`, `-n`, `-l`, `-a` | u8 each |
//! | syntax version | u8 |
//! | scopes | u32 count, then per scope a u32 count of u32-length-prefixed names |
//!
//! Integers use the host's byte order, which must agree with the engine's
//! (see [`NATIVE_ENDIAN_ASSUMED`]).

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::error::{BridgeError, BridgeResult};

/// Whether host byte order matches the engine's little-endian linear memory
///
/// Packed options and results are written and read in host order. Engines
/// refuse to load when this is false.
pub const NATIVE_ENDIAN_ASSUMED: bool = cfg!(target_endian = "little");

/// Ruby syntax version the parser should accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyntaxVersion {
    /// Whatever the engine considers current
    #[default]
    Latest,
    /// Ruby 3.3
    V3_3,
    /// Ruby 3.4
    V3_4,
    /// Ruby 3.5
    V3_5,
}

impl SyntaxVersion {
    /// Wire value of the version selector
    pub fn as_u8(self) -> u8 {
        match self {
            SyntaxVersion::Latest => 0,
            SyntaxVersion::V3_3 => 1,
            SyntaxVersion::V3_4 => 2,
            SyntaxVersion::V3_5 => 3,
        }
    }

    /// Version for a wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SyntaxVersion::Latest),
            1 => Some(SyntaxVersion::V3_3),
            2 => Some(SyntaxVersion::V3_4),
            3 => Some(SyntaxVersion::V3_5),
            _ => None,
        }
    }
}

impl FromStr for SyntaxVersion {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(SyntaxVersion::Latest),
            "3.3" | "3.3.0" => Ok(SyntaxVersion::V3_3),
            "3.4" | "3.4.0" => Ok(SyntaxVersion::V3_4),
            "3.5" | "3.5.0" => Ok(SyntaxVersion::V3_5),
            other => Err(BridgeError::InvalidOptions {
                reason: format!("unknown syntax version '{}'", other),
            }),
        }
    }
}

impl fmt::Display for SyntaxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyntaxVersion::Latest => "latest",
            SyntaxVersion::V3_3 => "3.3",
            SyntaxVersion::V3_4 => "3.4",
            SyntaxVersion::V3_5 => "3.5",
        };
        f.write_str(name)
    }
}

/// Ruby command-line switches that change how the source is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandLineFlags {
    /// `-p`: wrap the program in a print loop
    pub print: bool,
    /// `-n`: wrap the program in a `gets` loop
    pub line_loop: bool,
    /// `-l`: chomp each input line
    pub line_ending: bool,
    /// `-a`: split each input line into `$F`
    pub autosplit: bool,
}

impl CommandLineFlags {
    /// Parse switch letters such as `"pl"`
    pub fn from_letters(letters: &str) -> BridgeResult<Self> {
        let mut flags = Self::default();
        for letter in letters.chars() {
            match letter {
                'p' => flags.print = true,
                'n' => flags.line_loop = true,
                'l' => flags.line_ending = true,
                'a' => flags.autosplit = true,
                other => {
                    return Err(BridgeError::InvalidOptions {
                        reason: format!("unknown command line switch '{}'", other),
                    })
                }
            }
        }
        Ok(flags)
    }

    /// Flags as wire bytes, in `p n l a` order
    fn as_bytes(&self) -> [u8; 4] {
        [
            self.print as u8,
            self.line_loop as u8,
            self.line_ending as u8,
            self.autosplit as u8,
        ]
    }
}

/// Configuration for one parse call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingOptions {
    /// Name of the file being parsed
    pub filepath: Vec<u8>,
    /// Line number the source starts on (1-based)
    pub line: i32,
    /// Name of the source encoding; empty means the engine default
    pub encoding: Vec<u8>,
    /// Whether string literals are frozen
    pub frozen_string_literal: bool,
    /// Command-line switches
    pub command_line: CommandLineFlags,
    /// Syntax version
    pub version: SyntaxVersion,
    /// Local variable names of the enclosing scopes, outermost first
    pub scopes: Vec<Vec<Vec<u8>>>,
}

impl Default for ParsingOptions {
    fn default() -> Self {
        Self {
            filepath: Vec::new(),
            line: 1,
            encoding: Vec::new(),
            frozen_string_literal: false,
            command_line: CommandLineFlags::default(),
            version: SyntaxVersion::Latest,
            scopes: Vec::new(),
        }
    }
}

impl ParsingOptions {
    /// Options with every field at its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the file path
    pub fn with_filepath(mut self, filepath: impl Into<Vec<u8>>) -> Self {
        self.filepath = filepath.into();
        self
    }

    /// Set the starting line
    pub fn with_line(mut self, line: i32) -> Self {
        self.line = line;
        self
    }

    /// Set the encoding name
    pub fn with_encoding(mut self, encoding: impl Into<Vec<u8>>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Set the frozen string literal flag
    pub fn with_frozen_string_literal(mut self, frozen: bool) -> Self {
        self.frozen_string_literal = frozen;
        self
    }

    /// Set the command-line switches
    pub fn with_command_line(mut self, flags: CommandLineFlags) -> Self {
        self.command_line = flags;
        self
    }

    /// Set the syntax version
    pub fn with_version(mut self, version: SyntaxVersion) -> Self {
        self.version = version;
        self
    }

    /// Append an enclosing scope; call outermost first
    pub fn with_scope<I, S>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        self.scopes.push(locals.into_iter().map(Into::into).collect());
        self
    }

    /// Load options from a JSON document
    ///
    /// ```json
    /// {
    ///   "filepath": "app.rb",
    ///   "line": 1,
    ///   "encoding": "UTF-8",
    ///   "frozen_string_literal": true,
    ///   "command_line": "pl",
    ///   "version": "3.4",
    ///   "scopes": [["a", "b"], ["c"]]
    /// }
    /// ```
    ///
    /// Every key is optional.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let doc: OptionsDocument =
            serde_json::from_str(json).map_err(|err| BridgeError::InvalidOptions {
                reason: err.to_string(),
            })?;

        Ok(Self {
            filepath: doc.filepath.into_bytes(),
            line: doc.line,
            encoding: doc.encoding.into_bytes(),
            frozen_string_literal: doc.frozen_string_literal,
            command_line: CommandLineFlags::from_letters(&doc.command_line)?,
            version: doc.version.parse()?,
            scopes: doc
                .scopes
                .into_iter()
                .map(|scope| scope.into_iter().map(String::into_bytes).collect())
                .collect(),
        })
    }

    /// Encode into the packed wire layout
    pub fn encode(&self) -> BridgeResult<Vec<u8>> {
        encode(self)
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OptionsDocument {
    filepath: String,
    line: i32,
    encoding: String,
    frozen_string_literal: bool,
    command_line: String,
    version: String,
    scopes: Vec<Vec<String>>,
}

impl Default for OptionsDocument {
    fn default() -> Self {
        Self {
            filepath: String::new(),
            line: 1,
            encoding: String::new(),
            frozen_string_literal: false,
            command_line: String::new(),
            version: "latest".to_string(),
            scopes: Vec::new(),
        }
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Encode options into the packed wire layout
///
/// Fails only when a length does not fit in 32 bits.
pub fn encode(options: &ParsingOptions) -> BridgeResult<Vec<u8>> {
    let locals: usize = options
        .scopes
        .iter()
        .flat_map(|scope| scope.iter().map(|local| local.len() + 4))
        .sum();
    let capacity = 4 + options.filepath.len()
        + 4
        + 4
        + options.encoding.len()
        + 6
        + 4
        + options.scopes.len() * 4
        + locals;

    let mut out = Vec::with_capacity(capacity);
    write_bytes(&mut out, &options.filepath, "file path")?;
    out.extend_from_slice(&options.line.to_ne_bytes());
    write_bytes(&mut out, &options.encoding, "encoding")?;
    out.push(options.frozen_string_literal as u8);
    out.extend_from_slice(&options.command_line.as_bytes());
    out.push(options.version.as_u8());

    write_len(&mut out, options.scopes.len(), "scope count")?;
    for scope in &options.scopes {
        write_len(&mut out, scope.len(), "local count")?;
        for local in scope {
            write_bytes(&mut out, local, "local name")?;
        }
    }

    Ok(out)
}

fn write_len(out: &mut Vec<u8>, len: usize, what: &str) -> BridgeResult<()> {
    let len = u32::try_from(len).map_err(|_| BridgeError::InvalidOptions {
        reason: format!("{} of {} does not fit in 32 bits", what, len),
    })?;
    out.extend_from_slice(&len.to_ne_bytes());
    Ok(())
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8], what: &str) -> BridgeResult<()> {
    write_len(out, bytes.len(), what)?;
    out.extend_from_slice(bytes);
    Ok(())
}
