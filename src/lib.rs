//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and talk in one direction only:
//! - `tokenizer` classifies source text into tokens on demand.
//! - `symbol_table` tracks class and subroutine variables with running indices.
//! - `codegen` renders VM instructions and owns the segment/operator tables.
//! - `parser` is the compilation engine; it pulls tokens, resolves names and
//!   writes VM code in a single recursive-descent pass.
//! - `error` centralises reporting utilities shared by the other modules.
//!
//! One source file holds one class and is compiled independently of every
//! other file.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod symbol_table;
pub mod tokenizer;
pub mod ty;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, info};

pub use error::{CompileError, CompileResult};
pub use parser::CompilationEngine;

use crate::error::{ReadSnafu, WriteSnafu};
use crate::tokenizer::Lexer;

/// Extension of source files.
pub const SOURCE_EXTENSION: &str = "jack";
/// Extension of generated VM files.
pub const OUTPUT_EXTENSION: &str = "vm";

/// Compile one class into VM code held in memory.
pub fn compile(unit: &str, source: &str) -> CompileResult<String> {
  let mut out = Vec::new();
  compile_to(unit, source, &mut out)?;
  Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Compile one class, streaming VM code into `out`.
///
/// On failure `out` keeps every instruction emitted before the error.
pub fn compile_to<W: Write>(unit: &str, source: &str, out: &mut W) -> CompileResult<()> {
  let mut engine = CompilationEngine::new(unit, source, out)?;
  engine.compile_class()
}

/// Render the token stream of one unit as a `<tokens>` document.
pub fn tokens_xml(unit: &str, source: &str) -> CompileResult<String> {
  Lexer::new(unit, source).tokens_xml()
}

/// Compile `input` into the file at `output`.
///
/// The output is flushed whether or not compilation succeeds, so a failed
/// unit leaves the code generated up to the error on disk.
pub fn compile_file(input: &Path, output: &Path) -> CompileResult<()> {
  let source = fs::read_to_string(input).context(ReadSnafu { path: input })?;
  let unit = unit_name(input);
  info!(input = %input.display(), output = %output.display(), "compiling");

  let file = File::create(output).context(WriteSnafu { path: output })?;
  let mut writer = BufWriter::new(file);
  let compiled = compile_to(&unit, &source, &mut writer);
  let flushed = writer.flush().context(WriteSnafu { path: output });
  compiled?;
  flushed
}

/// Write the token dump of `input` to `output`.
pub fn write_tokens_file(input: &Path, output: &Path) -> CompileResult<()> {
  let source = fs::read_to_string(input).context(ReadSnafu { path: input })?;
  let xml = tokens_xml(&unit_name(input), &source)?;
  debug!(output = %output.display(), "writing token dump");
  fs::write(output, xml).context(WriteSnafu { path: output })
}

/// Source files named by `path`: the file itself, or every `.jack` file
/// directly inside a directory, sorted by name.
pub fn jack_sources(path: &Path) -> CompileResult<Vec<PathBuf>> {
  if !path.is_dir() {
    return Ok(vec![path.to_path_buf()]);
  }

  let entries = fs::read_dir(path).context(ReadSnafu { path })?;
  let mut sources = Vec::new();
  for entry in entries {
    let entry = entry.context(ReadSnafu { path })?;
    let file = entry.path();
    if file.is_file() && file.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
      sources.push(file);
    }
  }
  sources.sort();
  Ok(sources)
}

/// Where the VM code for `input` goes: beside it, or inside `out_dir`.
pub fn output_path(input: &Path, out_dir: Option<&Path>, suffix: &str, extension: &str) -> PathBuf {
  let stem = input
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_default();
  let file_name = format!("{stem}{suffix}.{extension}");
  match out_dir {
    Some(dir) => dir.join(file_name),
    None => input.with_file_name(file_name),
  }
}

/// Name used for a unit in diagnostics.
pub fn unit_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}
