//! Terminal reporting for `pb`.
//!
//! Build runs, target listings and clean results are written to stdout as
//! marked lines, or as a single JSON document with `--format json`. Failures
//! go to stderr. Colors are applied only when the stream supports them.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use polybuild_lib::build::Artifact;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Leading glyph of a report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
  Done,
  Failed,
  Heading,
  Edge,
}

impl Mark {
  pub fn glyph(self) -> &'static str {
    match self {
      Mark::Done => "✓",
      Mark::Failed => "✗",
      Mark::Heading => "•",
      Mark::Edge => "→",
    }
  }
}

/// Wall time rounded to milliseconds, e.g. `1s 500ms`.
pub fn elapsed(duration: Duration) -> String {
  let rounded = Duration::from_millis(duration.as_millis().try_into().unwrap_or(u64::MAX));
  if rounded.is_zero() {
    return "0ms".to_string();
  }
  humantime::format_duration(rounded).to_string()
}

pub fn done(message: &str) {
  println!("{} {}", Mark::Done.glyph().if_supports_color(Stream::Stdout, |s| s.green()), message);
}

pub fn failed(message: &str) {
  eprintln!(
    "{} {}",
    Mark::Failed.glyph().if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn heading(message: &str) {
  println!("{} {}", Mark::Heading.glyph().if_supports_color(Stream::Stdout, |s| s.blue()), message);
}

/// An indented `label: value` line under a heading.
pub fn field(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// An indented edge line, e.g. a dependency or a produced artifact.
pub fn edge(depth: usize, text: &str) {
  println!("{:indent$}{} {}", "", Mark::Edge.glyph(), text, indent = depth * 2);
}

/// One line naming an artifact and where it lives.
pub fn artifact_line(artifact: &Artifact) -> String {
  match artifact {
    Artifact::File { name, path, .. } => format!("{}: {}", name, path.display()),
    Artifact::ContainerImage { name, .. } => match artifact.image_reference() {
      Some(reference) => format!("{}: {}", name, reference),
      None => name.clone(),
    },
  }
}

pub fn emit_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
