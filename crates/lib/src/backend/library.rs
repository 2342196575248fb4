//! Interpreted-language library targets.
//!
//! All libraries of a run share one `site` directory. Preparing a library
//! links its sources into `site/<name>`, so every later build in the run can
//! import it from there. Two libraries with the same import name cannot share
//! a run; the second fails with [`BackendError::LinkConflict`]. Building writes a `BUILD_INFO.json` provenance
//! manifest and, when `archive` is set, a gzipped tarball of the sources.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{BackendError, BuildBackend, BuildEnv, parse_spec};
use crate::build::{Artifact, BuildContext};
use crate::consts::provenance;
use crate::graph::Target;
use crate::spec::TargetKind;
use crate::util::fs::replace_symlink;

pub const SITE_DIR: &str = "site";
pub const BUILD_INFO: &str = "BUILD_INFO.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LibrarySpec {
  /// Import name inside the site directory. Defaults to the target name.
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  archive: bool,
}

#[derive(Debug, Serialize)]
struct BuildInfo<'a> {
  target: String,
  name: &'a str,
  source: &'a Path,
  linked: Option<&'a Path>,
  branch: String,
  commit: String,
  tag: String,
  build_time: String,
}

pub struct InterpretedLibraryBackend;

pub(crate) fn backend() -> Box<dyn BuildBackend> {
  Box::new(InterpretedLibraryBackend)
}

fn import_name<'a>(spec: &'a LibrarySpec, target: &'a Target) -> &'a str {
  spec.name.as_deref().unwrap_or(target.name())
}

impl BuildBackend for InterpretedLibraryBackend {
  fn kind(&self) -> TargetKind {
    TargetKind::InterpretedLibrary
  }

  fn create_env(&self, root: &Path) -> Result<BuildEnv, BackendError> {
    let site = root.join(SITE_DIR);
    fs::create_dir_all(&site).map_err(BackendError::io(format!("creating '{}'", site.display())))?;
    debug!(site = %site.display(), "created library environment");
    Ok(BuildEnv {
      kind: self.kind(),
      root: root.to_path_buf(),
    })
  }

  fn prepare(&self, target: &Target, env: &BuildEnv, _ctx: &BuildContext) -> Result<Option<PathBuf>, BackendError> {
    let spec: LibrarySpec = parse_spec(target)?;
    let link = env.root.join(SITE_DIR).join(import_name(&spec, target));

    // One import name per site: a link to other sources is never replaced.
    if let Ok(existing) = fs::read_link(&link) {
      if existing == target.path {
        return Ok(Some(link));
      }
      return Err(BackendError::LinkConflict {
        link,
        existing,
        wanted: target.path.clone(),
      });
    }

    replace_symlink(&target.path, &link).map_err(BackendError::io(format!("linking '{}'", link.display())))?;
    debug!(target = %target.key, link = %link.display(), "linked library");
    Ok(Some(link))
  }

  fn build(&self, target: &Target, ctx: &BuildContext) -> Result<Vec<Artifact>, BackendError> {
    let spec: LibrarySpec = parse_spec(target)?;
    let name = import_name(&spec, target);
    let out = ctx.output_dir().map_err(BackendError::io("creating output directory"))?;
    let vars = ctx.provenance().map_err(BackendError::io("collecting provenance"))?;
    let var = |key: &str| vars.get(key).cloned().unwrap_or_default();

    let info = BuildInfo {
      target: target.key.to_string(),
      name,
      source: &target.path,
      linked: ctx.linked_path(),
      branch: var(provenance::BRANCH),
      commit: var(provenance::COMMIT),
      tag: var(provenance::BUILD_TAG),
      build_time: var(provenance::BUILD_TIME),
    };
    let info_path = out.join(BUILD_INFO);
    let json = serde_json::to_string_pretty(&info).map_err(|e| BackendError::Io {
      context: "encoding build info".to_string(),
      source: e.into(),
    })?;
    fs::write(&info_path, json).map_err(BackendError::io(format!("writing '{}'", info_path.display())))?;

    let mut artifacts = vec![Artifact::file("build-info", info_path)];

    if spec.archive {
      let archive = out.join(format!("{}.tar.gz", name));
      write_archive(&target.path, name, &archive)?;
      info!(target = %target.key, archive = %archive.display(), "archived library sources");
      artifacts.push(Artifact::File {
        name: "source".to_string(),
        path: archive,
        files: Vec::new(),
        compressed: true,
      });
    }

    Ok(artifacts)
  }
}

/// Write `source` as a gzipped tarball with every entry under `prefix/`.
fn write_archive(source: &Path, prefix: &str, archive: &Path) -> Result<(), BackendError> {
  let context = || format!("archiving '{}'", source.display());

  let file = File::create(archive).map_err(BackendError::io(context()))?;
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
  builder.follow_symlinks(false);
  builder
    .append_dir_all(prefix, source)
    .map_err(BackendError::io(context()))?;
  builder
    .into_inner()
    .and_then(|encoder| encoder.finish())
    .map_err(BackendError::io(context()))?;
  Ok(())
}
