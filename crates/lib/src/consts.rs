/// Application name, used for cache and data directory names.
pub const APP_NAME: &str = "polybuild";

/// File name of a repository's specification, relative to the repository root.
pub const SPEC_FILENAME: &str = "polybuild.json";

/// Environment variable overriding the build-temp root.
pub const BUILD_ROOT_ENV: &str = "PB_BUILD_ROOT";

/// Environment variable that disables local reference overrides when set.
pub const NO_LOCAL_OVERRIDES_ENV: &str = "PB_NO_LOCAL_OVERRIDES";

/// Provenance variables injected into every backend invocation.
pub mod provenance {
  pub const OUTPUT_PATH: &str = "PB_OUTPUT_PATH";
  pub const BRANCH: &str = "PB_BRANCH";
  pub const COMMIT: &str = "PB_COMMIT";
  pub const BUILD_TAG: &str = "PB_BUILD_TAG";
  pub const BUILD_TIME: &str = "PB_BUILD_TIME";
}
