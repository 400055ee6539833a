//! Build pipeline: uploaded Go source → worker executable.
//!
//! 1. Validate the source and find the endpoint function
//! 2. Check the declared package against the package in the URL
//! 3. Render the worker `main` from the template
//! 4. Run the build script: `<script> <user_dir> <package> <main_file>`
//!
//! The build script is expected to leave the executable at
//! `<user_dir>/f/<package>/endpoint`. Uploaded sources live at
//! `<root>/<owner>/src/<package>/<filename>`, which makes `<root>/<owner>` a
//! GOPATH for the user's packages.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use handlebars::Handlebars;
use iota_validate::{ValidateError, ValidatedEndpoint};
use tokio::process::Command;

use crate::endpoint::{Endpoint, EndpointId, EndpointIdError};

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub template_path: PathBuf,
    pub build_script: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("templates/endpointmain.go.tmpl"),
            build_script: PathBuf::from("scripts/buildendpoint.sh"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Parse and signature failures from the validator.
    #[error(transparent)]
    Validate(#[from] ValidateError),
    #[error("source package name '{found}' does not match URL package name '{expected}'")]
    PackageMismatch { found: String, expected: String },
    #[error("invalid endpoint name: {0}")]
    InvalidName(#[from] EndpointIdError),
    #[error("failed to render worker template {}: {reason}", .path.display())]
    Template { path: PathBuf, reason: String },
    #[error("build script exited with {status}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Compile {
        status: String,
        stdout: String,
        stderr: String,
    },
    #[error("build i/o error: {0}")]
    Io(#[from] io::Error),
}

/// `<root>/<owner>`: the per-owner build directory.
pub fn user_dir(root: &Path, owner: &str) -> PathBuf {
    root.join(owner)
}

/// `<root>/<owner>/src/<package>/<filename>`
pub fn source_path(root: &Path, owner: &str, package: &str, filename: &str) -> PathBuf {
    user_dir(root, owner).join("src").join(package).join(filename)
}

pub async fn save_source(path: &Path, source: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, source).await
}

/// Render the worker `main` from a handlebars template. The validated
/// endpoint is the context: `{{package}}`, `{{function}}`, `{{parameter}}`.
/// Strict mode makes any other variable an error.
pub fn render_worker_main(template: &str, endpoint: &ValidatedEndpoint) -> Result<String, String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    // Go source, not HTML.
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .render_template(template, endpoint)
        .map_err(|e| e.to_string())
}

/// Run the whole pipeline for one upload and return the endpoint it deploys.
pub async fn build_endpoint(
    config: &BuildConfig,
    root: &Path,
    owner: &str,
    url_package: &str,
    source: &str,
) -> Result<Endpoint, BuildError> {
    let validated = iota_validate::validate_source(source)?;
    if !iota_validate::check_package(&validated, url_package) {
        return Err(BuildError::PackageMismatch {
            found: validated.package,
            expected: url_package.to_string(),
        });
    }
    let id = EndpointId::new(owner, &validated.package, &validated.function)?;
    tracing::info!(target: "iota::build", endpoint = %id, parameter = %validated.parameter, "Source validated");

    let template = tokio::fs::read_to_string(&config.template_path)
        .await
        .map_err(|e| BuildError::Template {
            path: config.template_path.clone(),
            reason: e.to_string(),
        })?;
    let main_src =
        render_worker_main(&template, &validated).map_err(|reason| BuildError::Template {
            path: config.template_path.clone(),
            reason,
        })?;

    // Removed when dropped, after the script has run.
    let main_file = tempfile::Builder::new()
        .prefix("endpointmain")
        .suffix(".go")
        .tempfile()?;
    tokio::fs::write(main_file.path(), main_src).await?;

    let user_dir = user_dir(root, owner);
    tokio::fs::create_dir_all(user_dir.join("f").join(&validated.package)).await?;

    let output = Command::new(&config.build_script)
        .arg(&user_dir)
        .arg(&validated.package)
        .arg(main_file.path())
        .stdin(Stdio::null())
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    tracing::debug!(target: "iota::build", endpoint = %id, %stdout, %stderr, "Build script finished");

    if !output.status.success() {
        tracing::warn!(target: "iota::build", endpoint = %id, status = %output.status, "Build failed");
        return Err(BuildError::Compile {
            status: output.status.to_string(),
            stdout,
            stderr,
        });
    }

    tracing::info!(target: "iota::build", endpoint = %id, "Build succeeded");
    Ok(Endpoint::new(id, validated.parameter))
}
