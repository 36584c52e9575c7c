// # Proxy Configuration Rendering
//
// The rendered configuration is a pure function of the template, the
// placeholder and the ordered address list: one `server <address>;` line per
// address, substituted for the placeholder. Rendering the same input twice
// yields byte-identical output.
//
// ## Atomic Writes
//
// The proxy may read the file at any moment, so it is never written in place:
// the content goes to a sibling temporary file which is then renamed over the
// target.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;

/// Build the upstream server directives, one line per address
pub fn server_list(addresses: &[String]) -> String {
    addresses
        .iter()
        .map(|address| format!("server {};\n", address))
        .collect()
}

/// Substitute the server directives for `placeholder` in `template`
///
/// # Returns
///
/// - `Ok(String)`: The rendered configuration
/// - `Err(Error)`: The template does not contain the placeholder
pub fn render_config(template: &str, placeholder: &str, addresses: &[String]) -> Result<String, Error> {
    if !template.contains(placeholder) {
        return Err(Error::proxy(format!(
            "Template does not contain placeholder {}",
            placeholder
        )));
    }

    Ok(template.replace(placeholder, &server_list(addresses)))
}

/// Write `contents` to `path` via a temporary file and a rename
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    let temp_path = temp_path(path);
    {
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            Error::proxy(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.write_all(contents.as_bytes()).await.map_err(|e| {
            Error::proxy(format!(
                "Failed to write to temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.flush().await.map_err(|e| {
            Error::proxy(format!(
                "Failed to flush temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.sync_all().await.map_err(|e| {
            Error::proxy(format!(
                "Failed to sync temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::proxy(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })?;

    tracing::trace!("Proxy configuration written to {}", path.display());
    Ok(())
}

/// Sibling temporary file used for atomic writes
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
