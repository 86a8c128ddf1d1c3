use std::io::Write;
use std::path::{Component, Path, PathBuf};

use base64::Engine;

use crate::error::DownloadError;

pub const SVG_MIME: &str = "image/svg+xml";

/// Write `markup` to `dir/file_name`. The content goes to a temporary file in
/// the same directory first, which is removed if anything fails before it is
/// persisted under its final name. `file_name` must be a plain name; the
/// file never lands outside `dir`.
pub fn save_svg(dir: &Path, file_name: &str, markup: &str) -> Result<PathBuf, DownloadError> {
    if markup.is_empty() {
        return Err(DownloadError::NothingRendered);
    }
    if !is_plain_file_name(file_name) {
        return Err(DownloadError::InvalidFileName(file_name.to_string()));
    }

    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".svg")
        .tempfile_in(dir)?;
    tmp.write_all(markup.as_bytes())?;
    tmp.flush()?;

    let path = dir.join(file_name);
    // Dropping the returned file handle removes the temporary file.
    tmp.persist(&path).map_err(|e| DownloadError::Io(e.error))?;
    tracing::info!(path = %path.display(), bytes = markup.len(), "saved download");
    Ok(path)
}

fn is_plain_file_name(name: &str) -> bool {
    // Backslashes are separators on Windows and never legitimate here.
    if name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

/// `data:image/svg+xml;base64,...`
pub fn svg_data_url(markup: &str) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(markup.as_bytes());
    format!("data:{};base64,{}", SVG_MIME, b64)
}
