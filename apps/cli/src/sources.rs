//! Sources file loading for `leadharvest run`.
//!
//! Two shapes are accepted: a JSON array of tagged descriptors, or plain
//! text with one website URL per line (blank lines and `#` comments skipped).

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use leadharvest_shared::SourceDescriptor;

/// Read and parse a sources file, resolving relative dataset paths against
/// the file's directory.
pub(crate) fn load_sources(path: &Path, max_sources: usize) -> Result<Vec<SourceDescriptor>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read sources file '{}'", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let sources = parse_sources(&text)
        .wrap_err_with(|| format!("invalid sources file '{}'", path.display()))?
        .into_iter()
        .map(|s| resolve_relative(s, base))
        .collect::<Vec<_>>();

    if sources.is_empty() {
        return Err(eyre!("sources file '{}' lists no sources", path.display()));
    }
    if max_sources > 0 && sources.len() > max_sources {
        return Err(eyre!(
            "{} sources exceed max_sources_per_batch ({max_sources}); split the file or raise the limit",
            sources.len()
        ));
    }
    Ok(sources)
}

pub(crate) fn parse_sources(text: &str) -> Result<Vec<SourceDescriptor>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).wrap_err("malformed source descriptor JSON");
    }

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(SourceDescriptor::website)
        .collect())
}

fn resolve_relative(source: SourceDescriptor, base: &Path) -> SourceDescriptor {
    match source {
        SourceDescriptor::Dataset { path, format } if path.is_relative() => {
            SourceDescriptor::Dataset {
                path: base.join(path),
                format,
            }
        }
        other => other,
    }
}
