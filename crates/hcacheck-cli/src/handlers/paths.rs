//! `hcacheck paths`: show every resolved directory, root and URL.
//!
//! Useful when a spec is not picked up: it prints the same resolution the
//! other commands use, in `key = value` form.

use std::path::Path;

use anyhow::Result;
use hcacheck_core::paths::{
    cluster_name, default_settings_file, host_identity, resolve_dev_spec_dir, spec_file_name,
};
use hcacheck_core::{Settings, resolve_spec_dir};

use crate::presentation::format_optional;

/// Resolved locations as `(key, value)` rows.
pub fn rows(settings: &Settings, settings_file: Option<&Path>) -> Vec<(&'static str, String)> {
    let spec_dir = resolve_spec_dir(settings);
    let identity = host_identity(settings);
    let cluster = cluster_name(&identity);
    let settings_file = settings_file
        .map(Path::to_path_buf)
        .or_else(|| default_settings_file().ok());

    vec![
        (
            "settings_file",
            format_optional(&settings_file.map(|p| p.display().to_string()), "(none)"),
        ),
        (
            "spec_dir",
            format!("{} ({})", spec_dir.path.display(), spec_dir.source),
        ),
        (
            "dev_spec_dir",
            resolve_dev_spec_dir(settings).display().to_string(),
        ),
        ("spec_url", format_optional(&settings.spec_url, "(none)")),
        ("sysfs_root", settings.effective_sysfs_root().to_string()),
        ("procfs_root", settings.effective_procfs_root().to_string()),
        ("host_identity", identity),
        ("spec_file", spec_file_name(&cluster)),
        ("cluster", cluster),
    ]
}

pub fn execute(settings: &Settings, settings_file: Option<&Path>) -> Result<()> {
    for (key, value) in rows(settings, settings_file) {
        println!("{key} = {value}");
    }
    Ok(())
}
