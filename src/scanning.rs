//! Directory scanning used when the host hands over a build output directory instead of an
//! in-memory asset list.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::BuildAsset;

/// Collect every file below `root` as a [`BuildAsset`].
///
/// Names are relative to `root` and always use forward slashes. Entries are visited in
/// sorted order so that repeated scans of the same tree produce the same discovery order,
/// which the bundle hash depends on.
pub fn collect_build_assets(root: &Path) -> io::Result<Vec<BuildAsset>> {
  let mut assets = Vec::new();
  collect_recursively(root, Path::new(""), &mut assets)?;
  Ok(assets)
}

fn collect_recursively(
  root: &Path,
  relative: &Path,
  assets: &mut Vec<BuildAsset>,
) -> io::Result<()> {
  let current = if relative.as_os_str().is_empty() {
    root.to_path_buf()
  } else {
    root.join(relative)
  };

  let mut entries = fs::read_dir(&current)?.collect::<io::Result<Vec<_>>>()?;
  entries.sort_by_key(|entry| entry.file_name());

  for entry in entries {
    let child_relative = if relative.as_os_str().is_empty() {
      PathBuf::from(entry.file_name())
    } else {
      relative.join(entry.file_name())
    };

    let file_type = entry.file_type()?;
    if file_type.is_dir() {
      collect_recursively(root, &child_relative, assets)?;
    } else if file_type.is_file() {
      let name = child_relative.to_string_lossy().replace('\\', "/");
      assets.push(BuildAsset::new(name, fs::read(entry.path())?));
    }
  }

  Ok(())
}
