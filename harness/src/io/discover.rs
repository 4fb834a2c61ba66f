//! Target discovery: `<root>/<language>/<template>`.
//!
//! Languages are listed up front (this is also where a bad root is rejected);
//! each language's templates are read only when iteration reaches it.

use std::fs;
use std::path::{Path, PathBuf};
use std::vec;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::core::exclusions::is_excluded;
use crate::core::types::Target;

/// Lazy, single-pass sequence of discovered targets in sorted name order.
#[derive(Debug)]
pub struct Discovery {
    languages: vec::IntoIter<(String, PathBuf)>,
    current: Option<(String, vec::IntoIter<(String, PathBuf)>)>,
}

impl Iterator for Discovery {
    type Item = Target;

    fn next(&mut self) -> Option<Target> {
        loop {
            if let Some((language, templates)) = &mut self.current
                && let Some((template, source_dir)) = templates.next()
            {
                return Some(Target::new(language.clone(), template, source_dir));
            }

            let (language, dir) = self.languages.next()?;
            match sorted_subdirs(&dir) {
                Ok(templates) => {
                    debug!(language = %language, templates = templates.len(), "language discovered");
                    self.current = Some((language, templates.into_iter()));
                }
                Err(err) => {
                    warn!(language = %language, err = %format!("{err:#}"), "skipping unreadable language dir");
                    self.current = None;
                }
            }
        }
    }
}

/// Start discovering targets under `root`.
///
/// Fails if `root` is missing or not a directory. Language directories that are
/// hidden, built-in meta directories, or listed in `extra_excludes` are skipped.
pub fn discover_targets(root: &Path, extra_excludes: &[String]) -> Result<Discovery> {
    if !root.exists() {
        bail!("templates root {} does not exist", root.display());
    }
    if !root.is_dir() {
        bail!("templates root {} is not a directory", root.display());
    }

    let languages: Vec<_> = sorted_subdirs(root)?
        .into_iter()
        .filter(|(name, _)| {
            let excluded = is_excluded(name, extra_excludes);
            if excluded {
                debug!(dir = %name, "excluded from discovery");
            }
            !excluded
        })
        .collect();

    Ok(Discovery {
        languages: languages.into_iter(),
        current: None,
    })
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %path.display(), "skipping non-utf8 directory name");
            continue;
        };
        dirs.push((name, path));
    }
    dirs.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(dirs)
}
