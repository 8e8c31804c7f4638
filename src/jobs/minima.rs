use crate::core::error::Result;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Finds reference minima of a species computed in an earlier run.
pub trait MinimaLookup {
    fn find(&self, species: &str) -> Option<PathBuf>;
}

/// Searches `<root>/<run>/<slab_name>/minima/<species>` across earlier run
/// directories, in name order, for the first non-empty match.
#[derive(Debug, Clone)]
pub struct DirectoryMinimaLookup {
    pub root: PathBuf,
    pub slab_name: String,
}

impl DirectoryMinimaLookup {
    pub fn new(root: impl Into<PathBuf>, slab_name: impl Into<String>) -> Self {
        Self { root: root.into(), slab_name: slab_name.into() }
    }
}

impl MinimaLookup for DirectoryMinimaLookup {
    fn find(&self, species: &str) -> Option<PathBuf> {
        let mut runs: Vec<PathBuf> = fs::read_dir(&self.root)
            .ok()?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        runs.sort();

        runs.into_iter()
            .map(|run| run.join(&self.slab_name).join("minima").join(species))
            .find(|candidate| {
                fs::read_dir(candidate)
                    .map(|mut entries| entries.next().is_some())
                    .unwrap_or(false)
            })
    }
}

/// Copies previously computed minima of each species into `dst/<species>`.
/// Species without earlier results are skipped, as are destinations that
/// already exist. Returns the species that were copied.
pub fn copy_previous_minima<L: MinimaLookup>(lookup: &L, species: &[String], dst: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    for name in species {
        let Some(source) = lookup.find(name) else {
            debug!("No earlier minima for {}", name);
            continue;
        };
        let target = dst.join(name);
        if target.exists() {
            info!("All required files already exist.");
            continue;
        }
        copy_tree(&source, &target)?;
        info!("Reusing minima of {} from {:?}", name, source);
        copied.push(name.clone());
    }
    Ok(copied)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&path, &target)?;
        } else {
            fs::copy(&path, &target)?;
        }
    }
    Ok(())
}
