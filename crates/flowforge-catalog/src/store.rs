//! Durable on-disk layout (spec §6.3): one directory per generation, a
//! pointer file naming the active one, atomic rename performs the swap.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::generation::CatalogGeneration;

pub struct CatalogStore {
    root: PathBuf,
}

impl CatalogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn current_pointer(&self) -> PathBuf {
        self.root.join("CURRENT")
    }

    fn generation_dir(&self, id: u64) -> PathBuf {
        self.root.join(format!("gen-{id}"))
    }

    /// Loads the generation named by the `CURRENT` pointer, if any.
    pub fn load_current(&self) -> Result<Option<CatalogGeneration>> {
        let pointer = self.current_pointer();
        if !pointer.exists() {
            return Ok(None);
        }
        let id: u64 = std::fs::read_to_string(&pointer)
            .context("reading CURRENT pointer")?
            .trim()
            .parse()
            .context("parsing CURRENT pointer as generation id")?;
        let path = self.generation_dir(id).join("descriptors.json");
        let bytes = std::fs::read(&path).context("reading generation descriptors")?;
        let generation: CatalogGeneration =
            serde_json::from_slice(&bytes).context("deserializing generation")?;
        Ok(Some(generation))
    }

    /// Two-phase commit: write the full generation under a scratch
    /// directory, then atomically rename the pointer. A failure between the
    /// write and the rename leaves no visible change — the scratch
    /// directory is simply an uncommitted generation directory that the
    /// next successful refresh's id will never collide with.
    pub fn commit(&self, generation: &CatalogGeneration) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let dir = self.generation_dir(generation.generation_id);
        std::fs::create_dir_all(&dir)?;
        let scratch = dir.join("descriptors.json.tmp");
        std::fs::write(&scratch, serde_json::to_vec_pretty(generation)?)?;
        std::fs::rename(&scratch, dir.join("descriptors.json"))?;

        let pointer_tmp = self.root.join("CURRENT.tmp");
        std::fs::write(&pointer_tmp, generation.generation_id.to_string())?;
        std::fs::rename(&pointer_tmp, self.current_pointer())?;
        Ok(())
    }
}

pub fn default_state_dir(state_dir: &str) -> PathBuf {
    Path::new(state_dir).join("catalog")
}
