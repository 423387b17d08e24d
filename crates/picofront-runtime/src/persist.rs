//! Save states and battery RAM on disk.
//!
//! Layout under the save root:
//!
//! ```text
//! mds/<game>.mds          state slot 0
//! mds/<game>.<n>.mds      state slots 1..=9
//! mds/<game>...mds.lz4    compressed variants
//! srm/<game>.srm          cartridge SRAM
//! brm/<game>.brm          Mega CD backup RAM
//! ```
//!
//! Files found directly under the root are accepted when loading.

use std::{
    fs,
    path::{Path, PathBuf},
};

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use tracing::{debug, info, warn};

use crate::{
    error::PersistError,
    platform::{BackupKind, EmuCore},
};

pub const SLOT_COUNT: u8 = 10;

const STATE_DIR: &str = "mds";
const SRAM_DIR: &str = "srm";
const BRAM_DIR: &str = "brm";
const COMPRESSED_EXT: &str = ".lz4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistKind {
    SaveState,
    LoadState,
    SaveBackup,
    LoadBackup,
}

impl PersistKind {
    pub fn is_load(self) -> bool {
        matches!(self, Self::LoadState | Self::LoadBackup)
    }
}

pub trait Persistence {
    fn save_or_load(
        &mut self,
        core: &mut dyn EmuCore,
        kind: PersistKind,
        slot: u8,
    ) -> Result<(), PersistError>;

    /// Whether a save state exists for `slot`.
    fn slot_used(&self, slot: u8) -> bool;
}

#[derive(Debug, Clone)]
pub struct SaveStore {
    root: PathBuf,
    game: String,
    compress: bool,
}

impl SaveStore {
    pub fn new(root: impl Into<PathBuf>, game: impl Into<String>, compress: bool) -> Self {
        Self {
            root: root.into(),
            game: game.into(),
            compress,
        }
    }

    /// Creates the save directories. Failures are logged, not returned.
    pub fn ensure_dirs(&self) {
        for dir in [STATE_DIR, SRAM_DIR, BRAM_DIR] {
            let path = self.root.join(dir);
            if path.is_dir() {
                continue;
            }
            if let Err(e) = fs::create_dir_all(&path) {
                warn!("failed to create {}: {e}", path.display());
            }
        }
    }

    fn state_name(&self, slot: u8, compressed: bool) -> String {
        let mut name = self.game.clone();
        if (1..SLOT_COUNT).contains(&slot) {
            name.push_str(&format!(".{slot}"));
        }
        name.push_str(".mds");
        if compressed {
            name.push_str(COMPRESSED_EXT);
        }
        name
    }

    fn state_save_path(&self, slot: u8) -> PathBuf {
        self.root
            .join(STATE_DIR)
            .join(self.state_name(slot, self.compress))
    }

    fn find_state(&self, slot: u8) -> Option<PathBuf> {
        [self.compress, !self.compress]
            .into_iter()
            .flat_map(|compressed| {
                let name = self.state_name(slot, compressed);
                [self.root.join(STATE_DIR).join(&name), self.root.join(name)]
            })
            .find(|p| p.is_file())
    }

    fn backup_paths(&self, kind: BackupKind) -> [PathBuf; 2] {
        let (dir, ext) = match kind {
            BackupKind::Sram => (SRAM_DIR, "srm"),
            BackupKind::Bram => (BRAM_DIR, "brm"),
        };
        let name = format!("{}.{ext}", self.game);
        [self.root.join(dir).join(&name), self.root.join(name)]
    }

    fn save_state(&self, core: &mut dyn EmuCore, slot: u8) -> Result<(), PersistError> {
        let path = self.state_save_path(slot);
        let data = core.save_state()?;
        let bytes = if self.compress {
            compress_prepend_size(&data)
        } else {
            data
        };
        write(&path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "state saved");
        Ok(())
    }

    fn load_state(&self, core: &mut dyn EmuCore, slot: u8) -> Result<(), PersistError> {
        let path = self
            .find_state(slot)
            .ok_or(PersistError::MissingFile { slot })?;
        let bytes = read(&path)?;
        let data = if path.to_string_lossy().ends_with(COMPRESSED_EXT) {
            decompress_size_prepended(&bytes).map_err(|e| PersistError::Decompress {
                path: path.clone(),
                error: e.to_string(),
            })?
        } else {
            bytes
        };
        core.load_state(&data)?;
        info!(path = %path.display(), "state loaded");
        Ok(())
    }

    fn save_backup(&self, core: &mut dyn EmuCore) -> Result<(), PersistError> {
        let Some((kind, data)) = core.backup_ram() else {
            return Ok(());
        };
        let [path, _] = self.backup_paths(kind);

        let bytes = match kind {
            BackupKind::Sram => {
                let used = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                if used == 0 {
                    debug!("SRAM is empty, not writing");
                    return Ok(());
                }
                data[..used].to_vec()
            }
            BackupKind::Bram => {
                // Keep whatever follows the backup RAM area in an existing file.
                let mut bytes = fs::read(&path).unwrap_or_default();
                if bytes.len() < data.len() {
                    bytes.resize(data.len(), 0);
                }
                bytes[..data.len()].copy_from_slice(data);
                bytes
            }
        };
        write(&path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "backup RAM saved");
        Ok(())
    }

    fn load_backup(&self, core: &mut dyn EmuCore) -> Result<(), PersistError> {
        let Some((kind, _)) = core.backup_ram() else {
            return Ok(());
        };
        let Some(path) = self.backup_paths(kind).into_iter().find(|p| p.is_file()) else {
            return Err(PersistError::MissingFile { slot: 0 });
        };
        let bytes = read(&path)?;
        core.load_backup_ram(&bytes);
        info!(path = %path.display(), "backup RAM loaded");
        Ok(())
    }
}

impl Persistence for SaveStore {
    fn save_or_load(
        &mut self,
        core: &mut dyn EmuCore,
        kind: PersistKind,
        slot: u8,
    ) -> Result<(), PersistError> {
        match kind {
            PersistKind::SaveState => self.save_state(core, slot),
            PersistKind::LoadState => self.load_state(core, slot),
            PersistKind::SaveBackup => self.save_backup(core),
            PersistKind::LoadBackup => self.load_backup(core),
        }
    }

    fn slot_used(&self, slot: u8) -> bool {
        self.find_state(slot).is_some()
    }
}

fn read(path: &Path) -> Result<Vec<u8>, PersistError> {
    fs::read(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PersistError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::CoreError,
        input::PadButtons,
        pacing::FrameMode,
        platform::{StatusSink, VideoMode},
    };

    struct MemCore {
        state: Vec<u8>,
        backup: Option<(BackupKind, Vec<u8>)>,
    }

    impl EmuCore for MemCore {
        fn run_frame(
            &mut self,
            _mode: FrameMode,
            _status: &mut dyn StatusSink,
        ) -> Result<&[i16], CoreError> {
            Ok(&[])
        }
        fn is_pal(&self) -> bool {
            false
        }
        fn video_mode(&self) -> VideoMode {
            VideoMode::default()
        }
        fn set_pads(&mut self, _pads: [PadButtons; 2]) {}
        fn reset(&mut self) {}
        fn save_state(&mut self) -> Result<Vec<u8>, CoreError> {
            Ok(self.state.clone())
        }
        fn load_state(&mut self, data: &[u8]) -> Result<(), CoreError> {
            self.state = data.to_vec();
            Ok(())
        }
        fn backup_ram(&self) -> Option<(BackupKind, &[u8])> {
            self.backup.as_ref().map(|(k, d)| (*k, d.as_slice()))
        }
        fn load_backup_ram(&mut self, data: &[u8]) {
            if let Some((_, ram)) = &mut self.backup {
                let n = data.len().min(ram.len());
                ram[..n].copy_from_slice(&data[..n]);
            }
        }
        fn backup_ram_changed(&self) -> bool {
            false
        }
        fn clear_backup_ram_changed(&mut self) {}
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "picofront-persist-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn core(state: &[u8]) -> MemCore {
        MemCore {
            state: state.to_vec(),
            backup: None,
        }
    }

    #[test]
    fn state_slots_round_trip_in_mds_dir() {
        let root = scratch("slots");
        let mut store = SaveStore::new(&root, "sonic", false);
        store.ensure_dirs();

        let mut c = core(b"slot three");
        store.save_or_load(&mut c, PersistKind::SaveState, 3).unwrap();
        assert!(root.join("mds/sonic.3.mds").is_file());
        assert!(store.slot_used(3));
        assert!(!store.slot_used(0));

        c.state.clear();
        store.save_or_load(&mut c, PersistKind::LoadState, 3).unwrap();
        assert_eq!(c.state, b"slot three");
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn compressed_saves_fall_back_to_plain_files() {
        let root = scratch("compress");
        let mut plain = SaveStore::new(&root, "game", false);
        let mut c = core(&[7; 512]);
        plain.save_or_load(&mut c, PersistKind::SaveState, 0).unwrap();

        let mut packed = SaveStore::new(&root, "game", true);
        c.state.clear();
        packed.save_or_load(&mut c, PersistKind::LoadState, 0).unwrap();
        assert_eq!(c.state, vec![7; 512]);

        c.state = vec![9; 512];
        packed.save_or_load(&mut c, PersistKind::SaveState, 0).unwrap();
        let path = root.join("mds/game.mds.lz4");
        assert!(fs::metadata(&path).unwrap().len() < 512);

        c.state.clear();
        packed.save_or_load(&mut c, PersistKind::LoadState, 0).unwrap();
        assert_eq!(c.state, vec![9; 512]);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_state_is_reported() {
        let root = scratch("missing");
        let mut store = SaveStore::new(&root, "nothing", false);
        let err = store
            .save_or_load(&mut core(b""), PersistKind::LoadState, 5)
            .unwrap_err();
        assert!(matches!(err, PersistError::MissingFile { slot: 5 }));
    }

    #[test]
    fn sram_save_trims_trailing_zeros_and_skips_empty() {
        let root = scratch("sram");
        let mut store = SaveStore::new(&root, "rpg", false);
        let mut c = MemCore {
            state: Vec::new(),
            backup: Some((BackupKind::Sram, vec![0; 64])),
        };
        store.save_or_load(&mut c, PersistKind::SaveBackup, 0).unwrap();
        assert!(!root.join("srm/rpg.srm").exists());

        if let Some((_, ram)) = &mut c.backup {
            ram[10] = 0xaa;
        }
        store.save_or_load(&mut c, PersistKind::SaveBackup, 0).unwrap();
        assert_eq!(fs::read(root.join("srm/rpg.srm")).unwrap().len(), 11);

        c.backup = Some((BackupKind::Sram, vec![0; 64]));
        store.save_or_load(&mut c, PersistKind::LoadBackup, 0).unwrap();
        assert_eq!(c.backup.as_ref().map(|(_, r)| r[10]), Some(0xaa));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn bram_save_keeps_trailing_file_data() {
        let root = scratch("bram");
        fs::create_dir_all(root.join("brm")).unwrap();
        fs::write(root.join("brm/cd.brm"), [1u8; 16]).unwrap();

        let mut store = SaveStore::new(&root, "cd", false);
        let mut c = MemCore {
            state: Vec::new(),
            backup: Some((BackupKind::Bram, vec![0; 8])),
        };
        store.save_or_load(&mut c, PersistKind::SaveBackup, 0).unwrap();
        let bytes = fs::read(root.join("brm/cd.brm")).unwrap();
        assert_eq!(&bytes[..8], &[0; 8]);
        assert_eq!(&bytes[8..], &[1; 8]);
        let _ = fs::remove_dir_all(&root);
    }
}
