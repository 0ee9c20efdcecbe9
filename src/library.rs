//! In-memory working directory of MJCF scene files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::ViewerError;

/// Scene loaded when nothing else is requested.
pub const DEFAULT_SCENE: &str = "simple.xml";

/// Scenes compiled into the binary.
pub const BUNDLED_SCENES: [(&str, &str); 3] = [
    ("simple.xml", include_str!("../scenes/simple.xml")),
    ("pendulum.xml", include_str!("../scenes/pendulum.xml")),
    (
        "model_with_tendon.xml",
        include_str!("../scenes/model_with_tendon.xml"),
    ),
];

/// Display names offered to users, paired with library file names.
///
/// Entries that are not bundled are fetched by the web shell on demand.
pub const SCENE_MENU: [(&str, &str); 11] = [
    ("Simple", "simple.xml"),
    ("Pendulum", "pendulum.xml"),
    ("Tendon", "model_with_tendon.xml"),
    ("Humanoid", "humanoid.xml"),
    ("Cassie", "agility_cassie/scene.xml"),
    ("Hammock", "hammock.xml"),
    ("Balloons", "balloons.xml"),
    ("Hand", "shadow_hand/scene_right.xml"),
    ("Flag", "flag.xml"),
    ("Mug", "mug.xml"),
    ("Slider crank", "slider_crank.xml"),
];

/// Scene files keyed by their path relative to the library root.
#[derive(Debug, Clone, Default)]
pub struct SceneLibrary {
    files: BTreeMap<String, String>,
}

impl SceneLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library holding the scenes compiled into the crate.
    pub fn bundled() -> Self {
        let mut library = Self::new();
        for (name, xml) in BUNDLED_SCENES {
            library.write_file(name, xml);
        }
        library
    }

    /// Reads every `.xml` file below `dir`, keyed by its `/`-separated
    /// relative path.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ViewerError> {
        let dir = dir.as_ref();
        let mut library = Self::new();
        library.scan(dir, dir)?;
        info!("Read {} scene file(s) from {}", library.len(), dir.display());
        Ok(library)
    }

    fn scan(&mut self, root: &Path, dir: &Path) -> Result<(), ViewerError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.scan(root, &path)?;
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("xml") {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let text = fs::read_to_string(&path)?;
            self.write_file(name, text);
        }
        Ok(())
    }

    /// Stores `content` under `name`, replacing any previous file.
    pub fn write_file(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        debug!("writing {name} to the scene library");
        self.files.insert(name, content.into());
    }

    pub fn read(&self, name: &str) -> Result<&str, ViewerError> {
        self.files
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ViewerError::SceneNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
