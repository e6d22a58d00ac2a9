use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_PATH: &str = "userconfig.cfg";
const HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub flags_folder: PathBuf,
    pub answers_path: PathBuf,
    /// (score, total, unix timestamp), newest first.
    pub score_history: Vec<(u32, u32, i64)>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            flags_folder: PathBuf::from("flags"),
            answers_path: PathBuf::from("csv").join("valid_answers.csv"),
            score_history: Vec::new(),
        }
    }
}

impl UserConfig {
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(Path::new(CONFIG_PATH))
    }

    fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn record_score(&mut self, score: u32, total: u32) {
        let timestamp = chrono::Utc::now().timestamp();
        self.score_history.insert(0, (score, total, timestamp));
        self.score_history.truncate(HISTORY_LEN);
    }
}
