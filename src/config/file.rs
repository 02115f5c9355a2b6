// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Reading and writing the persisted JSON configuration.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::Config;

/// Returns the default config file location, `$HOME/.mck/sampler/config.json`.
pub fn default_config_path() -> Result<PathBuf, Box<dyn Error>> {
    let home = dirs::home_dir().ok_or("unable to determine the home directory")?;
    Ok(home.join(".mck").join("sampler").join("config.json"))
}

/// Returns the default sample pack root, `$HOME/.local/share/mck/sampler/`.
pub fn default_pack_path() -> Result<PathBuf, Box<dyn Error>> {
    let home = dirs::home_dir().ok_or("unable to determine the home directory")?;
    Ok(home
        .join(".local")
        .join("share")
        .join("mck")
        .join("sampler"))
}

/// Loads the configuration from disk and repairs its invariants.
/// A missing or unreadable file yields the default configuration.
pub fn load(path: &Path) -> Config {
    let mut config = match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Config>(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "Malformed config file, using defaults");
                Config::default()
            }
        },
        Err(_) => {
            info!(path = %path.display(), "No config file found, using defaults");
            Config::default()
        }
    };
    config.repair();
    config
}

/// Persists the configuration as JSON, creating parent directories as needed.
pub fn save(path: &Path, config: &Config) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NUM_PADS;
    use crate::testutil;

    #[test]
    fn test_load_missing_file_defaults() {
        let config = load(Path::new("/nonexistent/padtrack/config.json"));
        assert_eq!(config.pads.len(), NUM_PADS);
        assert_eq!(config.num_pads, NUM_PADS);
    }

    #[test]
    fn test_round_trip_with_repair() {
        let dir = testutil::temp_dir("config_round_trip");
        let path = dir.join("config.json");

        let mut config = Config::default();
        config.tempo = 140.0;
        config.pads[2].tone = 38;
        config.pads[2].gain = -6.0;
        config.pads[2].patterns[0].steps[0].active = true;
        save(&path, &config).unwrap();

        let loaded = load(&path);
        assert_eq!(loaded.tempo, 140.0);
        assert_eq!(loaded.pads[2].tone, 38);
        assert_eq!(loaded.pads[2].gain, -6.0);
        assert!(loaded.pads[2].patterns[0].steps[0].active);
        assert_eq!(loaded.pads.len(), NUM_PADS);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_repairs_out_of_range_values() {
        let dir = testutil::temp_dir("config_repair");
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{"tempo":120,"midiChan":99,"pads":[{"gain":40.0,"pan":250.0}]}"#,
        )
        .unwrap();

        let loaded = load(&path);
        assert_eq!(loaded.pads.len(), NUM_PADS);
        assert_eq!(loaded.midi_chan, 15);
        assert_eq!(loaded.pads[0].gain, crate::dsp::GAIN_DB_MAX);
        assert_eq!(loaded.pads[0].pan, 100.0);

        std::fs::remove_dir_all(dir).ok();
    }
}
