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

//! Sample pack discovery.
//!
//! A pack is a top-level directory under the pack root; its samples are
//! all `.wav` files found by recursive scan, sorted by relative path.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sample::Sample;

/// A directory of samples under the pack root.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplePack {
    pub name: String,
    pub path: String,
    pub samples: Vec<Sample>,
}

/// Scans the pack root and returns one pack per top-level directory.
/// A missing root yields an empty list rather than an error.
pub fn scan_packs(root: &Path) -> Result<Vec<SamplePack>, Box<dyn Error>> {
    let mut packs = Vec::new();
    if !root.is_dir() {
        warn!(root = %root.display(), "Sample pack root does not exist");
        return Ok(packs);
    }

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let samples = scan_sample_folder(&path)?;
        debug!(pack = name, samples = samples.len(), "Scanned sample pack");
        packs.push(SamplePack {
            name,
            path: path.to_string_lossy().into_owned(),
            samples,
        });
    }

    packs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(packs)
}

/// Recursively collects all `.wav` files under `path`, sorted by their
/// path relative to it.
pub fn scan_sample_folder(path: &Path) -> Result<Vec<Sample>, Box<dyn Error>> {
    let mut samples = Vec::new();
    collect_wavs(path, path, &mut samples)?;
    samples.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(samples)
}

fn collect_wavs(root: &Path, dir: &Path, out: &mut Vec<Sample>) -> Result<(), Box<dyn Error>> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_wavs(root, &path, out)?;
            continue;
        }
        if path.extension().is_some_and(|ext| ext == "wav") {
            out.push(read_sample_entry(root, &path));
        }
    }
    Ok(())
}

/// Builds a catalog entry for a single `.wav` file. Files hound cannot
/// open are kept in the catalog but marked unavailable.
fn read_sample_entry(root: &Path, path: &Path) -> Sample {
    let relative = path
        .strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf());
    let name = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let mut sample = Sample {
        available: false,
        name,
        relative_path: relative.to_string_lossy().into_owned(),
        full_path: path.to_string_lossy().into_owned(),
        num_channels: 0,
        num_frames: 0,
        sample_rate: 0,
    };

    match hound::WavReader::open(path) {
        Ok(reader) => {
            let spec = reader.spec();
            sample.available = true;
            sample.num_channels = spec.channels;
            sample.num_frames = reader.duration();
            sample.sample_rate = spec.sample_rate;
        }
        Err(e) => {
            warn!(path = %path.display(), err = %e, "Unreadable wav file in pack");
        }
    }

    sample
}
