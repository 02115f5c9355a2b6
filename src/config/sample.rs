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

//! Sample catalog entries. Immutable after a pack scan.

use serde::{Deserialize, Serialize};

/// One `.wav` file discovered in a sample pack.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Sample {
    pub available: bool,
    pub name: String,
    pub relative_path: String,
    pub full_path: String,
    pub num_channels: u16,
    pub num_frames: u32,
    pub sample_rate: u32,
}
