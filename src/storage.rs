// Copyright 2026 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

/// System-wide storage directory, created on first use.
///
/// Uses the platform data directory (XDG_DATA_HOME on Linux, %APPDATA% on
/// Windows), except on macOS where `dirs::data_dir` maps to
/// `~/Library/Application Support` and we keep `~/.local/share` instead.
pub fn get_system_storage_dir() -> Result<PathBuf> {
    let data_dir = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".local/share")
    } else {
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Unable to determine data directory"))?
    };

    let base_dir = data_dir.join("webrag");
    fs::create_dir_all(&base_dir)?;
    Ok(base_dir)
}

/// Get the database path for the chunk index
pub fn get_index_path() -> Result<PathBuf> {
    Ok(get_system_storage_dir()?.join("index"))
}

/// Get the system config file path
/// Stored directly under ~/.local/share/webrag/ on all systems
pub fn get_system_config_path() -> Result<PathBuf> {
    let system_dir = get_system_storage_dir()?;
    Ok(system_dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_app_data_dir() {
        let dir = get_system_storage_dir().unwrap();
        assert!(dir.ends_with("webrag"));
        assert!(dir.is_dir());

        assert!(get_index_path().unwrap().ends_with("webrag/index"));
        assert!(get_system_config_path()
            .unwrap()
            .ends_with("webrag/config.toml"));
    }
}
