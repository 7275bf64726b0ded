//! Preservation rules
//!
//! Loaded from the optional `preserve.yaml`. Two independent policies live
//! here:
//!
//! - **Managed files**: destinations that get a side-by-side `.old` copy
//!   when a deployment would overwrite them with different content
//! - **Customizable settings**: `key = value` lines a user is likely to have
//!   edited (keyboard layout, default terminal, ...) that can be carried
//!   over from the previous config into the freshly deployed one
//!
//! Without a preserve file neither policy applies.

use crate::context::InstallPaths;
use crate::error::ConfigError;
use chrono::Local;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// A `key = value` setting users commonly customize.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserSetting {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Key as it appears on the left of `=`
    pub pattern: String,
}

/// A destination under the backup-on-diff policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagedFile {
    /// Absolute or `~/` path
    pub path: String,
    /// Only `side_by_side` is acted on
    #[serde(default)]
    pub backup: String,
    /// Empty or `on_overwrite_diff`
    #[serde(default)]
    pub when: String,
    /// Number of old copies to keep; only one `.old` is written today
    #[serde(default)]
    pub keep: u32,
}

impl ManagedFile {
    pub fn backs_up_on_diff(&self) -> bool {
        self.backup.eq_ignore_ascii_case("side_by_side")
            && (self.when.is_empty() || self.when.eq_ignore_ascii_case("on_overwrite_diff"))
    }
}

/// Contents of `preserve.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PreservationConfig {
    pub version: String,
    pub user_customizable_settings: Vec<UserSetting>,
    pub managed_files: Vec<ManagedFile>,
    /// Values never worth restoring because they are the shipped defaults
    pub default_values: Vec<String>,
    /// Source-relative files eligible for settings restoration
    pub restorable_files: Vec<String>,
}

impl Default for PreservationConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            user_customizable_settings: Vec::new(),
            managed_files: Vec::new(),
            default_values: ["us", "ghostty", "brave", "Thunar"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            restorable_files: vec!["hypr/hyprland.conf".to_string()],
        }
    }
}

impl PreservationConfig {
    /// Load `path`, or the empty policy if it does not exist.
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            debug!("No preservation rules at {}", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        info!(
            "Loaded preservation rules v{}: {} setting(s), {} managed file(s)",
            config.version,
            config.user_customizable_settings.len(),
            config.managed_files.len()
        );
        Ok(config)
    }

    // ========================================================================
    // Managed files
    // ========================================================================

    /// The managed entry whose path is `target`, compared as absolute paths.
    pub fn managed_file(&self, target: &Path, paths: &InstallPaths) -> Option<&ManagedFile> {
        let target = normalize(target);
        self.managed_files
            .iter()
            .find(|m| normalize(&paths.expand_home(&m.path)) == target)
    }

    /// Whether overwriting `target` with different content needs a `.old` copy.
    pub fn backs_up_on_diff(&self, target: &Path, paths: &InstallPaths) -> bool {
        self.managed_file(target, paths)
            .is_some_and(ManagedFile::backs_up_on_diff)
    }

    // ========================================================================
    // Customizable settings
    // ========================================================================

    /// Whether `source_relative` (e.g. `hypr/hyprland.conf`) takes part in
    /// settings restoration.
    pub fn is_restorable(&self, source_relative: &Path) -> bool {
        self.restorable_files
            .iter()
            .any(|f| Path::new(f) == source_relative)
    }

    pub fn is_default_or_empty(&self, value: &str) -> bool {
        let value = value.trim();
        value.is_empty() || self.default_values.iter().any(|d| d == value)
    }

    /// Customizable settings present in `content`, keyed by setting name.
    pub fn extract_settings(&self, content: &str) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        for line in content.lines() {
            let Some((key, value)) = split_assignment(line) else {
                continue;
            };
            if let Some(setting) = self.setting_for_key(key) {
                if !self.is_default_or_empty(value) {
                    found.insert(setting.name.clone(), value.to_string());
                }
            }
        }
        found
    }

    /// Settings in `existing` whose value is absent from or different in
    /// `fresh`.
    pub fn customized_settings(&self, existing: &str, fresh: &str) -> BTreeMap<String, String> {
        if existing == fresh {
            return BTreeMap::new();
        }
        let fresh = self.extract_settings(fresh);
        self.extract_settings(existing)
            .into_iter()
            .filter(|(name, value)| fresh.get(name) != Some(value))
            .collect()
    }

    /// Rewrite matching lines of `content` with `settings`, keeping each
    /// line's indentation.
    pub fn apply_settings(&self, content: &str, settings: &BTreeMap<String, String>) -> String {
        if settings.is_empty() {
            return content.to_string();
        }
        let mut out: Vec<String> = Vec::new();
        for line in content.split('\n') {
            let replaced = split_assignment(line).and_then(|(key, _)| {
                let setting = self.setting_for_key(key)?;
                let value = settings.get(&setting.name)?;
                let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
                debug!("Restoring {} = {}", setting.name, value);
                Some(format!("{}{} = {}", indent, key, value))
            });
            out.push(replaced.unwrap_or_else(|| line.to_string()));
        }
        out.join("\n")
    }

    fn setting_for_key(&self, key: &str) -> Option<&UserSetting> {
        self.user_customizable_settings.iter().find(|s| {
            key == s.pattern
                || key
                    .strip_prefix(s.pattern.as_str())
                    .is_some_and(|rest| rest.starts_with(' '))
        })
    }
}

/// `(key, value)` for a non-comment `key = value` line.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Absolute, lexically cleaned path. Does not touch the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Copy `existing` to `cache_dir/YYYYMMDD_<name>`.
pub fn create_dated_backup(existing: &Path, cache_dir: &Path, name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(cache_dir)?;
    let backup = cache_dir.join(format!("{}_{}", Local::now().format("%Y%m%d"), name));
    fs::copy(existing, &backup)?;
    info!("Config backed up to {}", backup.display());
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RULES: &str = r#"
version: "2"
user_customizable_settings:
  - name: keyboard_layout
    description: Keyboard layout
    pattern: kb_layout
  - name: terminal
    pattern: $terminal
managed_files:
  - path: ~/.config/waybar/config
    backup: side_by_side
    when: on_overwrite_diff
    keep: 1
  - path: ~/.config/fish/config.fish
    backup: none
"#;

    fn rules() -> PreservationConfig {
        PreservationConfig::parse(RULES, Path::new("preserve.yaml")).expect("parse")
    }

    #[test]
    fn test_defaults_when_fields_absent() {
        let config = rules();
        assert_eq!(config.restorable_files, vec!["hypr/hyprland.conf"]);
        assert!(config.is_default_or_empty("ghostty"));
        assert!(config.is_default_or_empty("   "));
        assert!(!config.is_default_or_empty("kitty"));
    }

    #[test]
    fn test_missing_file_is_empty_policy() {
        let dir = TempDir::new().expect("tempdir");
        let config = PreservationConfig::load_optional(&dir.path().join("preserve.yaml"))
            .expect("load");
        assert!(config.managed_files.is_empty());
        assert!(config.user_customizable_settings.is_empty());
    }

    #[test]
    fn test_managed_file_match() {
        let config = rules();
        let paths = InstallPaths::from_home(Path::new("/home/riot"));

        assert!(config.backs_up_on_diff(Path::new("/home/riot/.config/waybar/config"), &paths));
        assert!(config.backs_up_on_diff(
            Path::new("/home/riot/.config/waybar/../waybar/config"),
            &paths
        ));
        assert!(!config.backs_up_on_diff(Path::new("/home/riot/.config/fish/config.fish"), &paths));
        assert!(!config.backs_up_on_diff(Path::new("/home/riot/.config/other"), &paths));
    }

    #[test]
    fn test_extract_skips_comments_and_defaults() {
        let config = rules();
        let content = "\
# kb_layout = de
input {
    kb_layout = fr
    kb_layout_extra = ignored
}
$terminal = ghostty
";
        let settings = config.extract_settings(content);
        assert_eq!(settings.len(), 1);
        assert_eq!(settings["keyboard_layout"], "fr");
    }

    #[test]
    fn test_customized_only_when_different() {
        let config = rules();
        let existing = "kb_layout = fr\n$terminal = kitty\n";
        let fresh = "kb_layout = us\n$terminal = kitty\n";
        let custom = config.customized_settings(existing, fresh);
        assert_eq!(custom.len(), 1);
        assert_eq!(custom["keyboard_layout"], "fr");

        assert!(config.customized_settings(existing, existing).is_empty());
    }

    #[test]
    fn test_apply_keeps_indentation() {
        let config = rules();
        let mut settings = BTreeMap::new();
        settings.insert("keyboard_layout".to_string(), "fr".to_string());

        let fresh = "input {\n\tkb_layout = us\n    follow_mouse = 1\n}\n";
        let applied = config.apply_settings(fresh, &settings);
        assert_eq!(applied, "input {\n\tkb_layout = fr\n    follow_mouse = 1\n}\n");
    }

    #[test]
    fn test_dated_backup() {
        let dir = TempDir::new().expect("tempdir");
        let existing = dir.path().join("hyprland.conf");
        fs::write(&existing, "kb_layout = fr\n").expect("write");

        let cache = dir.path().join("cache");
        let backup = create_dated_backup(&existing, &cache, "hyprland.conf").expect("backup");
        let name = backup.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.ends_with("_hyprland.conf"));
        assert_eq!(name.len(), "YYYYMMDD_hyprland.conf".len());
        assert_eq!(fs::read_to_string(&backup).expect("read"), "kb_layout = fr\n");
    }
}
