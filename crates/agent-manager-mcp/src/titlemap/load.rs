use anyhow::Context as _;

use super::default::default_titles;
use super::{RawTitleFile, TitleMap};

/// Parse an override file. Its entries extend (and win over) the defaults.
pub fn from_toml_str(s: &str) -> anyhow::Result<TitleMap> {
    let raw: RawTitleFile = toml::from_str(s)?;
    let mut by_folder = default_titles();
    for (folder, title) in raw.titles {
        by_folder.insert(strip(&folder), title);
    }
    Ok(TitleMap { by_folder })
}

pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<TitleMap> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read title map {}", path.display()))?;
    from_toml_str(&content)
}

pub fn load_default() -> TitleMap {
    TitleMap {
        by_folder: default_titles(),
    }
}

fn strip(folder: &str) -> String {
    folder.strip_prefix('-').unwrap_or(folder).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_extend_defaults() {
        let toml = r#"
[titles]
"-web" = "Web Platform"
"backend-ecosystems" = "Programming Languages"
"#;
        let m = from_toml_str(toml).expect("parse ok");
        assert_eq!(m.folder_title("-web"), "Web Platform");
        assert_eq!(m.folder_title("backend-ecosystems"), "Programming Languages");
        assert_eq!(m.folder_title("10-testing"), "07 Testing");
    }

    #[test]
    fn default_and_fallback_titles() {
        let m = load_default();
        assert_eq!(m.folder_title("-signal-processing"), "Military & Defense Systems");
        assert_eq!(m.folder_title("data-science"), "Data Science");
        assert_eq!(m.phase_title("-01-02-requirements-analysis"), "Requirements Analysis");
        assert_eq!(m.phase_title("10-testing"), "Testing");
    }

    #[test]
    fn load_from_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_file(&dir.path().join("absent.toml")).is_err());
    }
}
