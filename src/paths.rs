use anyhow::{Result, anyhow};
use std::{
    env,
    path::{Path, PathBuf},
};

/// `$XDG_CONFIG_HOME/.gitfleet`, falling back to `$HOME/.config/.gitfleet`.
pub fn gitfleet_home() -> Result<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => home_dir()?.join(".config"),
    };
    Ok(base.join(".gitfleet"))
}

/// Default `config.toml` location inside the gitfleet home.
pub fn config_path() -> Result<PathBuf> {
    Ok(gitfleet_home()?.join("config.toml"))
}

fn home_dir() -> Result<PathBuf> {
    env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("HOME is not set"))
}

/// Expand a leading `~` and resolve relative paths against `base`.
pub fn resolve_path(raw: &str, base: &Path) -> Result<PathBuf> {
    let p = if raw == "~" {
        home_dir()?
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home_dir()?.join(rest)
    } else {
        PathBuf::from(raw)
    };
    Ok(if p.is_relative() { base.join(p) } else { p })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set(key: &str, val: Option<&str>) {
        // SAFETY: tests touching the environment are #[serial].
        unsafe {
            match val {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }

    #[test]
    #[serial]
    fn home_prefers_xdg_config_home() {
        set("XDG_CONFIG_HOME", Some("/xdg"));
        assert_eq!(gitfleet_home().unwrap(), PathBuf::from("/xdg/.gitfleet"));
        assert_eq!(
            config_path().unwrap(),
            PathBuf::from("/xdg/.gitfleet/config.toml")
        );
        set("XDG_CONFIG_HOME", None);
    }

    #[test]
    #[serial]
    fn home_falls_back_to_dot_config() {
        let old_home = env::var("HOME").ok();
        set("XDG_CONFIG_HOME", None);
        set("HOME", Some("/home/alice"));
        assert_eq!(
            gitfleet_home().unwrap(),
            PathBuf::from("/home/alice/.config/.gitfleet")
        );
        set("HOME", old_home.as_deref());
    }

    #[test]
    #[serial]
    fn resolve_path_expands_tilde_and_relative() {
        let old_home = env::var("HOME").ok();
        set("HOME", Some("/home/alice"));
        let base = Path::new("/etc/gitfleet");
        assert_eq!(
            resolve_path("~/src/web", base).unwrap(),
            PathBuf::from("/home/alice/src/web")
        );
        assert_eq!(resolve_path("~", base).unwrap(), PathBuf::from("/home/alice"));
        assert_eq!(
            resolve_path("repos/api", base).unwrap(),
            PathBuf::from("/etc/gitfleet/repos/api")
        );
        assert_eq!(resolve_path("/abs", base).unwrap(), PathBuf::from("/abs"));
        set("HOME", old_home.as_deref());
    }
}
