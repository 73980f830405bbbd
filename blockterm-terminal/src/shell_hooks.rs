//! Prompt hooks that make bash, zsh and fish report block boundaries.
//!
//! The scripts are embedded with `include_str!`, written under a directory
//! owned by blockterm, and loaded without touching the user's startup files:
//!
//! - bash: `--rcfile` pointing at a script that sources the usual rc files first
//! - zsh: `ZDOTDIR` pointing at a `.zshenv` that restores the user's `ZDOTDIR`
//! - fish: `--init-command` sourcing the hook script
//!
//! Once loaded, each prompt emits OSC 133 `A`/`B`, each command `C` and
//! `D;<status>`, and the working directory is reported with OSC 7.

use crate::session::SpawnOptions;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const BASH_SCRIPT: &str = include_str!("../shell_integration/blockterm.bash");
const ZSH_ENV_SCRIPT: &str = include_str!("../shell_integration/zshenv.zsh");
const ZSH_SCRIPT: &str = include_str!("../shell_integration/blockterm.zsh");
const FISH_SCRIPT: &str = include_str!("../shell_integration/blockterm.fish");

/// Set for bash when the `-l` flag was replaced by `--rcfile`.
pub const BASH_LOGIN_ENV: &str = "BLOCKTERM_BASH_LOGIN";
/// The user's own `ZDOTDIR`, handed back by our `.zshenv`.
pub const ZSH_USER_ZDOTDIR_ENV: &str = "BLOCKTERM_USER_ZDOTDIR";
/// Path of the zsh hook script, read by our `.zshenv`.
pub const ZSH_HOOKS_ENV: &str = "BLOCKTERM_ZSH_HOOKS";

/// Shells with a hook script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
}

impl ShellKind {
    /// Classify a shell by the file name of its program (`/usr/bin/zsh`, `-bash`).
    pub fn detect(shell: &str) -> Option<Self> {
        let name = Path::new(shell).file_name()?.to_str()?;
        let name = name.trim_start_matches('-');
        match name {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            _ => None,
        }
    }
}

/// Installs the hook scripts and wires them into spawn options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellIntegration {
    dir: PathBuf,
}

impl ShellIntegration {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bash_rcfile(&self) -> PathBuf {
        self.dir.join("bash").join("blockterm.bash")
    }

    pub fn zsh_dotdir(&self) -> PathBuf {
        self.dir.join("zsh")
    }

    pub fn fish_script(&self) -> PathBuf {
        self.dir.join("fish").join("blockterm.fish")
    }

    /// Write every hook script. Files already holding the current text are
    /// left alone.
    pub fn install(&self) -> io::Result<()> {
        write_if_changed(&self.bash_rcfile(), BASH_SCRIPT)?;
        write_if_changed(&self.zsh_dotdir().join(".zshenv"), ZSH_ENV_SCRIPT)?;
        write_if_changed(&self.zsh_dotdir().join("blockterm.zsh"), ZSH_SCRIPT)?;
        write_if_changed(&self.fish_script(), FISH_SCRIPT)?;
        Ok(())
    }

    /// Install the scripts and rewrite `options` so the shell loads them.
    pub fn apply(&self, options: SpawnOptions) -> io::Result<SpawnOptions> {
        if ShellKind::detect(&options.shell).is_none() {
            return Ok(options);
        }
        self.install()?;
        Ok(self.inject(options))
    }

    /// Rewrite `options` to load the hooks. Unknown shells, and invocations
    /// that run a script or skip startup files, are returned unchanged.
    pub fn inject(&self, mut options: SpawnOptions) -> SpawnOptions {
        let Some(kind) = ShellKind::detect(&options.shell) else {
            return options;
        };

        match kind {
            ShellKind::Bash => {
                let login = options.args.iter().any(|a| a == "-l" || a == "--login");
                let rest: Vec<&String> = options
                    .args
                    .iter()
                    .filter(|a| !matches!(a.as_str(), "-l" | "--login" | "-i"))
                    .collect();
                if !rest.is_empty() {
                    log::debug!("Not hooking bash started with {:?}", options.args);
                    return options;
                }
                options.args = vec![
                    "--rcfile".to_string(),
                    self.bash_rcfile().display().to_string(),
                ];
                if login {
                    options.env.insert(BASH_LOGIN_ENV.to_string(), "1".to_string());
                }
            }
            ShellKind::Zsh => {
                let skips = options
                    .args
                    .iter()
                    .any(|a| a == "-c" || a == "-f" || a == "--no-rcs" || !a.starts_with('-'));
                if skips {
                    log::debug!("Not hooking zsh started with {:?}", options.args);
                    return options;
                }
                let user_zdotdir = options
                    .env
                    .get("ZDOTDIR")
                    .cloned()
                    .or_else(|| std::env::var("ZDOTDIR").ok());
                if let Some(user) = user_zdotdir {
                    options.env.insert(ZSH_USER_ZDOTDIR_ENV.to_string(), user);
                }
                options.env.insert(
                    "ZDOTDIR".to_string(),
                    self.zsh_dotdir().display().to_string(),
                );
                options.env.insert(
                    ZSH_HOOKS_ENV.to_string(),
                    self.zsh_dotdir().join("blockterm.zsh").display().to_string(),
                );
            }
            ShellKind::Fish => {
                let skips = options.args.iter().any(|a| {
                    matches!(a.as_str(), "-c" | "--command" | "-N" | "--no-config")
                        || !a.starts_with('-')
                });
                if skips {
                    log::debug!("Not hooking fish started with {:?}", options.args);
                    return options;
                }
                options.args.push("--init-command".to_string());
                options.args.push(format!(
                    "source {}",
                    fish_quote(&self.fish_script().display().to_string())
                ));
            }
        }

        log::debug!("Shell integration enabled for {:?}", kind);
        options
    }
}

fn write_if_changed(path: &Path, content: &str) -> io::Result<()> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Rename into place so a shell starting concurrently never sources half a file.
    let tmp = path.with_extension(format!("tmp{}", std::process::id()));
    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    log::info!("Installed shell integration script {}", path.display());
    Ok(())
}

/// Single-quote `text` for fish.
fn fish_quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}
