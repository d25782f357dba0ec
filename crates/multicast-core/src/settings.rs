//! Launcher settings exchanged with the host front end.
//!
//! Two scopes exist: project settings, which may defer to the application
//! (IDE-wide) settings, and application settings, which additionally pick an
//! optional custom JDK. Paths are persisted in a platform-independent form
//! (`/` separators) and converted back to the platform form for display.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MulticastError, Result};

/// Convert a path to the persisted form: every `\` becomes `/`.
pub fn to_system_independent(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a persisted path back to the platform's separator.
pub fn to_system_dependent(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', std::path::MAIN_SEPARATOR_STR)
    }
}

/// Resolve a relative path against the current directory. Empty stays empty.
pub fn absolute_path(path: &str) -> String {
    if path.is_empty() || Path::new(path).is_absolute() {
        return path.to_string();
    }
    match std::env::current_dir() {
        Ok(cwd) => to_system_independent(&cwd.join(path).to_string_lossy()),
        Err(_) => path.to_string(),
    }
}

/// Form shown to the user: absolute, with platform separators.
pub fn display_path(path: &str) -> String {
    to_system_dependent(&absolute_path(path))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Defer to [`ApplicationSettings`] instead of the values below.
    #[serde(default)]
    pub use_application_settings: bool,
    #[serde(default)]
    pub launcher_jar_path: String,
    #[serde(default)]
    pub vm_parameters: String,
}

impl ProjectSettings {
    pub fn set_launcher_jar_path(&mut self, path: &str) {
        self.launcher_jar_path = to_system_independent(path);
    }

    pub fn display_launcher_jar_path(&self) -> String {
        display_path(&self.launcher_jar_path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    #[serde(default)]
    pub launcher_jar_path: String,
    #[serde(default)]
    pub vm_parameters: String,
    #[serde(default)]
    pub use_custom_jdk: bool,
    #[serde(default)]
    pub jdk_home: String,
}

impl ApplicationSettings {
    pub fn set_launcher_jar_path(&mut self, path: &str) {
        self.launcher_jar_path = to_system_independent(path);
    }

    pub fn display_launcher_jar_path(&self) -> String {
        display_path(&self.launcher_jar_path)
    }
}

/// The values a launcher actually runs with after scope resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub launcher_jar_path: String,
    pub vm_parameters: String,
    /// Set only when a custom JDK is enabled and a home path was given.
    pub jdk_home: Option<String>,
}

/// Both settings scopes, as persisted in one settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(default)]
    pub project: ProjectSettings,
    #[serde(default)]
    pub application: ApplicationSettings,
}

impl LauncherSettings {
    /// Resolve the project/application split into one set of values.
    pub fn effective(&self) -> EffectiveSettings {
        let (launcher_jar_path, vm_parameters) = if self.project.use_application_settings {
            (
                &self.application.launcher_jar_path,
                &self.application.vm_parameters,
            )
        } else {
            (&self.project.launcher_jar_path, &self.project.vm_parameters)
        };

        let jdk_home = (self.application.use_custom_jdk
            && !self.application.jdk_home.trim().is_empty())
        .then(|| self.application.jdk_home.clone());

        EffectiveSettings {
            launcher_jar_path: to_system_dependent(launcher_jar_path),
            vm_parameters: vm_parameters.clone(),
            jdk_home,
        }
    }

    /// True if `other` differs from `self` in any persisted field.
    pub fn is_modified(&self, other: &LauncherSettings) -> bool {
        self != other
    }

    /// Load settings from a TOML file with MULTICAST_SETTINGS_* env overrides.
    ///
    /// A missing file yields empty settings. Loaded paths are normalised to
    /// the persisted form.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings: LauncherSettings = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("MULTICAST_SETTINGS_").split("__"))
            .extract()
            .map_err(|e| MulticastError::Settings(e.to_string()))?;

        let project_path = settings.project.launcher_jar_path.clone();
        settings.project.set_launcher_jar_path(&project_path);
        let application_path = settings.application.launcher_jar_path.clone();
        settings.application.set_launcher_jar_path(&application_path);

        debug!(path = %path.display(), "loaded launcher settings");
        Ok(settings)
    }

    /// Write settings as TOML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "saved launcher settings");
        Ok(())
    }
}
