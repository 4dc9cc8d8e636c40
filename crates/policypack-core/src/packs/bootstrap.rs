use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::env::{PackLayout, PolicyConfig, ToolCommands};
use crate::error::{PolicyPackError, Result};

use super::{CommandRunner, CommandSpec, Manifest, Runtime, VIRTUALENV_OPTION};

const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Installs runtime dependencies into a pack directory that has already been
/// placed at its final path.
pub struct Bootstrapper {
    runner: Arc<dyn CommandRunner>,
    tools: ToolCommands,
    layout: PackLayout,
}

impl Bootstrapper {
    pub fn new(cfg: &PolicyConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            tools: cfg.tools.clone(),
            layout: cfg.layout.clone(),
        }
    }

    /// Bootstrap `pack_dir` according to the manifest's runtime and return
    /// the manifest as it now stands on disk.
    pub fn bootstrap(
        &self,
        pack_dir: &Path,
        manifest_path: &Path,
        manifest: Manifest,
    ) -> Result<Manifest> {
        match manifest.runtime() {
            Runtime::NodeJs => {
                self.npm_install(pack_dir)?;
                Ok(manifest)
            }
            Runtime::Python => self.python_install(pack_dir, manifest_path, manifest),
            Runtime::Unsupported(name) => {
                tracing::debug!(runtime = %name, path = %pack_dir.display(), "no dependency bootstrap for runtime");
                Ok(manifest)
            }
        }
    }

    fn npm_install(&self, pack_dir: &Path) -> Result<()> {
        let install = CommandSpec::new(&self.tools.npm, ["install"], pack_dir);
        self.run(pack_dir, &install)
    }

    fn python_install(
        &self,
        pack_dir: &Path,
        manifest_path: &Path,
        mut manifest: Manifest,
    ) -> Result<Manifest> {
        let venv = &self.layout.virtualenv_dir;
        let create = CommandSpec::new(&self.tools.python, ["-m", "venv", venv.as_str()], pack_dir);
        self.run(pack_dir, &create)?;

        let venv_python = venv_python(&pack_dir.join(venv)).display().to_string();
        let upgrade = CommandSpec::new(
            venv_python.as_str(),
            ["-m", "pip", "install", "--upgrade", "pip", "setuptools", "wheel"],
            pack_dir,
        );
        self.run(pack_dir, &upgrade)?;

        if pack_dir.join(REQUIREMENTS_FILE).is_file() {
            let requirements = CommandSpec::new(
                venv_python.as_str(),
                ["-m", "pip", "install", "-r", REQUIREMENTS_FILE],
                pack_dir,
            );
            self.run(pack_dir, &requirements)?;
        }

        manifest.runtime.set_option(VIRTUALENV_OPTION, venv.as_str());
        manifest
            .save(manifest_path)
            .map_err(|source| PolicyPackError::ManifestSave {
                path: manifest_path.to_path_buf(),
                source,
            })?;
        Ok(manifest)
    }

    fn run(&self, pack_dir: &Path, command: &CommandSpec) -> Result<()> {
        tracing::debug!(command = %command, path = %pack_dir.display(), "bootstrapping policy pack");
        self.runner
            .run(command)
            .map(|_| ())
            .map_err(|source| PolicyPackError::bootstrap(pack_dir, command.to_string(), source))
    }
}

fn venv_python(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}
