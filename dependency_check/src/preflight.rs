use std::{collections::BTreeMap, process::Command};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("Installer command is empty")]
    EmptyInstaller,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub requirement: String,
    pub package: String,
}

/// Answers whether a requirement name is present on this machine.
pub trait Resolver {
    fn resolves(&self, requirement: &str) -> bool;
}

pub trait Installer {
    fn install(&self, packages: &[String]) -> bool;
}

/// Accepts a requirement that is either an executable on `PATH` or a module
/// known to `pkg-config`.
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolves(&self, requirement: &str) -> bool {
        if which::which(requirement).is_ok() {
            return true;
        }
        Command::new("pkg-config")
            .args(["--exists", requirement])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    pub fn new(command: &[String]) -> Result<Self, PreflightError> {
        let (program, args) = command.split_first().ok_or(PreflightError::EmptyInstaller)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Installer for CommandInstaller {
    fn install(&self, packages: &[String]) -> bool {
        tracing::debug!("Running {} {:?} {:?}", self.program, self.args, packages);
        match Command::new(&self.program)
            .args(&self.args)
            .args(packages)
            .status()
        {
            Ok(status) if status.success() => true,
            Ok(status) => {
                tracing::warn!("Installer exited with {}", status);
                false
            }
            Err(e) => {
                tracing::error!("Failed to launch installer {}: {}", self.program, e);
                false
            }
        }
    }
}

/// Returns the dependencies whose requirement does not resolve, in table order.
pub fn check(resolver: &impl Resolver, dependencies: &BTreeMap<String, String>) -> Vec<Dependency> {
    dependencies
        .iter()
        .filter(|(requirement, _)| !resolver.resolves(requirement))
        .map(|(requirement, package)| Dependency {
            requirement: requirement.clone(),
            package: package.clone(),
        })
        .collect()
}

pub fn install(installer: &impl Installer, packages: &[String]) -> bool {
    installer.install(packages)
}
