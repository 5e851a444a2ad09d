use crate::errors::*;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ARCHIVE_EXTENSION: &str = "zip";

/// One platform combination to cross-compile for, eg. `linux arm 7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    pub os: String,
    pub arch: String,
    /// ARM variant, empty when not applicable
    pub variant: String,
}

impl Target {
    pub fn new<I: Into<String>>(os: I, arch: I, variant: I) -> Target {
        Target {
            os: os.into(),
            arch: arch.into(),
            variant: variant.into(),
        }
    }

    pub fn exe_suffix(&self) -> &'static str {
        if self.os == "windows" {
            ".exe"
        } else {
            ""
        }
    }

    pub fn binary_name(&self, name: &str) -> String {
        format!("{}{}", name, self.exe_suffix())
    }

    /// `os_arch[_armN]`
    pub fn qualifier(&self) -> String {
        let mut s = format!("{}_{}", self.os, self.arch);
        if !self.variant.is_empty() {
            s.push_str("_arm");
            s.push_str(&self.variant);
        }
        s
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Target> {
        let fields = s.split_whitespace().collect::<Vec<_>>();
        match fields.as_slice() {
            [os, arch] => Ok(Target::new(*os, *arch, "")),
            [os, arch, variant] => Ok(Target::new(*os, *arch, *variant)),
            _ => bail!(
                "Target must contain os and arch, optionally followed by the arm variant: {:?}",
                s
            ),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = Error;

    fn try_from(s: String) -> Result<Target> {
        s.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> String {
        target.to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.os, self.arch)?;
        if !self.variant.is_empty() {
            write!(f, " {}", self.variant)?;
        }
        Ok(())
    }
}

/// Path separators in a reference would otherwise turn into directories.
/// `~` is not allowed in references, so distinct refs keep distinct names.
fn path_safe(git_ref: &str) -> String {
    git_ref.replace('/', "~")
}

/// Name of the packaging directory, `name_ref_os_arch[_armN]`. The archive
/// is this name plus `.zip`.
pub fn archive_stem(name: &str, git_ref: &str, target: &Target) -> String {
    format!("{}_{}_{}", name, path_safe(git_ref), target.qualifier())
}

pub fn archive_filename(name: &str, git_ref: &str, target: &Target) -> String {
    format!("{}.{}", archive_stem(name, git_ref, target), ARCHIVE_EXTENSION)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub branch: String,
    pub os: String,
    pub arch: String,
    pub variant: String,
}

impl TargetKey {
    pub fn new(branch: &str, target: &Target) -> TargetKey {
        TargetKey {
            branch: branch.to_string(),
            os: target.os.clone(),
            arch: target.arch.clone(),
            variant: target.variant.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTarget {
    pub key: TargetKey,
    pub name: String,
    pub archive: String,
    pub last_build: Option<NaiveDateTime>,
}

/// Every configured branch crossed with every configured target, branch
/// major, in configuration order.
pub fn expand_matrix(name: &str, branches: &[String], targets: &[Target]) -> Vec<NamedTarget> {
    branches
        .iter()
        .flat_map(|branch| {
            targets.iter().map(move |target| NamedTarget {
                key: TargetKey::new(branch, target),
                name: archive_stem(name, branch, target),
                archive: archive_filename(name, branch, target),
                last_build: None,
            })
        })
        .collect()
}
