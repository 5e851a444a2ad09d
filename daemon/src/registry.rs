use chrono::NaiveDateTime;
use crossbuild_common::api::TargetStatus;
use crossbuild_common::target::{self, NamedTarget, Target, TargetKey};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type SharedRegistry = Arc<RwLock<TargetRegistry>>;

/// Every (branch, target) combination of the configuration, in
/// configuration order, indexed by an explicit key.
#[derive(Debug, Default, Clone)]
pub struct TargetRegistry {
    targets: Vec<NamedTarget>,
    index: HashMap<TargetKey, usize>,
}

impl TargetRegistry {
    pub fn new(name: &str, branches: &[String], targets: &[Target]) -> TargetRegistry {
        let targets = target::expand_matrix(name, branches, targets);
        let index = targets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.key.clone(), i))
            .collect();
        TargetRegistry { targets, index }
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Mark `targets` of `branch` as built at `when`, returns how many
    /// entries were touched. Refs that are not a configured branch touch
    /// nothing.
    pub fn record_success(&mut self, branch: &str, targets: &[Target], when: NaiveDateTime) -> usize {
        let mut n = 0;
        for target in targets {
            if let Some(&i) = self.index.get(&TargetKey::new(branch, target)) {
                self.targets[i].last_build = Some(when);
                n += 1;
            }
        }
        n
    }

    pub fn list(&self) -> Vec<TargetStatus> {
        self.targets
            .iter()
            .map(|t| TargetStatus {
                name: t.name.clone(),
                branch: t.key.branch.clone(),
                os: t.key.os.clone(),
                arch: t.key.arch.clone(),
                variant: t.key.variant.clone(),
                archive: t.archive.clone(),
                last_build: t.last_build,
            })
            .collect()
    }
}
