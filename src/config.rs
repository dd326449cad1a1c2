//! Joint/group topology file.
//!
//! ```toml
//! [joints]
//! joint1 = { id = 2 }
//! joint_hand = { id = 9 }
//!
//! [groups]
//! arm = ["joint1"]
//! hand = ["joint_hand"]
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed topology: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("group '{group}' references undefined joint '{joint}'")]
    UndefinedJoint { group: String, joint: String },

    #[error("joints '{first}' and '{second}' share servo id {id}")]
    DuplicateId { id: u8, first: String, second: String },

    #[error("group '{0}' has no joints")]
    EmptyGroup(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JointConfig {
    pub id: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct TopologyFile {
    joints: BTreeMap<String, JointConfig>,
    groups: BTreeMap<String, Vec<String>>,
}

/// Validated joint names, servo ids and group membership.
#[derive(Debug, Clone)]
pub struct Topology {
    joints: BTreeMap<String, JointConfig>,
    groups: BTreeMap<String, Vec<String>>,
    names_by_id: HashMap<u8, String>,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, TopologyError> {
        let file: TopologyFile = toml::from_str(text)?;

        let mut names_by_id = HashMap::new();
        for (name, joint) in &file.joints {
            if let Some(first) = names_by_id.insert(joint.id, name.clone()) {
                return Err(TopologyError::DuplicateId {
                    id: joint.id,
                    first,
                    second: name.clone(),
                });
            }
        }

        for (group, members) in &file.groups {
            if members.is_empty() {
                return Err(TopologyError::EmptyGroup(group.clone()));
            }
            if let Some(joint) = members.iter().find(|j| !file.joints.contains_key(*j)) {
                return Err(TopologyError::UndefinedJoint {
                    group: group.clone(),
                    joint: joint.clone(),
                });
            }
        }

        Ok(Self {
            joints: file.joints,
            groups: file.groups,
            names_by_id,
        })
    }

    pub fn joint(&self, name: &str) -> Option<&JointConfig> {
        self.joints.get(name)
    }

    pub fn joint_name(&self, id: u8) -> Option<&str> {
        self.names_by_id.get(&id).map(String::as_str)
    }

    /// Joint names of a group, in declaration order.
    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Servo ids of a group, in declaration order.
    pub fn group_ids(&self, name: &str) -> Option<Vec<u8>> {
        self.group(name)
            .map(|members| members.iter().map(|j| self.joints[j].id).collect())
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}
