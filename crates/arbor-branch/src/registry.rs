//! The set of branches in a project.
//!
//! [`BranchRegistry`] is constructed explicitly and passed to whatever needs
//! it; there is no process-wide branch manager. Every registry starts with
//! the trunk.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use arbor_types::{BranchId, Timestamp};

use crate::error::{BranchError, BranchResult};
use crate::names::validate_branch_name;

/// Name of the trunk branch.
pub const TRUNK_NAME: &str = "Trunk";

/// Branch flavours.
///
/// Feature and translucent branches behave identically: both see their
/// parent's newest revision until they check in locally. Opaque branches
/// see their parent as of the moment they were created (or last resolved).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BranchKind {
    Trunk,
    Feature,
    Translucent,
    Opaque,
    /// Read-only view of the parent frozen at `as_of`.
    DateBased { as_of: Timestamp },
}

impl BranchKind {
    pub fn is_writable(&self) -> bool {
        !matches!(self, BranchKind::DateBased { .. })
    }

    pub fn as_of(&self) -> Option<Timestamp> {
        match self {
            BranchKind::DateBased { as_of } => Some(*as_of),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BranchKind::Trunk => "trunk",
            BranchKind::Feature => "feature",
            BranchKind::Translucent => "translucent",
            BranchKind::Opaque => "opaque",
            BranchKind::DateBased { .. } => "date-based",
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKind::DateBased { as_of } => write!(f, "date-based ({as_of})"),
            other => f.write_str(other.label()),
        }
    }
}

/// One branch of a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub kind: BranchKind,
    /// `None` only for the trunk.
    pub parent: Option<BranchId>,
    pub created_at: Timestamp,
}

impl Branch {
    pub fn is_trunk(&self) -> bool {
        self.id.is_trunk()
    }

    pub fn is_writable(&self) -> bool {
        self.kind.is_writable()
    }
}

#[derive(Debug)]
struct RegistryState {
    branches: BTreeMap<BranchId, Branch>,
    next_id: u32,
}

impl RegistryState {
    fn by_name(&self, name: &str) -> Option<&Branch> {
        self.branches.values().find(|b| b.name == name)
    }
}

/// Thread-safe registry of a project's branches.
pub struct BranchRegistry {
    state: RwLock<RegistryState>,
}

impl BranchRegistry {
    /// A registry holding only the trunk.
    pub fn new() -> Self {
        let trunk = Branch {
            id: BranchId::TRUNK,
            name: TRUNK_NAME.to_string(),
            kind: BranchKind::Trunk,
            parent: None,
            created_at: Timestamp::from_millis(0),
        };
        let mut branches = BTreeMap::new();
        branches.insert(trunk.id, trunk);
        Self {
            state: RwLock::new(RegistryState {
                branches,
                next_id: BranchId::TRUNK.get() + 1,
            }),
        }
    }

    /// Rebuild a registry from branches previously returned by [`export`](Self::export).
    pub fn restore(branches: Vec<Branch>) -> BranchResult<Self> {
        let registry = Self::new();
        let mut sorted = branches;
        sorted.sort_by_key(|b| b.id);
        {
            let mut state = registry.write()?;
            for branch in sorted {
                if branch.is_trunk() {
                    continue;
                }
                validate_branch_name(&branch.name)?;
                if state.by_name(&branch.name).is_some() || state.branches.contains_key(&branch.id) {
                    return Err(BranchError::BranchExists { name: branch.name });
                }
                let parent_known = branch.parent.is_some_and(|p| state.branches.contains_key(&p));
                if !parent_known {
                    return Err(BranchError::BranchNotFound {
                        name: format!("parent of {}", branch.name),
                    });
                }
                state.next_id = state.next_id.max(branch.id.get() + 1);
                state.branches.insert(branch.id, branch);
            }
        }
        Ok(registry)
    }

    pub fn from_json(json: &str) -> BranchResult<Self> {
        Self::restore(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> BranchResult<String> {
        Ok(serde_json::to_string_pretty(&self.export()?)?)
    }

    fn read(&self) -> BranchResult<std::sync::RwLockReadGuard<'_, RegistryState>> {
        self.state.read().map_err(|_| BranchError::LockPoisoned)
    }

    fn write(&self) -> BranchResult<std::sync::RwLockWriteGuard<'_, RegistryState>> {
        self.state.write().map_err(|_| BranchError::LockPoisoned)
    }

    /// Create a branch named `name` under `parent`.
    pub fn create_branch(&self, name: &str, kind: BranchKind, parent: &str, created_at: Timestamp) -> BranchResult<Branch> {
        validate_branch_name(name)?;
        if kind == BranchKind::Trunk {
            return Err(BranchError::InvalidParent {
                name: name.to_string(),
                parent: parent.to_string(),
                reason: "a project has exactly one trunk".into(),
            });
        }

        let mut state = self.write()?;
        if state.by_name(name).is_some() {
            return Err(BranchError::BranchExists {
                name: name.to_string(),
            });
        }
        let parent_branch = state.by_name(parent).ok_or_else(|| BranchError::BranchNotFound {
            name: parent.to_string(),
        })?;
        if kind.is_writable() && !parent_branch.is_writable() {
            return Err(BranchError::InvalidParent {
                name: name.to_string(),
                parent: parent.to_string(),
                reason: "writable branches need a writable parent".into(),
            });
        }

        let branch = Branch {
            id: BranchId::new(state.next_id),
            name: name.to_string(),
            kind,
            parent: Some(parent_branch.id),
            created_at,
        };
        state.next_id += 1;
        state.branches.insert(branch.id, branch.clone());
        info!(branch = name, id = %branch.id, %kind, parent, "branch created");
        Ok(branch)
    }

    /// Remove a leaf branch. The trunk and branches with children stay.
    pub fn delete_branch(&self, name: &str) -> BranchResult<Branch> {
        let mut state = self.write()?;
        let branch = state.by_name(name).cloned().ok_or_else(|| BranchError::BranchNotFound {
            name: name.to_string(),
        })?;
        if branch.is_trunk() {
            return Err(BranchError::BranchInUse {
                name: name.to_string(),
                reason: "the trunk cannot be removed".into(),
            });
        }
        if state.branches.values().any(|b| b.parent == Some(branch.id)) {
            return Err(BranchError::BranchInUse {
                name: name.to_string(),
                reason: "branch has child branches".into(),
            });
        }
        state.branches.remove(&branch.id);
        info!(branch = name, "branch removed");
        Ok(branch)
    }

    pub fn find(&self, name: &str) -> BranchResult<Option<Branch>> {
        Ok(self.read()?.by_name(name).cloned())
    }

    /// Look up a branch by name.
    pub fn get(&self, name: &str) -> BranchResult<Branch> {
        self.find(name)?.ok_or_else(|| BranchError::BranchNotFound {
            name: name.to_string(),
        })
    }

    pub fn get_by_id(&self, id: BranchId) -> BranchResult<Branch> {
        self.read()?
            .branches
            .get(&id)
            .cloned()
            .ok_or_else(|| BranchError::BranchNotFound { name: id.to_string() })
    }

    pub fn trunk(&self) -> BranchResult<Branch> {
        self.get_by_id(BranchId::TRUNK)
    }

    /// All branches ordered by id.
    pub fn export(&self) -> BranchResult<Vec<Branch>> {
        Ok(self.read()?.branches.values().cloned().collect())
    }

    pub fn children(&self, id: BranchId) -> BranchResult<Vec<Branch>> {
        Ok(self
            .read()?
            .branches
            .values()
            .filter(|b| b.parent == Some(id))
            .cloned()
            .collect())
    }

    /// The branch followed by its ancestors, ending with the trunk.
    pub fn ancestry(&self, id: BranchId) -> BranchResult<Vec<Branch>> {
        let state = self.read()?;
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let branch = state
                .branches
                .get(&current)
                .ok_or_else(|| BranchError::BranchNotFound {
                    name: current.to_string(),
                })?;
            if chain.len() > state.branches.len() {
                return Err(BranchError::InvalidParent {
                    name: branch.name.clone(),
                    parent: current.to_string(),
                    reason: "branch ancestry contains a cycle".into(),
                });
            }
            chain.push(branch.clone());
            cursor = branch.parent;
        }
        debug!(branch = %id, depth = chain.len(), "ancestry resolved");
        Ok(chain)
    }
}

impl Default for BranchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BranchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.state.read().map(|s| s.branches.len()).unwrap_or(0);
        f.debug_struct("BranchRegistry").field("branches", &count).finish()
    }
}
