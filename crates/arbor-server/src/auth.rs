#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn anonymous() -> Self { Self { name: "anonymous".into(), is_admin: false } }
    pub fn user(name: impl Into<String>) -> Self { Self { name: name.into(), is_admin: false } }
    pub fn admin(name: impl Into<String>) -> Self { Self { name: name.into(), is_admin: true } }

    pub fn is_anonymous(&self) -> bool {
        !self.is_admin && self.name == "anonymous"
    }
}

/// What a request wants to do to which file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Retrieve content or metadata.
    Read { branch: String, path: String },
    /// Check in, lock, label, create.
    Write { branch: String, path: String },
    /// Move, rename, delete or restore.
    Namespace { branch: String, path: String },
    /// Break other users' locks and change archive metadata.
    Admin { branch: String, path: String },
}

impl Action {
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { branch, path } => write!(f, "read:{branch}:{path}"),
            Self::Write { branch, path } => write!(f, "write:{branch}:{path}"),
            Self::Namespace { branch, path } => write!(f, "namespace:{branch}:{path}"),
            Self::Admin { branch, path } => write!(f, "admin:{branch}:{path}"),
        }
    }
}

/// Decides whether an identity may perform an action.
pub trait PermissionCheck: Send + Sync {
    fn allows(&self, identity: &Identity, action: &Action) -> bool;
}

pub struct AllowAll;

impl PermissionCheck for AllowAll {
    fn allows(&self, _identity: &Identity, _action: &Action) -> bool {
        true
    }
}

pub struct DenyAll;

impl PermissionCheck for DenyAll {
    fn allows(&self, _identity: &Identity, _action: &Action) -> bool {
        false
    }
}

/// Everyone reads, named users write, admins administer.
pub struct RoleBased;

impl PermissionCheck for RoleBased {
    fn allows(&self, identity: &Identity, action: &Action) -> bool {
        match action {
            Action::Read { .. } => true,
            Action::Write { .. } | Action::Namespace { .. } => !identity.is_anonymous(),
            Action::Admin { .. } => identity.is_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: &str) -> Action {
        let (branch, path) = ("trunk".to_string(), "src/a.c".to_string());
        match kind {
            "read" => Action::Read { branch, path },
            "write" => Action::Write { branch, path },
            "namespace" => Action::Namespace { branch, path },
            _ => Action::Admin { branch, path },
        }
    }

    #[test]
    fn identity_variants() {
        assert!(Identity::anonymous().is_anonymous());
        assert!(!Identity::user("alice").is_anonymous());
        assert!(Identity::admin("root").is_admin);
    }

    #[test]
    fn action_display() {
        assert_eq!(action("read").to_string(), "read:trunk:src/a.c");
        assert_eq!(action("admin").to_string(), "admin:trunk:src/a.c");
        assert!(action("read").is_read());
        assert!(!action("namespace").is_read());
    }

    #[test]
    fn fixed_policies() {
        assert!(AllowAll.allows(&Identity::anonymous(), &action("admin")));
        assert!(!DenyAll.allows(&Identity::admin("root"), &action("read")));
    }

    #[test]
    fn role_based_policy() {
        let anon = Identity::anonymous();
        let alice = Identity::user("alice");
        let root = Identity::admin("root");
        assert!(RoleBased.allows(&anon, &action("read")));
        assert!(!RoleBased.allows(&anon, &action("write")));
        assert!(RoleBased.allows(&alice, &action("namespace")));
        assert!(!RoleBased.allows(&alice, &action("admin")));
        assert!(RoleBased.allows(&root, &action("admin")));
    }
}
