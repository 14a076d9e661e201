//! In-memory user and project stores.
//!
//! Nothing here persists: the deployment model is a single process, and
//! chat history is never stored at all. Password digests are salted
//! SHA-256 and never leave this module — the wire type is [`UserProfile`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Email is already registered")]
    EmailTaken,

    #[error("Project not found")]
    ProjectNotFound,

    #[error("Only project members can add users")]
    NotAMember,
}

/// Public user shape; the digest never serializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

struct UserRecord {
    profile: UserProfile,
    salt: String,
    digest: String,
}

#[derive(Default)]
pub struct UserStore {
    users: DashMap<Uuid, UserRecord>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, StoreError> {
        if self.find_by_email(email).is_some() {
            return Err(StoreError::EmailTaken);
        }
        let profile = UserProfile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
        };
        let salt = Uuid::new_v4().simple().to_string();
        let digest = digest_password(&salt, password);
        self.users.insert(
            profile.id,
            UserRecord {
                profile: profile.clone(),
                salt,
                digest,
            },
        );
        Ok(profile)
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Option<UserProfile> {
        self.users.iter().find_map(|record| {
            (record.profile.email == email
                && digest_password(&record.salt, password) == record.digest)
                .then(|| record.profile.clone())
        })
    }

    pub fn find_by_email(&self, email: &str) -> Option<UserProfile> {
        self.users
            .iter()
            .find_map(|record| (record.profile.email == email).then(|| record.profile.clone()))
    }

    pub fn get(&self, id: Uuid) -> Option<UserProfile> {
        self.users.get(&id).map(|record| record.profile.clone())
    }

    /// Every registered user except the caller.
    pub fn list_others(&self, caller: Uuid) -> Vec<UserProfile> {
        let mut users: Vec<UserProfile> = self
            .users
            .iter()
            .filter(|record| record.profile.id != caller)
            .map(|record| record.profile.clone())
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }
}

fn digest_password(salt: &str, password: &str) -> String {
    let hash = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    hex::encode(hash)
}

/// A collaborative project and its member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<Uuid>,
}

#[derive(Default)]
pub struct ProjectStore {
    projects: DashMap<Uuid, Project>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a project; the creator is its first member.
    pub fn create(&self, name: &str, creator: Uuid) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            members: vec![creator],
        };
        self.projects.insert(project.id, project.clone());
        project
    }

    pub fn get(&self, id: Uuid) -> Option<Project> {
        self.projects.get(&id).map(|p| p.clone())
    }

    /// Projects whose member list contains the given user.
    pub fn list_for(&self, user: Uuid) -> Vec<Project> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| p.members.contains(&user))
            .map(|p| p.clone())
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }

    /// Add members to a project. The caller must already be a member;
    /// duplicates are ignored.
    pub fn add_members(
        &self,
        project_id: Uuid,
        caller: Uuid,
        users: &[Uuid],
    ) -> Result<Project, StoreError> {
        let mut project = self
            .projects
            .get_mut(&project_id)
            .ok_or(StoreError::ProjectNotFound)?;
        if !project.members.contains(&caller) {
            return Err(StoreError::NotAMember);
        }
        for user in users {
            if !project.members.contains(user) {
                project.members.push(*user);
            }
        }
        Ok(project.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_authenticate() {
        let store = UserStore::new();
        let profile = store.register("Ada", "ada@example.com", "hunter2").unwrap();

        assert_eq!(
            store.authenticate("ada@example.com", "hunter2"),
            Some(profile.clone())
        );
        assert_eq!(store.authenticate("ada@example.com", "wrong"), None);
        assert_eq!(store.authenticate("nobody@example.com", "hunter2"), None);
        assert_eq!(store.get(profile.id), Some(profile));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let store = UserStore::new();
        store.register("Ada", "ada@example.com", "pw").unwrap();
        assert!(matches!(
            store.register("Imposter", "ada@example.com", "pw2"),
            Err(StoreError::EmailTaken)
        ));
    }

    #[test]
    fn equal_passwords_produce_distinct_digests_per_user() {
        let store = UserStore::new();
        let a = store.register("A", "a@example.com", "same").unwrap();
        let b = store.register("B", "b@example.com", "same").unwrap();

        let record_a = store.users.get(&a.id).unwrap();
        let record_b = store.users.get(&b.id).unwrap();
        assert_ne!(record_a.digest, record_b.digest);
    }

    #[test]
    fn list_others_excludes_the_caller() {
        let store = UserStore::new();
        let ada = store.register("Ada", "ada@example.com", "pw").unwrap();
        let bob = store.register("Bob", "bob@example.com", "pw").unwrap();

        let others = store.list_others(ada.id);
        assert_eq!(others, vec![bob]);
    }

    #[test]
    fn project_membership_controls_listing_and_adding() {
        let users = UserStore::new();
        let ada = users.register("Ada", "ada@example.com", "pw").unwrap();
        let bob = users.register("Bob", "bob@example.com", "pw").unwrap();

        let projects = ProjectStore::new();
        let project = projects.create("demo", ada.id);

        assert_eq!(projects.list_for(ada.id).len(), 1);
        assert!(projects.list_for(bob.id).is_empty());

        // A non-member cannot add users.
        assert!(matches!(
            projects.add_members(project.id, bob.id, &[bob.id]),
            Err(StoreError::NotAMember)
        ));

        let updated = projects
            .add_members(project.id, ada.id, &[bob.id, bob.id])
            .unwrap();
        assert_eq!(updated.members, vec![ada.id, bob.id]);
        assert_eq!(projects.list_for(bob.id).len(), 1);
    }

    #[test]
    fn missing_project_is_a_typed_error() {
        let projects = ProjectStore::new();
        assert!(matches!(
            projects.add_members(Uuid::new_v4(), Uuid::new_v4(), &[]),
            Err(StoreError::ProjectNotFound)
        ));
        assert!(projects.get(Uuid::new_v4()).is_none());
    }
}
