use std::collections::HashMap;

use storechat_types::api::ProfilePayload;
use storechat_types::models::{UserId, UserProfile};

/// Partial profile update. `None` and blank strings carry no information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

impl ProfilePatch {
    pub fn nickname(nickname: impl Into<String>) -> Self {
        Self {
            nickname: Some(nickname.into()),
            avatar: None,
        }
    }
}

impl From<&ProfilePayload> for ProfilePatch {
    fn from(p: &ProfilePayload) -> Self {
        Self {
            nickname: p.nickname.clone(),
            avatar: p.avatar.clone(),
        }
    }
}

/// Synthetic nickname used until a real one is known.
pub fn fallback_nickname(id: UserId) -> String {
    format!("U{}", id)
}

/// Blank, or the generated `U<digits>` form.
pub fn is_placeholder_nickname(nickname: &str) -> bool {
    let nickname = nickname.trim();
    match nickname.strip_prefix('U') {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => nickname.is_empty(),
    }
}

/// Best-known nickname and avatar per user for the lifetime of a session.
///
/// Merges never regress: a real value is only ever replaced by another real
/// value, and every stored entry resolves to something renderable.
#[derive(Debug, Clone)]
pub struct ProfileCache {
    entries: HashMap<UserId, UserProfile>,
    default_avatar: String,
}

impl ProfileCache {
    pub fn new(default_avatar: impl Into<String>) -> Self {
        Self {
            entries: HashMap::new(),
            default_avatar: default_avatar.into(),
        }
    }

    pub fn default_avatar(&self) -> &str {
        &self.default_avatar
    }

    /// Blank, or pointing at the default-avatar resource.
    pub fn is_placeholder_avatar(&self, avatar: &str) -> bool {
        let avatar = avatar.trim();
        avatar.is_empty() || avatar == self.default_avatar || avatar.ends_with(&self.default_avatar)
    }

    pub fn get(&self, id: UserId) -> Option<&UserProfile> {
        self.entries.get(&id)
    }

    pub fn upsert(&mut self, id: UserId, patch: ProfilePatch) -> &UserProfile {
        let incoming_nick = patch
            .nickname
            .map(|n| n.trim().to_string())
            .filter(|n| !is_placeholder_nickname(n));
        let incoming_avatar = patch
            .avatar
            .map(|a| a.trim().to_string())
            .filter(|a| !self.is_placeholder_avatar(a));

        let default_avatar = &self.default_avatar;
        let entry = self.entries.entry(id).or_insert_with(|| UserProfile {
            id,
            nickname: fallback_nickname(id),
            avatar: default_avatar.clone(),
        });

        if let Some(nickname) = incoming_nick {
            entry.nickname = nickname;
        }
        if let Some(avatar) = incoming_avatar {
            entry.avatar = avatar;
        }
        entry
    }

    /// Copy of the entry for `id`, creating the fallback entry on first sight.
    pub fn snapshot(&mut self, id: UserId) -> UserProfile {
        self.upsert(id, ProfilePatch::default()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
