use serde::{Deserialize, Serialize};

const CDN: &str = "https://cdn.discordapp.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)] // Use default values for missing fields
pub struct User {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    pub bot: bool,
}

impl User {
    /// Global display name, falling back to the account name.
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    /// Avatar URL, or the default avatar when the user has none set.
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => {
                let ext = if hash.starts_with("a_") { "gif" } else { "png" };
                format!("{CDN}/avatars/{}/{hash}.{ext}", self.id)
            }
            None => {
                let index = self.id.parse::<u64>().map(|id| (id >> 22) % 6).unwrap_or(0);
                format!("{CDN}/embed/avatars/{index}.png")
            }
        }
    }
}

/// A guild member. `user` is absent on members embedded in message events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub user: Option<User>,
    pub nick: Option<String>,
    pub roles: Vec<String>,
    pub joined_at: Option<String>,
    pub communication_disabled_until: Option<String>,
    pub permissions: Option<String>,
}

impl Member {
    /// Nickname, then global name, then account name.
    pub fn display_name(&self) -> Option<&str> {
        self.nick
            .as_deref()
            .or_else(|| self.user.as_ref().map(User::display_name))
    }

    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r == role_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_url_handles_animated_and_default() {
        let mut user = User {
            id: "80351110224678912".into(),
            username: "nelly".into(),
            ..Default::default()
        };
        assert!(user.avatar_url().starts_with("https://cdn.discordapp.com/embed/avatars/"));

        user.avatar = Some("a_abc".into());
        assert!(user.avatar_url().ends_with("/a_abc.gif"));
    }

    #[test]
    fn member_display_name_prefers_nick() {
        let member = Member {
            user: Some(User {
                username: "nelly".into(),
                global_name: Some("Nelly".into()),
                ..Default::default()
            }),
            nick: Some("Nel".into()),
            ..Default::default()
        };
        assert_eq!(member.display_name(), Some("Nel"));
    }
}
