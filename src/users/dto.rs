use serde::Deserialize;

use crate::{
    auth::{dto::is_valid_url, repo_types::ProfileUpdate},
    error::{AppResult, Validator},
};

/// Body for `PUT /users/:user_id`. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub profile_picture_url: Option<String>,
}

impl UpdateProfileRequest {
    pub fn into_update(self) -> AppResult<ProfileUpdate> {
        let name = self.name.map(|n| n.trim().to_string());
        let url = self.profile_picture_url.map(|u| u.trim().to_string());

        let mut v = Validator::new();
        if let Some(name) = &name {
            v.check(!name.is_empty(), "name", "name should not be empty");
        }
        if let Some(url) = &url {
            v.check(
                is_valid_url(url),
                "profile_picture_url",
                "Please enter a valid URL for the profile picture",
            );
        }
        v.finish()?;

        Ok(ProfileUpdate {
            name,
            profile_picture_url: url,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}
