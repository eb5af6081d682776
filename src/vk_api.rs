use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use serenity::async_trait;
use tracing::debug;

use crate::error::VkError;

pub const DEFAULT_API_URL: &str = "https://api.vk.com/method";
const API_VERSION: &str = "5.131";

/// Upper bound VK accepts for `likes.getList` in one call.
pub const MAX_LIKES_PER_CALL: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Group,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedObject {
    pub kind: EntityKind,
    pub object_id: i64,
}

impl ResolvedObject {
    /// Groups are addressed with negative ids, users with positive ones.
    pub fn signed_id(&self) -> i64 {
        match self.kind {
            EntityKind::Group => -self.object_id.abs(),
            EntityKind::User => self.object_id.abs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WallPost {
    pub id: i64,
    pub date: i64,
}

/// `likes.getList` with `extended=1` mixes people and communities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikerKind {
    #[default]
    Profile,
    Group,
    Page,
    Event,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Liker {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: LikerKind,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Set for communities only.
    #[serde(default)]
    pub name: String,
}

impl Liker {
    pub fn display_name(&self) -> String {
        match self.kind {
            LikerKind::Profile => format!("{} {}", self.first_name, self.last_name).trim().to_string(),
            _ => self.name.trim().to_string(),
        }
    }

    pub fn profile_url(&self) -> String {
        match self.kind {
            LikerKind::Profile => format!("https://vk.com/id{}", self.id),
            _ => format!("https://vk.com/club{}", self.id.abs()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeStatus {
    pub liked: bool,
    pub copied: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupProfile {
    pub name: String,
}

/// The subset of the VK API the bot talks to.
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// `Ok(None)` when VK does not know the name.
    async fn resolve_screen_name(&self, screen_name: &str) -> Result<Option<ResolvedObject>, VkError>;

    async fn wall_posts(&self, owner_id: i64, count: u32) -> Result<Vec<WallPost>, VkError>;

    async fn post_likers(&self, owner_id: i64, post_id: i64, count: u32) -> Result<Vec<Liker>, VkError>;

    async fn like_status(&self, user_id: i64, owner_id: i64, post_id: i64) -> Result<LikeStatus, VkError>;

    async fn user(&self, user_id: i64) -> Result<Option<UserProfile>, VkError>;

    /// `group_id` is the positive group id.
    async fn group(&self, group_id: i64) -> Result<Option<GroupProfile>, VkError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    response: Option<Value>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct ItemsPage<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawResolved {
    #[serde(rename = "type")]
    kind: String,
    object_id: i64,
}

#[derive(Debug, Deserialize)]
struct RawLikeStatus {
    #[serde(default)]
    liked: u8,
    #[serde(default)]
    copied: u8,
}

pub struct VkClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl VkClient {
    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call_raw(&self, method: &str, params: &[(&str, String)]) -> Result<Value, VkError> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(method, "VK API call");

        let resp = self
            .client
            .get(&url)
            .query(params)
            .query(&[("access_token", self.token.as_str()), ("v", API_VERSION)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VkError::Status(status.as_u16()));
        }

        let envelope: Envelope = resp.json().await?;
        if let Some(error) = envelope.error {
            return Err(VkError::from_api(error.error_code, error.error_msg));
        }
        envelope
            .response
            .ok_or_else(|| VkError::Parse(format!("{} returned neither response nor error", method)))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T, VkError> {
        let value = self.call_raw(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl SocialApi for VkClient {
    async fn resolve_screen_name(&self, screen_name: &str) -> Result<Option<ResolvedObject>, VkError> {
        let value = self
            .call_raw("utils.resolveScreenName", &[("screen_name", screen_name.trim().to_string())])
            .await?;

        // Unknown names come back as an empty array instead of an object.
        if !value.is_object() {
            return Ok(None);
        }
        let raw: RawResolved = serde_json::from_value(value)?;
        if raw.object_id == 0 {
            return Ok(None);
        }

        let kind = match raw.kind.as_str() {
            "user" => EntityKind::User,
            "group" | "page" | "event" => EntityKind::Group,
            other => {
                debug!(screen_name, kind = other, "Screen name resolved to an unsupported object");
                return Ok(None);
            }
        };

        Ok(Some(ResolvedObject {
            kind,
            object_id: raw.object_id,
        }))
    }

    async fn wall_posts(&self, owner_id: i64, count: u32) -> Result<Vec<WallPost>, VkError> {
        let page: ItemsPage<WallPost> = self
            .call("wall.get", &[("owner_id", owner_id.to_string()), ("count", count.to_string())])
            .await?;
        Ok(page.items)
    }

    async fn post_likers(&self, owner_id: i64, post_id: i64, count: u32) -> Result<Vec<Liker>, VkError> {
        let page: ItemsPage<Liker> = self
            .call(
                "likes.getList",
                &[
                    ("type", "post".to_string()),
                    ("owner_id", owner_id.to_string()),
                    ("item_id", post_id.to_string()),
                    ("count", count.min(MAX_LIKES_PER_CALL).to_string()),
                    ("extended", "1".to_string()),
                    ("fields", "id,first_name,last_name".to_string()),
                ],
            )
            .await?;
        Ok(page.items)
    }

    async fn like_status(&self, user_id: i64, owner_id: i64, post_id: i64) -> Result<LikeStatus, VkError> {
        let raw: RawLikeStatus = self
            .call(
                "likes.isLiked",
                &[
                    ("user_id", user_id.to_string()),
                    ("type", "post".to_string()),
                    ("owner_id", owner_id.to_string()),
                    ("item_id", post_id.to_string()),
                ],
            )
            .await?;
        Ok(LikeStatus {
            liked: raw.liked != 0,
            copied: raw.copied != 0,
        })
    }

    async fn user(&self, user_id: i64) -> Result<Option<UserProfile>, VkError> {
        let users: Vec<UserProfile> = self
            .call(
                "users.get",
                &[("user_ids", user_id.to_string()), ("fields", "first_name,last_name".to_string())],
            )
            .await?;
        Ok(users.into_iter().next())
    }

    async fn group(&self, group_id: i64) -> Result<Option<GroupProfile>, VkError> {
        let groups: Vec<GroupProfile> = self
            .call(
                "groups.getById",
                &[("group_id", group_id.abs().to_string())],
            )
            .await?;
        Ok(groups.into_iter().next())
    }
}
