use chrono_tz::Tz;
use tracing::debug;

use crate::error::VkError;
use crate::link_parser::PostRef;
use crate::report::{format_post_date, ActivityRecord, LikerRecord, UserInfo};
use crate::vk_api::{LikeStatus, SocialApi, MAX_LIKES_PER_CALL};

/// Wall posts inspected per activity analysis, newest first.
pub const POSTS_TO_SCAN: u32 = 30;

const USER_PLACEHOLDER: &str = "Пользователь";
const USER_LINK_PLACEHOLDER: &str = "—";
const GROUP_PLACEHOLDER: &str = "Группа";

pub struct ActivityScan {
    pub user: UserInfo,
    pub records: Vec<ActivityRecord>,
}

/// Likers of `post` in API order, at most one page of `MAX_LIKES_PER_CALL`.
pub async fn fetch_likers(api: &dyn SocialApi, post: PostRef) -> Result<Vec<LikerRecord>, VkError> {
    let likers = api.post_likers(post.owner_id, post.post_id, MAX_LIKES_PER_CALL).await?;
    Ok(likers.iter().map(LikerRecord::from_liker).collect())
}

/// Checks the user's likes and reposts on the group's latest posts.
/// `Ok(None)` when the wall is empty or closed.
pub async fn scan_activity(
    api: &dyn SocialApi,
    group_id: i64,
    user_id: i64,
    timezone: Tz,
) -> Result<Option<ActivityScan>, VkError> {
    let posts = api.wall_posts(group_id, POSTS_TO_SCAN).await?;
    if posts.is_empty() {
        return Ok(None);
    }

    let user = describe(api, group_id, user_id).await;

    let mut records = Vec::with_capacity(posts.len());
    for post in &posts {
        let status = match api.like_status(user_id, group_id, post.id).await {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, post_id = post.id, "Like check failed, counting as no activity");
                LikeStatus::default()
            }
        };

        records.push(ActivityRecord {
            date: format_post_date(post.date, timezone),
            link: PostRef {
                owner_id: group_id,
                post_id: post.id,
            }
            .url(),
            liked: status.liked,
            reposted: status.copied,
        });
    }

    Ok(Some(ActivityScan { user, records }))
}

// Display names are cosmetic; lookups fall back to placeholders.
async fn describe(api: &dyn SocialApi, group_id: i64, user_id: i64) -> UserInfo {
    let (name, link) = match api.user(user_id).await {
        Ok(Some(profile)) => (profile.full_name(), format!("https://vk.com/id{}", user_id)),
        Ok(None) => (USER_PLACEHOLDER.to_string(), USER_LINK_PLACEHOLDER.to_string()),
        Err(e) => {
            debug!(error = %e, user_id, "User lookup failed");
            (USER_PLACEHOLDER.to_string(), USER_LINK_PLACEHOLDER.to_string())
        }
    };

    let group_name = match api.group(-group_id).await {
        Ok(Some(group)) => group.name,
        Ok(None) => GROUP_PLACEHOLDER.to_string(),
        Err(e) => {
            debug!(error = %e, group_id, "Group lookup failed");
            GROUP_PLACEHOLDER.to_string()
        }
    };

    UserInfo { name, link, group_name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::FakeVk;
    use crate::vk_api::{GroupProfile, UserProfile, WallPost};

    fn posts(n: i64) -> Vec<WallPost> {
        (1..=n).map(|id| WallPost { id, date: 1_704_067_200 + id * 60 }).collect()
    }

    #[tokio::test]
    async fn scan_builds_one_record_per_post() {
        let mut vk = FakeVk::default();
        vk.posts = posts(3);
        vk.statuses.insert(1, LikeStatus { liked: true, copied: false });
        vk.statuses.insert(2, LikeStatus { liked: true, copied: true });
        // post 3 has no status: the check fails and counts as nothing
        vk.user = Some(UserProfile {
            first_name: "Иван".to_string(),
            last_name: "Петров".to_string(),
        });
        vk.group = Some(GroupProfile {
            name: "Клуб".to_string(),
        });

        let scan = scan_activity(&vk, -100, 200, chrono_tz::UTC).await.unwrap().unwrap();
        assert_eq!(scan.user.name, "Иван Петров");
        assert_eq!(scan.user.link, "https://vk.com/id200");
        assert_eq!(scan.user.group_name, "Клуб");

        assert_eq!(scan.records.len(), 3);
        assert_eq!(scan.records[0].link, "https://vk.com/wall-100_1");
        assert_eq!(scan.records[0].date, "01.01.2024 00:01");
        assert!(scan.records[1].liked && scan.records[1].reposted);
        assert!(!scan.records[2].liked && !scan.records[2].reposted);
    }

    #[tokio::test]
    async fn scan_uses_placeholders_when_names_fail() {
        let mut vk = FakeVk::default();
        vk.posts = posts(1);

        let scan = scan_activity(&vk, -100, 200, chrono_tz::UTC).await.unwrap().unwrap();
        assert_eq!(scan.user.name, "Пользователь");
        assert_eq!(scan.user.link, "—");
        assert_eq!(scan.user.group_name, "Группа");
    }

    #[tokio::test]
    async fn empty_wall_yields_none() {
        let vk = FakeVk::default();
        assert!(scan_activity(&vk, -100, 200, chrono_tz::UTC).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wall_failure_propagates() {
        let mut vk = FakeVk::default();
        vk.wall_error = true;
        assert!(scan_activity(&vk, -100, 200, chrono_tz::UTC).await.is_err());
    }
}
