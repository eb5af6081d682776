use crate::error::ResolveError;
use crate::vk_api::{EntityKind, SocialApi};

/// Resolves `screen_name` and checks it names the `expected` kind of entity.
/// Returns the signed id (negative for groups).
pub async fn resolve_as(api: &dyn SocialApi, screen_name: &str, expected: EntityKind) -> Result<i64, ResolveError> {
    let resolved = api
        .resolve_screen_name(screen_name)
        .await?
        .ok_or(ResolveError::NotFound)?;

    if resolved.kind != expected {
        return Err(ResolveError::WrongKind {
            expected: expected.as_str(),
            found: resolved.kind.as_str(),
        });
    }

    Ok(resolved.signed_id())
}

pub async fn resolve_group(api: &dyn SocialApi, screen_name: &str) -> Result<i64, ResolveError> {
    resolve_as(api, screen_name, EntityKind::Group).await
}

pub async fn resolve_user(api: &dyn SocialApi, screen_name: &str) -> Result<i64, ResolveError> {
    resolve_as(api, screen_name, EntityKind::User).await
}
