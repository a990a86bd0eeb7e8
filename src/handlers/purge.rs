#![deny(clippy::all, clippy::pedantic)]

use edgepurge::{
    application::error::AppError, cache::header_value, config::PurgeTarget, domain::types::PurgeKey,
};
use serde::Serialize;

use crate::context::Ctx;
use crate::print::{print_json, print_outcome};

pub async fn handle(ctx: &Ctx, target: PurgeTarget) -> Result<bool, AppError> {
    match target {
        PurgeTarget::All => all(ctx).await,
        PurgeTarget::Url { url } => url_purge(ctx, &url).await,
        PurgeTarget::Key { tags } => key(ctx, &tags).await,
        PurgeTarget::Site => site(ctx).await,
    }
}

async fn all(ctx: &Ctx) -> Result<bool, AppError> {
    let ok = ctx.purger().await?.purge_all().await;
    Ok(print_outcome(
        ok,
        "Purged all content on the service",
        "Purge all failed",
    ))
}

async fn url_purge(ctx: &Ctx, url: &str) -> Result<bool, AppError> {
    let ok = ctx.purger().await?.purge_url(url).await;
    Ok(print_outcome(
        ok,
        &format!("Purged {url}"),
        &format!("Purge of {url} failed"),
    ))
}

fn split_tags(tags: &str) -> Vec<&str> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect()
}

async fn key(ctx: &Ctx, tags: &str) -> Result<bool, AppError> {
    let tags = split_tags(tags);
    if tags.is_empty() {
        return Err(AppError::validation("no cache tags given"));
    }
    let ok = ctx.purger().await?.purge_tags(&tags).await;
    Ok(print_outcome(
        ok,
        &format!("Purged {} cache tags", tags.len()),
        "Purge by key failed",
    ))
}

async fn site(ctx: &Ctx) -> Result<bool, AppError> {
    let ok = ctx.purger().await?.purge_site().await;
    Ok(print_outcome(
        ok,
        "Purged all content of this site",
        "Site purge failed",
    ))
}

pub async fn invalidate(ctx: &Ctx, tags: &[String]) -> Result<bool, AppError> {
    let ok = ctx.invalidator().await?.invalidate_tags(tags).await;
    Ok(print_outcome(
        ok,
        "Invalidated cache tags",
        "Invalidation failed",
    ))
}

#[derive(Serialize)]
struct KeysOutput<'a> {
    site_id: &'a str,
    hash_length: usize,
    keys: Vec<&'a str>,
    header: String,
}

pub async fn keys(ctx: &Ctx, tags: &[String]) -> Result<(), AppError> {
    let mapper = ctx.mapper().await?;
    let keys = mapper.tags_to_keys(tags);
    print_json(&KeysOutput {
        site_id: mapper.site().as_str(),
        hash_length: mapper.length().get(),
        keys: keys.iter().map(PurgeKey::as_str).collect(),
        header: header_value(&keys),
    })
}

pub async fn site_id(ctx: &Ctx) -> Result<(), AppError> {
    let site = ctx.namespace().site_id().await?;
    println!("{site}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_tags_ignores_blanks() {
        assert_eq!(split_tags("node:1, node:2,,  "), vec!["node:1", "node:2"]);
        assert!(split_tags(" , ").is_empty());
    }
}
