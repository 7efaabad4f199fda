use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Post frontmatter, the `---`-delimited YAML block at the top of each
/// Markdown file. Field names mirror the frontmatter keys used by the
/// content files (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMeta {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub slug: String,
    pub published_at: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<PostAuthor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAuthor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A parsed post: frontmatter plus the raw Markdown body. Rendering the body
/// to HTML is the client's concern.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    #[serde(flatten)]
    pub meta: PostMeta,
    pub content: String,
}

/// Flat-file post storage: a directory of `*.md` files read on demand.
#[derive(Debug, Clone)]
pub struct PostStore {
    dir: PathBuf,
}

impl PostStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Loads every post in the directory, newest first. Files that fail to
    /// parse are skipped with a warning rather than failing the listing.
    pub fn load_all(&self) -> Result<Vec<Post>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read posts directory {}", self.dir.display()))?;

        let mut posts = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read posts directory entry")?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }

            match read_post(&path) {
                Ok(post) => posts.push(post),
                Err(e) => {
                    warn!("Skipping unreadable post {}: {:#}", path.display(), e);
                }
            }
        }

        posts.sort_by(|a, b| b.meta.published_at.cmp(&a.meta.published_at));
        debug!("Loaded {} posts from {}", posts.len(), self.dir.display());

        Ok(posts)
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        Ok(self.load_all()?.into_iter().find(|p| p.meta.slug == slug))
    }

    pub fn latest(&self) -> Result<Option<Post>> {
        Ok(self.load_all()?.into_iter().next())
    }

    /// Renders the inline-styled HTML email announcing the latest post.
    pub fn email_preview(&self, base_url: &str) -> Result<String> {
        let Some(post) = self.latest()? else {
            return Ok("<p>No posts available.</p>".to_string());
        };

        Ok(render_post_email(&post.meta, base_url))
    }
}

fn read_post(path: &Path) -> Result<Post> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_post(&source)
}

/// Splits a post file into its YAML frontmatter and Markdown body.
fn parse_post(source: &str) -> Result<Post> {
    let rest = source
        .strip_prefix("---")
        .ok_or_else(|| anyhow!("Post is missing a frontmatter block"))?;

    let end = rest
        .find("\n---")
        .ok_or_else(|| anyhow!("Unterminated frontmatter block"))?;
    let (front, body) = rest.split_at(end);

    let meta: PostMeta =
        serde_yaml::from_str(front).context("Failed to parse post frontmatter")?;

    // Skip the closing delimiter and the newline that follows it.
    let content = body
        .trim_start_matches('\n')
        .trim_start_matches("---")
        .trim_start_matches('\n')
        .to_string();

    Ok(Post { meta, content })
}

fn render_post_email(meta: &PostMeta, base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let post_url = format!("{}/blog/{}", base_url, meta.slug);
    let date = meta.published_at.format("%d %B %Y").to_string();

    let description = if meta.description.is_empty() {
        String::new()
    } else {
        format!(
            r#"<p style="font-size:16px; color:#333; line-height:1.5; margin-bottom:12px;">{}</p>"#,
            meta.description
        )
    };

    let tags = if meta.tags.is_empty() {
        String::new()
    } else {
        let links: String = meta
            .tags
            .iter()
            .map(|tag| {
                format!(
                    r##"<a href="{}/blog/tag/{}" style="color:#0070f3; text-decoration:none; margin-right:8px;">#{}</a>"##,
                    base_url, tag, tag
                )
            })
            .collect();
        format!(
            r#"<p style="font-size:14px; color:#555; margin:8px 0;">{}</p>"#,
            links
        )
    };

    format!(
        r#"<table width="100%" cellpadding="0" cellspacing="0" border="0" style="font-family: Arial, sans-serif; max-width:600px; margin:auto; background:#ffffff; border-radius:8px;">
  <tr>
    <td style="padding:16px;">
      <h2 style="font-size:24px; font-weight:bold; margin:16px 0 8px;">
        <a href="{post_url}" style="color:#000000; text-decoration:none;">{title}</a>
      </h2>
      <p style="font-size:14px; font-style:italic; color:#666; margin:0 0 12px;">{date}</p>
      {description}
      {tags}
      <a href="{post_url}" style="display:inline-block; margin-top:16px; padding:12px 20px; background-color:#0070f3; color:#ffffff; font-weight:bold; text-decoration:none; border-radius:6px;">Read More</a>
    </td>
  </tr>
</table>"#,
        post_url = post_url,
        title = meta.title,
        date = date,
        description = description,
        tags = tags,
    )
}
