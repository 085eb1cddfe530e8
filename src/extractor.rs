use anyhow::{Context, Result};

use crate::types::{PostObservation, ProfileObservation};

// Element locators for the pieces the shared-data blob does not carry.
pub const NOT_FOUND_SELECTOR: &str = ".error-container, .dialog-404";
pub const POST_LINKS_SELECTOR: &str = "article a[href]";
pub const DESCRIPTION_SELECTOR: &str = "article h1, .C4VMK > span";
pub const MENTIONS_SELECTOR: &str = "article a.notranslate";
pub const DATE_SELECTOR: &str = "time[datetime]";

/// One scroll step; the grid re-renders from the top after each one.
pub const SCROLL_STEP_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Reads the profile-level observation out of the page's shared-data blob.
/// Returns a JSON.stringify payload parsed by [`parse_profile`].
pub const PROFILE_SCRIPT: &str = r#"
(() => {
    const user = window._sharedData.entry_data.ProfilePage[0].graphql.user;
    return JSON.stringify({
        username: user.username,
        description: user.biography ? user.biography : '',
        avatarUrl: user.profile_pic_url,
        website: user.external_url_linkshimmed ? user.external_url_linkshimmed : null,
        isPrivate: user.is_private,
        isVerified: user.is_verified,
        postCount: user.edge_owner_to_timeline_media.count,
        followerCount: user.edge_followed_by.count,
        followingCount: user.edge_follow.count
    });
})()
"#;

/// Probe for the "no such account" marker. Evaluates to a boolean.
pub fn not_found_script() -> String {
    format!(
        r#"document.querySelector("{}") !== null"#,
        NOT_FOUND_SELECTOR
    )
}

/// Reads one post page's observation: media descriptors from the
/// shared-data blob, description/tags/mentions/date from the DOM. A
/// multi-image post's sidecar children are flattened in display order.
/// Returns a JSON.stringify payload parsed by [`parse_post`].
pub fn post_script() -> String {
    format!(
        r#"
(() => {{
    const media = window._sharedData.entry_data.PostPage[0].graphql.shortcode_media;
    const isVideo = media.is_video;
    const isMultiImage = media.edge_sidecar_to_children !== undefined;
    let resources = [];
    if (isMultiImage) {{
        media.edge_sidecar_to_children.edges.forEach((edge) => {{
            resources = resources.concat(edge.node.display_resources);
        }});
    }} else {{
        resources = media.display_resources;
    }}
    const descriptionNode = document.querySelector("{description}");
    const dateNode = document.querySelector("{date}");
    return JSON.stringify({{
        images: resources.map((r) => ({{ src: r.src, width: r.config_width, height: r.config_height }})),
        isVideo: isVideo,
        videoUrl: isVideo ? media.video_url : null,
        description: descriptionNode ? descriptionNode.innerText : null,
        tags: descriptionNode ? (descriptionNode.innerText.match(/#\w+/g) || []) : [],
        mentions: [...document.querySelectorAll("{mentions}")].map((n) => n.getAttribute('href')),
        publishedAt: dateNode ? dateNode.getAttribute('datetime') : null,
        isMultiImage: isMultiImage,
        likeCount: media.edge_media_preview_like.count ? media.edge_media_preview_like.count : null,
        viewCount: isVideo ? media.video_view_count : null,
        commentCount: media.edge_media_to_comment.count ? media.edge_media_to_comment.count : null
    }});
}})()
"#,
        description = DESCRIPTION_SELECTOR,
        date = DATE_SELECTOR,
        mentions = MENTIONS_SELECTOR,
    )
}

pub fn parse_profile(raw: &str) -> Result<ProfileObservation> {
    serde_json::from_str(raw).context("profile payload did not match the expected shape")
}

pub fn parse_post(raw: &str) -> Result<PostObservation> {
    serde_json::from_str(raw).context("post payload did not match the expected shape")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_a_profile_payload() {
        let raw = r#"{
            "username": "someone",
            "description": "bio",
            "avatarUrl": "https://cdn.example/avatar.jpg",
            "website": null,
            "isPrivate": false,
            "isVerified": true,
            "postCount": 3,
            "followerCount": 120,
            "followingCount": 80
        }"#;
        let observation = parse_profile(raw).unwrap();
        assert_eq!(observation.username, "someone");
        assert_eq!(observation.post_count, 3);
        assert!(observation.website.is_none());
        // filled in from the live tab afterwards
        assert!(observation.profile_url.is_empty());
    }

    #[test]
    fn parses_a_post_payload() {
        let raw = r##"{
            "images": [{"src": "https://cdn.example/a.jpg", "width": 640, "height": 640}],
            "isVideo": true,
            "videoUrl": "https://cdn.example/a.mp4",
            "description": "a post #tag",
            "tags": ["#tag"],
            "mentions": ["/other/"],
            "publishedAt": "2020-03-01T10:00:00.000Z",
            "isMultiImage": false,
            "likeCount": 10,
            "viewCount": 99,
            "commentCount": null
        }"##;
        let observation = parse_post(raw).unwrap();
        assert!(observation.is_video);
        assert_eq!(observation.images.len(), 1);
        assert_eq!(observation.images[0].width, 640);
        assert_eq!(observation.view_count, Some(99));
        assert_eq!(observation.comment_count, None);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_profile("not json").is_err());
        assert!(parse_post("{}").is_err());
    }

    #[test]
    fn scripts_carry_their_selectors() {
        assert!(post_script().contains(DATE_SELECTOR));
        assert!(post_script().contains(MENTIONS_SELECTOR));
        assert!(not_found_script().contains(NOT_FOUND_SELECTOR));
    }
}
