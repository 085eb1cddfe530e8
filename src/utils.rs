use rand::{distributions::Alphanumeric, thread_rng, Rng};
use reqwest::Url;
use std::{
    fs,
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

pub const FORMAT_STRING: &str = "%Y-%m-%d %H:%M:%S";

lazy_static! {
    pub static ref BASE_URL: String = {
        match std::env::var("PROFILECRAWL_BASE_URL") {
            Ok(url) => url.trim_end_matches('/').to_string(),
            Err(_) => "https://www.instagram.com".into(),
        }
    };
}

pub fn profile_url(username: &str) -> String {
    format!("{}/{}/", *BASE_URL, username)
}

pub fn post_url(identifier: &str) -> String {
    format!("{}/p/{}/", *BASE_URL, identifier)
}

/// Derives the stable post identifier from a grid href. Accepts absolute
/// and relative links; anything that is not a `/p/` or `/reel/` link is
/// ignored.
pub fn post_identifier(link: &str) -> Option<String> {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        // relative href, strip query and fragment by hand
        Err(_) => link
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or("")
            .to_string(),
    };
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some("p"), Some(id)) | (Some("reel"), Some(id)) => Some(id.to_string()),
        _ => None,
    }
}

pub fn get_unix_timestamp() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap()
}

pub fn jitter(duration: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let rndm = rng.gen_range(1.0..10.0);
    duration.mul_f64(rndm)
}

pub fn get_random_string(len: i32) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len as usize)
        .map(char::from)
        .collect()
}

pub fn create_random_tmp_folder() -> anyhow::Result<PathBuf> {
    let rand_folder_name: String = get_random_string(11);

    let path = std::env::temp_dir().join(format!("profilecrawl-{}", rand_folder_name));
    fs::create_dir(&path)?;
    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn derives_identifier_from_relative_links() {
        assert_eq!(
            post_identifier("/p/B9KOvpMg1Zp/"),
            Some("B9KOvpMg1Zp".to_string())
        );
        assert_eq!(post_identifier("/reel/Cabc123/"), Some("Cabc123".to_string()));
    }

    #[test]
    fn derives_identifier_from_absolute_links() {
        assert_eq!(
            post_identifier("https://www.instagram.com/p/B9KOvpMg1Zp/?taken-by=someone"),
            Some("B9KOvpMg1Zp".to_string())
        );
    }

    #[test]
    fn ignores_non_post_links() {
        assert_eq!(post_identifier("/explore/tags/sunset/"), None);
        assert_eq!(post_identifier("/accounts/login/"), None);
        assert_eq!(post_identifier("https://example.com/about"), None);
        assert_eq!(post_identifier(""), None);
    }

    #[test]
    fn builds_profile_and_post_urls() {
        assert_eq!(
            profile_url("nacimgoura"),
            "https://www.instagram.com/nacimgoura/"
        );
        assert_eq!(
            post_url("B9KOvpMg1Zp"),
            "https://www.instagram.com/p/B9KOvpMg1Zp/"
        );
    }

    #[test]
    fn creates_a_random_folder() {
        let p = create_random_tmp_folder().unwrap();
        assert!(p.exists());
        fs::remove_dir(p).unwrap();
    }
}
